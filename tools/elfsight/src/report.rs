//! The `inspect` report in table and JSON form.

use std::io::{self, Write};
use std::path::Path;

use elfsight_elf::{ElfFile, Endian, LayoutReport, RangeKind, machine_name};
use serde::Serialize;

/// Everything `inspect` prints, flattened into serializable records.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Inspected file.
    pub path: String,
    /// `ELF32` or `ELF64`.
    pub class: String,
    /// `little` or `big`.
    pub endian: &'static str,
    /// Object file type.
    pub elf_type: String,
    /// Target machine.
    pub machine: String,
    /// Entry point address.
    pub entry: u64,
    /// File length in bytes.
    pub file_size: u64,
    /// Byte ranges in file order.
    pub ranges: Vec<RangeRecord>,
    /// Every section header, `NOBITS` and empty sections included.
    pub sections: Vec<SectionRecord>,
    /// Program headers.
    pub segments: Vec<SegmentRecord>,
    /// Layout problems.
    pub anomalies: Vec<AnomalyRecord>,
    /// Bytes loadable segments occupy in memory but not in the file.
    pub memory_only_bytes: u64,
    /// Combined size of `NOBITS` sections.
    pub zero_fill_section_bytes: u64,
    /// Section to segment mapping, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<MappingRecord>>,
}

/// One covered byte range.
#[derive(Debug, Serialize)]
pub struct RangeRecord {
    /// `elf_header`, `program_headers`, `section`, `section_headers` or
    /// `padding`.
    pub kind: &'static str,
    /// Section index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Section name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Section type tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    /// Section flag letters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    /// File offset.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
    /// Load address of allocated sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vaddr: Option<u64>,
}

/// One section header.
#[derive(Debug, Serialize)]
pub struct SectionRecord {
    /// Section index.
    pub index: u32,
    /// Section name.
    pub name: String,
    /// Section type tag.
    pub type_tag: String,
    /// Section flag letters.
    pub flags: String,
    /// File offset.
    pub offset: u64,
    /// Bytes in the file (0 for `NOBITS`).
    pub file_size: u64,
    /// Bytes in memory (`sh_size`).
    pub mem_size: u64,
    /// Load address of allocated sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vaddr: Option<u64>,
}

/// One program header.
#[derive(Debug, Serialize)]
pub struct SegmentRecord {
    /// Program header index.
    pub index: usize,
    /// Segment type tag.
    pub type_tag: String,
    /// `R`, `W`, `E` letters.
    pub flags: String,
    /// File offset.
    pub offset: u64,
    /// Bytes in the file.
    pub filesz: u64,
    /// Bytes in memory.
    pub memsz: u64,
    /// Virtual address.
    pub vaddr: u64,
    /// Alignment.
    pub align: u64,
}

/// One layout anomaly.
#[derive(Debug, Serialize)]
pub struct AnomalyRecord {
    /// Anomaly kind.
    pub kind: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Sections mapped by one segment.
#[derive(Debug, Serialize)]
pub struct MappingRecord {
    /// Program header index.
    pub segment: usize,
    /// Section names.
    pub sections: Vec<String>,
}

impl Report {
    /// Collects the report for a parsed file.
    pub fn new(path: &Path, elf: &ElfFile<'_>, layout: &LayoutReport, mapping: bool) -> Self {
        let ident = elf.identity();
        let header = elf.header();

        let ranges = layout
            .covered_ranges()
            .iter()
            .map(|range| {
                let mut record = RangeRecord {
                    kind: range_tag(&range.kind),
                    index: None,
                    name: None,
                    type_tag: None,
                    flags: None,
                    offset: range.offset,
                    size: range.size,
                    vaddr: None,
                };
                if let RangeKind::Section { index, name } = &range.kind {
                    record.index = Some(*index);
                    record.name = Some(name.clone());
                    if let Some(section) = elf.sections().get(*index as usize) {
                        record.type_tag = Some(section.sh_type.to_string());
                        record.flags = Some(section.sh_flags.to_string());
                        record.vaddr = section.is_alloc().then_some(section.sh_addr);
                    }
                }
                record
            })
            .collect();

        let sections = elf
            .sections()
            .iter()
            .map(|section| SectionRecord {
                index: section.index,
                name: section.name.clone(),
                type_tag: section.sh_type.to_string(),
                flags: section.sh_flags.to_string(),
                offset: section.sh_offset,
                file_size: section.file_size(),
                mem_size: section.sh_size,
                vaddr: section.is_alloc().then_some(section.sh_addr),
            })
            .collect();

        let segments = elf
            .program_headers()
            .iter()
            .map(|phdr| SegmentRecord {
                index: phdr.index,
                type_tag: phdr.p_type.to_string(),
                flags: phdr.p_flags.to_string().trim_end().to_owned(),
                offset: phdr.p_offset,
                filesz: phdr.p_filesz,
                memsz: phdr.p_memsz,
                vaddr: phdr.p_vaddr,
                align: phdr.p_align,
            })
            .collect();

        let anomalies = layout
            .anomalies()
            .iter()
            .map(|anomaly| AnomalyRecord {
                kind: anomaly.kind(),
                message: anomaly.to_string(),
            })
            .collect();

        let mapping = mapping.then(|| {
            layout
                .segment_mapping()
                .iter()
                .map(|m| MappingRecord {
                    segment: m.segment,
                    sections: m.sections.iter().map(|s| s.name.clone()).collect(),
                })
                .collect()
        });

        Self {
            path: path.display().to_string(),
            class: ident.class.to_string(),
            endian: match ident.endian {
                Endian::Little => "little",
                Endian::Big => "big",
            },
            elf_type: header.e_type.to_string(),
            machine: machine_name(header.e_machine).to_owned(),
            entry: header.e_entry,
            file_size: layout.file_size(),
            ranges,
            sections,
            segments,
            anomalies,
            memory_only_bytes: layout.memory_only_bytes(),
            zero_fill_section_bytes: layout.zero_fill_section_bytes(),
            mapping,
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, out: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }

    /// Writes the report as aligned text tables.
    pub fn write_table(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", self.path)?;
        writeln!(
            out,
            "  {} {}-endian {} for {}, entry {:#x}, {} bytes",
            self.class, self.endian, self.elf_type, self.machine, self.entry, self.file_size
        )?;

        let width = self
            .ranges
            .iter()
            .map(|r| r.label().len())
            .max()
            .unwrap_or(4)
            .max(4);
        writeln!(out)?;
        writeln!(
            out,
            "  {:<width$}  {:<12}  {:<5}  {:>10}  {:>10}  {:>18}",
            "Range", "Type", "Flags", "Offset", "Size", "Address"
        )?;
        writeln!(
            out,
            "  {:-<width$}  {:-<12}  {:-<5}  {:->10}  {:->10}  {:->18}",
            "", "", "", "", "", ""
        )?;
        for range in &self.ranges {
            let vaddr = range.vaddr.map(|a| format!("{a:#x}")).unwrap_or_default();
            writeln!(
                out,
                "  {:<width$}  {:<12}  {:<5}  {:>10}  {:>10}  {:>18}",
                range.label(),
                range.type_tag.as_deref().unwrap_or(""),
                range.flags.as_deref().unwrap_or(""),
                format!("{:#x}", range.offset),
                range.size,
                vaddr,
            )?;
        }

        self.write_sections(out)?;

        if !self.segments.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "  {:>3}  {:<12}  {:<3}  {:>10}  {:>18}  {:>10}  {:>10}  {:>8}",
                "Seg", "Type", "Flg", "Offset", "VirtAddr", "FileSiz", "MemSiz", "Align"
            )?;
            writeln!(
                out,
                "  {:->3}  {:-<12}  {:-<3}  {:->10}  {:->18}  {:->10}  {:->10}  {:->8}",
                "", "", "", "", "", "", "", ""
            )?;
            for seg in &self.segments {
                writeln!(
                    out,
                    "  {:>3}  {:<12}  {:<3}  {:>10}  {:>18}  {:>10}  {:>10}  {:>8}",
                    seg.index,
                    seg.type_tag,
                    seg.flags,
                    format!("{:#x}", seg.offset),
                    format!("{:#x}", seg.vaddr),
                    seg.filesz,
                    seg.memsz,
                    format!("{:#x}", seg.align),
                )?;
            }
        }

        if let Some(mapping) = &self.mapping {
            writeln!(out)?;
            writeln!(out, "  Section to segment mapping:")?;
            for entry in mapping {
                writeln!(out, "  {:>3}  {}", entry.segment, entry.sections.join(" "))?;
            }
        }

        writeln!(out)?;
        writeln!(out, "  Memory-only bytes:      {}", self.memory_only_bytes)?;
        writeln!(out, "  Zero-fill section bytes: {}", self.zero_fill_section_bytes)?;
        if self.anomalies.is_empty() {
            writeln!(out, "  No layout anomalies.")?;
        } else {
            writeln!(out, "  {} layout anomalies:", self.anomalies.len())?;
            for anomaly in &self.anomalies {
                writeln!(out, "    {}: {}", anomaly.kind, anomaly.message)?;
            }
        }
        Ok(())
    }
}

impl Report {
    fn write_sections(&self, out: &mut impl Write) -> io::Result<()> {
        let width = self
            .sections
            .iter()
            .map(|s| s.name.len())
            .max()
            .unwrap_or(4)
            .max(4);
        writeln!(out)?;
        writeln!(
            out,
            "  {:>4}  {:<width$}  {:<12}  {:<5}  {:>10}  {:>10}  {:>10}  {:>18}",
            "Nr", "Section", "Type", "Flags", "Offset", "FileSiz", "MemSiz", "Address"
        )?;
        writeln!(
            out,
            "  {:->4}  {:-<width$}  {:-<12}  {:-<5}  {:->10}  {:->10}  {:->10}  {:->18}",
            "", "", "", "", "", "", "", ""
        )?;
        for section in &self.sections {
            let vaddr = section.vaddr.map(|a| format!("{a:#x}")).unwrap_or_default();
            writeln!(
                out,
                "  {:>4}  {:<width$}  {:<12}  {:<5}  {:>10}  {:>10}  {:>10}  {:>18}",
                format!("[{}]", section.index),
                section.name,
                section.type_tag,
                section.flags,
                format!("{:#x}", section.offset),
                section.file_size,
                section.mem_size,
                vaddr,
            )?;
        }
        Ok(())
    }
}

impl RangeRecord {
    fn label(&self) -> String {
        match (&self.index, &self.name) {
            (Some(index), Some(name)) => format!("[{index:>2}] {name}"),
            _ => self.kind.replace('_', " "),
        }
    }
}

fn range_tag(kind: &RangeKind) -> &'static str {
    match kind {
        RangeKind::ElfHeader => "elf_header",
        RangeKind::ProgramHeaders => "program_headers",
        RangeKind::Section { .. } => "section",
        RangeKind::SectionHeaders => "section_headers",
        RangeKind::Padding => "padding",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elfsight_elf::builder::{ElfBuilder, SectionSpec, SegmentSpec};
    use elfsight_elf::{Class, Reader, SegmentFlags};

    fn fixture() -> ElfFile<'static> {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".text", &[0x90; 16]).executable())
            .section(SectionSpec::nobits(".bss", 64))
            .segment(
                SegmentSpec::load(SegmentFlags::R | SegmentFlags::W | SegmentFlags::X)
                    .covering(&[".text", ".bss"]),
            )
            .build();
        ElfFile::parse(Reader::from_vec(buf)).unwrap()
    }

    #[test]
    fn records_follow_the_layout() {
        let elf = fixture();
        let layout = LayoutReport::build(&elf);
        let report = Report::new(Path::new("a.out"), &elf, &layout, true);

        assert_eq!(report.class, "ELF64");
        assert_eq!(report.endian, "little");
        assert_eq!(report.ranges[0].kind, "elf_header");
        let text = report
            .ranges
            .iter()
            .find(|r| r.name.as_deref() == Some(".text"))
            .unwrap();
        assert_eq!(text.type_tag.as_deref(), Some("PROGBITS"));
        assert_eq!(text.flags.as_deref(), Some("AX"));
        assert!(text.vaddr.is_some());
        assert!(report.ranges.iter().all(|r| r.name.as_deref() != Some(".bss")));
        let bss = report.sections.iter().find(|s| s.name == ".bss").unwrap();
        assert_eq!(bss.type_tag, "NOBITS");
        assert_eq!(bss.file_size, 0);
        assert_eq!(bss.mem_size, 64);
        assert_eq!(bss.vaddr, elf.section_by_name(".bss").map(|s| s.sh_addr));
        assert!(bss.vaddr.is_some());
        assert_eq!(report.sections.len(), elf.sections().len());
        assert_eq!(report.zero_fill_section_bytes, 64);
        assert_eq!(report.segments[0].flags, "RWE");

        let mapping = report.mapping.as_ref().unwrap();
        assert_eq!(mapping[0].sections, [".text", ".bss"]);
    }

    #[test]
    fn json_omits_mapping_unless_requested() {
        let elf = fixture();
        let layout = LayoutReport::build(&elf);
        let mut out = Vec::new();
        Report::new(Path::new("a.out"), &elf, &layout, false)
            .write_json(&mut out)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value.get("mapping").is_none());
        assert_eq!(value["zero_fill_section_bytes"], 64);
        assert_eq!(value["ranges"][0]["kind"], "elf_header");
        assert!(value["ranges"][0].get("name").is_none());
        let sections = value["sections"].as_array().unwrap();
        assert!(sections
            .iter()
            .any(|s| s["name"] == ".bss" && s["type_tag"] == "NOBITS" && s["mem_size"] == 64));
    }

    #[test]
    fn table_lists_sections_and_totals() {
        let elf = fixture();
        let layout = LayoutReport::build(&elf);
        let mut out = Vec::new();
        Report::new(Path::new("a.out"), &elf, &layout, true)
            .write_table(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(".text"));
        assert!(text.contains("section headers"));
        assert!(text.contains("Section to segment mapping"));
        assert!(text.contains("Zero-fill section bytes: 64"));
        assert!(text.lines().any(|l| l.contains(".bss") && l.contains("NOBITS")));
    }
}
