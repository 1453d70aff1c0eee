//! File layout reconstruction.
//!
//! [`LayoutReport::build`] places every byte range the headers describe (the
//! file header, both header tables and each file-backed section) on the file
//! offset axis, classifies the space between them as alignment padding or an
//! unexplained gap, and checks each program header for internal consistency.
//! Problems are collected as [`LayoutAnomaly`] values; building a report
//! never fails.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::file::ElfFile;
use crate::section::SectionHeader;
use crate::segment::{ProgramHeader, SegmentType};

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// What a byte range of the file holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeKind {
    /// The ELF file header.
    ElfHeader,
    /// The program header table.
    ProgramHeaders,
    /// A file-backed section.
    Section {
        /// Section index.
        index: u32,
        /// Resolved section name.
        name: String,
    },
    /// The section header table.
    SectionHeaders,
    /// Alignment filler between two ranges.
    Padding,
}

impl RangeKind {
    /// Tie-breaker for ranges starting at the same offset.
    fn rank(&self) -> (u8, u32) {
        match self {
            Self::ElfHeader => (0, 0),
            Self::ProgramHeaders => (1, 0),
            Self::Section { index, .. } => (2, *index),
            Self::SectionHeaders => (3, 0),
            Self::Padding => (4, 0),
        }
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElfHeader => f.write_str("ELF header"),
            Self::ProgramHeaders => f.write_str("program headers"),
            Self::Section { index, name } if name.is_empty() => write!(f, "section [{index}]"),
            Self::Section { index, name } => write!(f, "section [{index}] {name}"),
            Self::SectionHeaders => f.write_str("section headers"),
            Self::Padding => f.write_str("padding"),
        }
    }
}

/// A contiguous run of file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    /// Contents of the range.
    pub kind: RangeKind,
    /// File offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
    /// Alignment the range's start is expected to honor (at least 1).
    pub align: u64,
}

impl ByteRange {
    /// Offset one past the last byte (saturating).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

/// A non-fatal inconsistency found while building a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutAnomaly {
    /// Two ranges share bytes.
    Overlap {
        /// The range that was already placed.
        first: RangeKind,
        /// The range starting inside it.
        second: RangeKind,
        /// First shared byte.
        offset: u64,
        /// Number of shared bytes.
        size: u64,
    },
    /// Bytes no header accounts for and no alignment rule explains.
    Gap {
        /// First unexplained byte.
        offset: u64,
        /// Length of the gap.
        size: u64,
    },
    /// A range extends past the end of the file.
    RangeOutOfBounds {
        /// The offending range.
        kind: RangeKind,
        /// Offset one past its last byte.
        end: u64,
    },
    /// A segment occupies fewer bytes in memory than in the file.
    MemSmallerThanFile {
        /// Program header index.
        segment: usize,
        /// `p_filesz`.
        filesz: u64,
        /// `p_memsz`.
        memsz: u64,
    },
    /// A segment alignment that is neither zero nor a power of two.
    BadAlignment {
        /// Program header index.
        segment: usize,
        /// `p_align`.
        align: u64,
    },
    /// A segment's file image extends past the end of the file.
    SegmentOutOfBounds {
        /// Program header index.
        segment: usize,
        /// Offset one past the segment's last file byte.
        end: u64,
    },
}

impl LayoutAnomaly {
    /// Short machine-readable tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Overlap { .. } => "Overlap",
            Self::Gap { .. } => "Gap",
            Self::RangeOutOfBounds { .. } => "RangeOutOfBounds",
            Self::MemSmallerThanFile { .. } => "MemSmallerThanFile",
            Self::BadAlignment { .. } => "BadAlignment",
            Self::SegmentOutOfBounds { .. } => "SegmentOutOfBounds",
        }
    }
}

impl fmt::Display for LayoutAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlap {
                first,
                second,
                offset,
                size,
            } => write!(
                f,
                "{second} overlaps {first} by {size} bytes at {offset:#x}"
            ),
            Self::Gap { offset, size } => {
                write!(f, "{size} unaccounted bytes at {offset:#x}")
            }
            Self::RangeOutOfBounds { kind, end } => {
                write!(f, "{kind} ends at {end:#x}, past end of file")
            }
            Self::MemSmallerThanFile {
                segment,
                filesz,
                memsz,
            } => write!(
                f,
                "segment {segment}: memsz {memsz:#x} smaller than filesz {filesz:#x}"
            ),
            Self::BadAlignment { segment, align } => {
                write!(f, "segment {segment}: alignment {align:#x} is not a power of two")
            }
            Self::SegmentOutOfBounds { segment, end } => {
                write!(f, "segment {segment}: file image ends at {end:#x}, past end of file")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Section to segment mapping
// ---------------------------------------------------------------------------

/// A section placed in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedSection {
    /// Section index.
    pub index: u32,
    /// Section name.
    pub name: String,
}

/// The allocated sections whose memory image lies inside one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMapping {
    /// Program header index.
    pub segment: usize,
    /// Sections in section table order.
    pub sections: Vec<MappedSection>,
}

/// Returns `true` if `section` belongs to `phdr`'s memory image.
///
/// TLS sections only appear in `PT_TLS`, `PT_LOAD` and `PT_GNU_RELRO`, and
/// `.tbss`-style TLS zero-fill only in `PT_TLS`, since it takes no space in
/// the loaded image. Empty sections count when they start strictly inside
/// the segment.
fn section_in_segment(section: &SectionHeader, phdr: &ProgramHeader) -> bool {
    if !section.is_alloc() {
        return false;
    }
    let tls_segment = phdr.p_type == SegmentType::Tls;
    if section.is_tls() {
        let allowed = matches!(
            phdr.p_type,
            SegmentType::Tls | SegmentType::Load | SegmentType::GnuRelro
        );
        if !allowed || (section.is_nobits() && !tls_segment) {
            return false;
        }
    } else if tls_segment {
        return false;
    }

    if !section.is_nobits() {
        let file_end = phdr.p_offset.saturating_add(phdr.p_filesz);
        if section.sh_offset < phdr.p_offset
            || section.sh_offset.saturating_add(section.sh_size) > file_end
        {
            return false;
        }
    }

    if section.sh_size == 0 {
        section.sh_addr >= phdr.p_vaddr
            && section.sh_addr < phdr.p_vaddr.saturating_add(phdr.p_memsz)
    } else {
        phdr.contains_vaddr_range(section.sh_addr, section.sh_size)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value
        .checked_next_multiple_of(align)
        .unwrap_or(u64::MAX)
}

/// Returns `true` if the gap `[start, next.offset)` sits between two
/// allocated sections inside one `PT_LOAD` file image and is shorter than
/// `next`'s alignment times the segment's page alignment.
///
/// Linkers leave such fills inside segments, for example between `.got`
/// and `.got.plt`.
fn is_fill_between_sections(
    elf: &ElfFile<'_>,
    prev: Option<&RangeKind>,
    next: &ByteRange,
    start: u64,
) -> bool {
    let alloc = |kind: &RangeKind| match kind {
        RangeKind::Section { index, .. } => elf
            .sections()
            .get(*index as usize)
            .is_some_and(SectionHeader::is_alloc),
        _ => false,
    };
    if !prev.is_some_and(alloc) || !alloc(&next.kind) {
        return false;
    }
    elf.load_segments().any(|p| {
        let image_end = p.p_offset.saturating_add(p.p_filesz);
        start >= p.p_offset
            && next.offset <= image_end
            && next.offset - start < next.align.saturating_mul(p.p_align.max(1))
    })
}

/// The reconstructed byte layout of one ELF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutReport {
    ranges: Vec<ByteRange>,
    anomalies: Vec<LayoutAnomaly>,
    file_size: u64,
    memory_only_bytes: u64,
    zero_fill_section_bytes: u64,
    mapping: Vec<SegmentMapping>,
}

impl LayoutReport {
    /// Builds the report for a parsed file.
    #[must_use]
    pub fn build(elf: &ElfFile<'_>) -> Self {
        let file_size = elf.file_size();
        let header = elf.header();
        let word = elf.identity().class.word_size();

        let mut placed = Vec::new();
        placed.push(ByteRange {
            kind: RangeKind::ElfHeader,
            offset: 0,
            size: elf.identity().class.header_size(),
            align: 1,
        });
        if let Some((offset, size)) = header.program_table_extent() {
            placed.push(ByteRange {
                kind: RangeKind::ProgramHeaders,
                offset,
                size,
                align: word,
            });
        }
        for section in elf.sections() {
            if section.sh_type == crate::section::SectionType::Null {
                continue;
            }
            placed.push(ByteRange {
                kind: RangeKind::Section {
                    index: section.index,
                    name: section.name.clone(),
                },
                offset: section.sh_offset,
                size: section.file_size(),
                align: section.sh_addralign.max(1),
            });
        }
        if let Some((offset, size)) = header.section_table_extent() {
            placed.push(ByteRange {
                kind: RangeKind::SectionHeaders,
                offset,
                size,
                align: word,
            });
        }
        placed.retain(|r| r.size > 0);
        placed.sort_by(|a, b| {
            a.offset
                .cmp(&b.offset)
                .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
        });

        let segment_starts: Vec<u64> = elf.load_segments().map(|p| p.p_offset).collect();
        let relro_bounds: Vec<u64> = elf
            .program_headers()
            .iter()
            .filter(|p| p.p_type == SegmentType::GnuRelro)
            .flat_map(|p| {
                [
                    p.p_offset,
                    p.p_offset.saturating_add(p.p_filesz),
                    p.p_offset.saturating_add(p.p_memsz),
                ]
            })
            .collect();
        let mut anomalies = Vec::new();
        let mut ranges = Vec::with_capacity(placed.len() * 2);
        let mut cursor = 0u64;
        let mut last: Option<RangeKind> = None;

        for range in placed {
            if range.offset < cursor {
                if let Some(first) = &last {
                    anomalies.push(LayoutAnomaly::Overlap {
                        first: first.clone(),
                        second: range.kind.clone(),
                        offset: range.offset,
                        size: cursor.min(range.end()) - range.offset,
                    });
                }
            } else if range.offset > cursor {
                let size = range.offset - cursor;
                let aligned = align_up(cursor, range.align) == range.offset;
                let explained = aligned
                    || segment_starts.contains(&range.offset)
                    || relro_bounds.contains(&range.offset)
                    || is_fill_between_sections(elf, last.as_ref(), &range, cursor);
                if explained {
                    ranges.push(ByteRange {
                        kind: RangeKind::Padding,
                        offset: cursor,
                        size,
                        align: 1,
                    });
                } else {
                    anomalies.push(LayoutAnomaly::Gap {
                        offset: cursor,
                        size,
                    });
                }
            }
            if range.end() > file_size {
                anomalies.push(LayoutAnomaly::RangeOutOfBounds {
                    kind: range.kind.clone(),
                    end: range.end(),
                });
            }
            if range.end() >= cursor {
                cursor = range.end();
                last = Some(range.kind.clone());
            }
            ranges.push(range);
        }
        if cursor < file_size {
            anomalies.push(LayoutAnomaly::Gap {
                offset: cursor,
                size: file_size - cursor,
            });
        }

        for phdr in elf.program_headers() {
            if phdr.is_load() && phdr.p_memsz < phdr.p_filesz {
                anomalies.push(LayoutAnomaly::MemSmallerThanFile {
                    segment: phdr.index,
                    filesz: phdr.p_filesz,
                    memsz: phdr.p_memsz,
                });
            }
            if !phdr.has_valid_alignment() {
                anomalies.push(LayoutAnomaly::BadAlignment {
                    segment: phdr.index,
                    align: phdr.p_align,
                });
            }
            let end = phdr.p_offset.saturating_add(phdr.p_filesz);
            if phdr.p_filesz > 0 && end > file_size {
                anomalies.push(LayoutAnomaly::SegmentOutOfBounds {
                    segment: phdr.index,
                    end,
                });
            }
        }

        let memory_only_bytes = elf
            .load_segments()
            .map(ProgramHeader::zero_fill_size)
            .fold(0u64, u64::saturating_add);
        let zero_fill_section_bytes = elf
            .sections()
            .iter()
            .filter(|s| s.is_nobits())
            .map(|s| s.sh_size)
            .fold(0u64, u64::saturating_add);

        let mapping = elf
            .program_headers()
            .iter()
            .map(|phdr| SegmentMapping {
                segment: phdr.index,
                sections: elf
                    .sections()
                    .iter()
                    .filter(|s| section_in_segment(s, phdr))
                    .map(|s| MappedSection {
                        index: s.index,
                        name: s.name.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            ranges,
            anomalies,
            file_size,
            memory_only_bytes,
            zero_fill_section_bytes,
            mapping,
        }
    }

    /// All placed ranges, padding included, in file order.
    #[must_use]
    pub fn covered_ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// The problems found; empty for a well-formed contiguous file.
    #[must_use]
    pub fn anomalies(&self) -> &[LayoutAnomaly] {
        &self.anomalies
    }

    /// Returns `true` if no anomaly was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Size of the inspected file.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes loadable segments add in memory beyond their file image
    /// (`Σ memsz - filesz` over `PT_LOAD`).
    #[must_use]
    pub fn memory_only_bytes(&self) -> u64 {
        self.memory_only_bytes
    }

    /// Total size of `SHT_NOBITS` sections.
    #[must_use]
    pub fn zero_fill_section_bytes(&self) -> u64 {
        self.zero_fill_section_bytes
    }

    /// The section to segment mapping, one entry per program header.
    #[must_use]
    pub fn segment_mapping(&self) -> &[SegmentMapping] {
        &self.mapping
    }

    /// Returns `true` if the covered ranges tile `[0, file_size)` exactly.
    #[must_use]
    pub fn tiles_file(&self) -> bool {
        let mut cursor = 0;
        for range in &self.ranges {
            if range.offset != cursor {
                return false;
            }
            cursor = range.end();
        }
        cursor == self.file_size
    }
}
