//! Synthetic ELF image builder.
//!
//! Produces small, well-formed ELF files for tests and demonstrations:
//! sections are laid out in declaration order after the file header and
//! program header table, each at its requested alignment, followed by
//! `.symtab`/`.strtab` (when symbols are declared), `.shstrtab` and finally
//! the section header table. Any section name is accepted, which is how a
//! fixture places data in a custom section such as `personal`.
//!
//! Malformed fixtures are made by editing the returned bytes.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::header::{Class, ELF_MAGIC, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ElfType};
use crate::reader::Endian;
use crate::section::{SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB, SectionFlags};
use crate::segment::{PT_LOAD, SegmentFlags};
use crate::symbol::STB_LOCAL;

/// Rounds `value` up to a multiple of `align` (treated as 1 when zero).
fn align_up(value: u64, align: u64) -> u64 {
    let align = align.max(1);
    value.div_ceil(align) * align
}

/// Index into `sections` of the section called `name`.
fn position(sections: &[SectionSpec], name: &str) -> usize {
    sections
        .iter()
        .position(|s| s.name == name)
        .unwrap_or_else(|| panic!("fixture refers to undeclared section {name}"))
}

/// Declaration of one section.
#[derive(Debug, Clone)]
pub struct SectionSpec {
    name: String,
    sh_type: u32,
    flags: SectionFlags,
    addr: Option<u64>,
    data: Vec<u8>,
    nobits_size: u64,
    align: u64,
    entsize: u64,
}

impl SectionSpec {
    /// A section of arbitrary type holding `data`, with no flags.
    #[must_use]
    pub fn new(name: &str, sh_type: u32, data: &[u8]) -> Self {
        Self {
            name: String::from(name),
            sh_type,
            flags: SectionFlags::empty(),
            addr: None,
            data: data.to_vec(),
            nobits_size: 0,
            align: 1,
            entsize: 0,
        }
    }

    /// An allocated `SHT_PROGBITS` section (read-only unless marked otherwise).
    #[must_use]
    pub fn progbits(name: &str, data: &[u8]) -> Self {
        Self::new(name, SHT_PROGBITS, data).flags(SectionFlags::ALLOC)
    }

    /// An allocated zero-fill (`SHT_NOBITS`) section of `size` bytes.
    #[must_use]
    pub fn nobits(name: &str, size: u64) -> Self {
        let mut spec = Self::new(name, SHT_NOBITS, &[]).flags(SectionFlags::ALLOC);
        spec.nobits_size = size;
        spec
    }

    /// Adds `SHF_WRITE`.
    #[must_use]
    pub fn writable(mut self) -> Self {
        self.flags |= SectionFlags::WRITE;
        self
    }

    /// Adds `SHF_EXECINSTR`.
    #[must_use]
    pub fn executable(mut self) -> Self {
        self.flags |= SectionFlags::EXECINSTR;
        self
    }

    /// Replaces the flags.
    #[must_use]
    pub fn flags(mut self, flags: SectionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Overrides the section type.
    #[must_use]
    pub fn kind(mut self, sh_type: u32) -> Self {
        self.sh_type = sh_type;
        self
    }

    /// Sets the alignment of the section in the file and in memory.
    #[must_use]
    pub fn align(mut self, align: u64) -> Self {
        self.align = align;
        self
    }

    /// Places the section at a fixed virtual address.
    #[must_use]
    pub fn addr(mut self, addr: u64) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Sets `sh_entsize`.
    #[must_use]
    pub fn entsize(mut self, entsize: u64) -> Self {
        self.entsize = entsize;
        self
    }

    fn is_nobits(&self) -> bool {
        self.sh_type == SHT_NOBITS
    }

    fn size(&self) -> u64 {
        if self.is_nobits() {
            self.nobits_size
        } else {
            self.data.len() as u64
        }
    }
}

#[derive(Debug, Clone)]
enum Cover {
    Sections {
        names: Vec<String>,
        include_headers: bool,
    },
    Raw {
        offset: u64,
        vaddr: u64,
        filesz: u64,
        memsz: u64,
    },
}

/// Declaration of one program header.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    p_type: u32,
    flags: SegmentFlags,
    align: u64,
    cover: Cover,
}

impl SegmentSpec {
    /// A segment of type `p_type` whose extent is derived from the sections
    /// it covers.
    #[must_use]
    pub fn new(p_type: u32, flags: SegmentFlags) -> Self {
        Self {
            p_type,
            flags,
            align: 0x1000,
            cover: Cover::Sections {
                names: Vec::new(),
                include_headers: false,
            },
        }
    }

    /// A `PT_LOAD` segment whose extent is derived from the sections it covers.
    #[must_use]
    pub fn load(flags: SegmentFlags) -> Self {
        Self::new(PT_LOAD, flags)
    }

    /// A segment with every field given explicitly.
    #[must_use]
    pub fn raw(
        p_type: u32,
        flags: SegmentFlags,
        offset: u64,
        vaddr: u64,
        filesz: u64,
        memsz: u64,
        align: u64,
    ) -> Self {
        Self {
            p_type,
            flags,
            align,
            cover: Cover::Raw {
                offset,
                vaddr,
                filesz,
                memsz,
            },
        }
    }

    /// Adds the named sections to the segment.
    #[must_use]
    pub fn covering(mut self, sections: &[&str]) -> Self {
        if let Cover::Sections { names, .. } = &mut self.cover {
            names.extend(sections.iter().map(|s| String::from(*s)));
        }
        self
    }

    /// Starts the segment at file offset 0 so it maps the file and program
    /// headers too, as linkers do for the first `PT_LOAD`.
    #[must_use]
    pub fn with_headers(mut self) -> Self {
        if let Cover::Sections {
            include_headers, ..
        } = &mut self.cover
        {
            *include_headers = true;
        }
        self
    }

    /// Sets `p_align`.
    #[must_use]
    pub fn align(mut self, align: u64) -> Self {
        self.align = align;
        self
    }
}

/// Declaration of one symbol, addressed relative to a section.
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    name: String,
    sym_type: u8,
    bind: u8,
    section: String,
    offset: u64,
    size: u64,
}

impl SymbolSpec {
    /// A symbol at `offset` bytes into `section`.
    #[must_use]
    pub fn new(name: &str, sym_type: u8, bind: u8, section: &str, offset: u64, size: u64) -> Self {
        Self {
            name: String::from(name),
            sym_type,
            bind,
            section: String::from(section),
            offset,
            size,
        }
    }
}

/// Placement decided for one section.
#[derive(Debug, Clone, Copy)]
struct Placed {
    name_off: u32,
    offset: u64,
    addr: u64,
}

/// Little-endian or big-endian field writer for one class.
struct Encoder {
    class: Class,
    endian: Endian,
    buf: Vec<u8>,
}

impl Encoder {
    fn uint(&mut self, value: u64, width: usize) {
        let bytes = value.to_le_bytes();
        let field = &bytes[..width];
        match self.endian {
            Endian::Little => self.buf.extend_from_slice(field),
            Endian::Big => self.buf.extend(field.iter().rev()),
        }
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.uint(u64::from(value), 2);
    }

    fn u32(&mut self, value: u32) {
        self.uint(u64::from(value), 4);
    }

    fn word(&mut self, value: u64) {
        #[expect(clippy::cast_possible_truncation, reason = "word size is 4 or 8")]
        let width = self.class.word_size() as usize;
        self.uint(value, width);
    }

    #[expect(clippy::cast_possible_truncation, reason = "fixture sizes are small")]
    fn pad_to(&mut self, offset: u64) {
        debug_assert!(offset as usize >= self.buf.len(), "layout went backwards");
        self.buf.resize(offset as usize, 0);
    }
}

/// Builder for synthetic ELF images.
#[derive(Debug, Clone)]
pub struct ElfBuilder {
    class: Class,
    endian: Endian,
    e_type: ElfType,
    machine: u16,
    entry: u64,
    base_vaddr: u64,
    sections: Vec<SectionSpec>,
    segments: Vec<SegmentSpec>,
    symbols: Vec<SymbolSpec>,
}

impl ElfBuilder {
    /// Starts an executable for x86-64 (ELF64) or i386 (ELF32).
    #[must_use]
    pub fn new(class: Class, endian: Endian) -> Self {
        let (machine, base_vaddr) = match class {
            Class::Elf32 => (3, 0x0804_8000),
            Class::Elf64 => (62, 0x40_0000),
        };
        Self {
            class,
            endian,
            e_type: ElfType::Executable,
            machine,
            entry: 0,
            base_vaddr,
            sections: Vec::new(),
            segments: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Sets `e_type`.
    #[must_use]
    pub fn elf_type(mut self, e_type: ElfType) -> Self {
        self.e_type = e_type;
        self
    }

    /// Sets `e_machine`.
    #[must_use]
    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Sets `e_entry`.
    #[must_use]
    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Sets the virtual address that file offset 0 maps to.
    #[must_use]
    pub fn base_vaddr(mut self, base: u64) -> Self {
        self.base_vaddr = base;
        self
    }

    /// Appends a section.
    #[must_use]
    pub fn section(mut self, section: SectionSpec) -> Self {
        self.sections.push(section);
        self
    }

    /// Appends a program header.
    #[must_use]
    pub fn segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    /// Declares a symbol; any symbol adds `.symtab` and `.strtab`.
    #[must_use]
    pub fn symbol(mut self, symbol: SymbolSpec) -> Self {
        self.symbols.push(symbol);
        self
    }

    /// Lays out and encodes the image.
    ///
    /// # Panics
    ///
    /// Panics if a segment or symbol names a section that was not declared.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "fixture sizes are small")]
    #[expect(clippy::too_many_lines, reason = "single linear layout pass")]
    pub fn build(self) -> Vec<u8> {
        let class = self.class;
        let word = class.word_size();

        // Locals first, as the symbol table's sh_info requires.
        let mut symbols = self.symbols.clone();
        symbols.sort_by_key(|s| s.bind != STB_LOCAL);
        let first_global = symbols.iter().take_while(|s| s.bind == STB_LOCAL).count() + 1;

        let mut sections = self.sections.clone();
        let mut strtab_data = vec![0u8];
        let mut sym_names = Vec::with_capacity(symbols.len());
        for sym in &symbols {
            sym_names.push(strtab_data.len() as u32);
            strtab_data.extend_from_slice(sym.name.as_bytes());
            strtab_data.push(0);
        }
        let symtab_index = if symbols.is_empty() {
            None
        } else {
            let index = sections.len() + 1;
            let size = (symbols.len() as u64 + 1) * class.sym_size();
            let placeholder = vec![0u8; size as usize];
            sections.push(
                SectionSpec::new(".symtab", SHT_SYMTAB, &placeholder)
                    .align(word)
                    .entsize(class.sym_size()),
            );
            sections.push(SectionSpec::new(".strtab", SHT_STRTAB, &strtab_data));
            Some(index)
        };

        let mut shstrtab = vec![0u8];
        let mut name_offs = Vec::with_capacity(sections.len() + 1);
        for section in &sections {
            name_offs.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(section.name.as_bytes());
            shstrtab.push(0);
        }
        name_offs.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(b".shstrtab\0");
        sections.push(SectionSpec::new(".shstrtab", SHT_STRTAB, &shstrtab));
        // Entry 0 of `sections` is section index 1.
        let shnum = sections.len() + 1;

        // Layout.
        let phnum = self.segments.len() as u64;
        let phoff = if phnum == 0 { 0 } else { class.header_size() };
        let mut cursor = class.header_size() + phnum * class.phdr_size();
        let mut mem_cursor = self.base_vaddr;
        let mut placed = Vec::with_capacity(sections.len());
        for (section, &name_off) in sections.iter().zip(&name_offs) {
            let offset = align_up(cursor, section.align);
            let alloc = section.flags.contains(SectionFlags::ALLOC);
            let addr = match section.addr {
                Some(addr) => addr,
                None if !alloc => 0,
                None if section.is_nobits() => {
                    align_up((self.base_vaddr + offset).max(mem_cursor), section.align)
                }
                None => self.base_vaddr + offset,
            };
            if alloc {
                mem_cursor = mem_cursor.max(addr + section.size());
            }
            if !section.is_nobits() {
                cursor = offset + section.size();
            }
            placed.push(Placed {
                name_off,
                offset,
                addr,
            });
        }
        let shoff = align_up(cursor, word);

        // Symbol table contents now that addresses are known.
        if let Some(index) = symtab_index {
            let mut enc = Encoder {
                class,
                endian: self.endian,
                buf: Vec::new(),
            };
            enc.buf.resize(class.sym_size() as usize, 0);
            for (sym, &name) in symbols.iter().zip(&sym_names) {
                let target = position(&sections, &sym.section);
                let value = placed[target].addr + sym.offset;
                let info = (sym.bind << 4) | (sym.sym_type & 0xf);
                let shndx = (target + 1) as u16;
                match class {
                    Class::Elf32 => {
                        enc.u32(name);
                        enc.word(value);
                        enc.word(sym.size);
                        enc.u8(info);
                        enc.u8(0);
                        enc.u16(shndx);
                    }
                    Class::Elf64 => {
                        enc.u32(name);
                        enc.u8(info);
                        enc.u8(0);
                        enc.u16(shndx);
                        enc.word(value);
                        enc.word(sym.size);
                    }
                }
            }
            sections[index - 1].data = enc.buf;
        }

        let mut enc = Encoder {
            class,
            endian: self.endian,
            buf: Vec::new(),
        };

        // File header.
        enc.buf.extend_from_slice(&ELF_MAGIC);
        enc.u8(match class {
            Class::Elf32 => ELFCLASS32,
            Class::Elf64 => ELFCLASS64,
        });
        enc.u8(match self.endian {
            Endian::Little => ELFDATA2LSB,
            Endian::Big => ELFDATA2MSB,
        });
        enc.u8(1);
        enc.pad_to(16);
        enc.u16(self.e_type.into());
        enc.u16(self.machine);
        enc.u32(1);
        enc.word(self.entry);
        enc.word(phoff);
        enc.word(shoff);
        enc.u32(0);
        enc.u16(class.header_size() as u16);
        enc.u16(class.phdr_size() as u16);
        enc.u16(phnum as u16);
        enc.u16(class.shdr_size() as u16);
        enc.u16(shnum as u16);
        enc.u16((shnum - 1) as u16);

        // Program headers.
        for segment in &self.segments {
            let (offset, vaddr, filesz, memsz) = match &segment.cover {
                Cover::Raw {
                    offset,
                    vaddr,
                    filesz,
                    memsz,
                } => (*offset, *vaddr, *filesz, *memsz),
                Cover::Sections {
                    names,
                    include_headers,
                } => {
                    let covered: Vec<usize> =
                        names.iter().map(|n| position(&sections, n)).collect();
                    let first = covered.iter().copied().min_by_key(|&i| placed[i].offset);
                    let offset = match first {
                        Some(i) if !include_headers => placed[i].offset,
                        _ => 0,
                    };
                    let vaddr = match first {
                        Some(i) => placed[i].addr - (placed[i].offset - offset),
                        None => self.base_vaddr,
                    };
                    let header_end = class.header_size() + phnum * class.phdr_size();
                    let file_end = covered
                        .iter()
                        .filter(|&&i| !sections[i].is_nobits())
                        .map(|&i| placed[i].offset + sections[i].size())
                        .chain(include_headers.then_some(header_end))
                        .max()
                        .unwrap_or(offset);
                    let mem_end = covered
                        .iter()
                        .map(|&i| placed[i].addr + sections[i].size())
                        .max()
                        .unwrap_or(vaddr);
                    let filesz = file_end - offset;
                    (offset, vaddr, filesz, (mem_end - vaddr).max(filesz))
                }
            };
            match class {
                Class::Elf32 => {
                    enc.u32(segment.p_type);
                    enc.word(offset);
                    enc.word(vaddr);
                    enc.word(vaddr);
                    enc.word(filesz);
                    enc.word(memsz);
                    enc.u32(segment.flags.bits());
                    enc.word(segment.align);
                }
                Class::Elf64 => {
                    enc.u32(segment.p_type);
                    enc.u32(segment.flags.bits());
                    enc.word(offset);
                    enc.word(vaddr);
                    enc.word(vaddr);
                    enc.word(filesz);
                    enc.word(memsz);
                    enc.word(segment.align);
                }
            }
        }

        // Section data.
        for (section, place) in sections.iter().zip(&placed) {
            if section.is_nobits() {
                continue;
            }
            enc.pad_to(place.offset);
            enc.buf.extend_from_slice(&section.data);
        }

        // Section header table, starting with the null entry.
        enc.pad_to(shoff);
        enc.buf.resize(enc.buf.len() + class.shdr_size() as usize, 0);
        let symtab_link = symtab_index.map_or(0, |i| i as u32 + 1);
        for (i, (section, place)) in sections.iter().zip(&placed).enumerate() {
            let (link, info) = if Some(i + 1) == symtab_index {
                (symtab_link, first_global as u32)
            } else {
                (0, 0)
            };
            enc.u32(place.name_off);
            enc.u32(section.sh_type);
            enc.word(section.flags.bits());
            enc.word(place.addr);
            enc.word(place.offset);
            enc.word(section.size());
            enc.u32(link);
            enc.u32(info);
            enc.word(section.align);
            enc.word(section.entsize);
        }

        enc.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ElfFile;
    use crate::reader::Reader;

    #[test]
    fn empty_image_has_null_and_name_table() {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little).build();
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        assert_eq!(elf.sections().len(), 2);
        assert_eq!(elf.header().e_shstrndx, 1);
        assert_eq!(elf.header().e_phoff, 0);
        assert_eq!(elf.header().e_shoff % 8, 0);
    }

    #[test]
    fn sections_respect_alignment() {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".a", &[1; 3]))
            .section(SectionSpec::progbits(".b", &[2; 5]).align(16))
            .build();
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let a = elf.section_by_name(".a").unwrap();
        let b = elf.section_by_name(".b").unwrap();
        assert_eq!(a.sh_offset, 64);
        assert_eq!(b.sh_offset, 80);
        assert_eq!(b.sh_addr, 0x40_0000 + 80);
        assert_eq!(elf.section_data(b).unwrap(), &[2; 5]);
    }

    #[test]
    fn headers_segment_starts_at_zero() {
        let buf = ElfBuilder::new(Class::Elf32, Endian::Little)
            .section(SectionSpec::progbits(".text", &[0x90; 12]).executable())
            .segment(
                SegmentSpec::load(SegmentFlags::R | SegmentFlags::X)
                    .with_headers()
                    .covering(&[".text"]),
            )
            .build();
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let load = elf.program_headers()[0];
        assert_eq!(load.p_offset, 0);
        assert_eq!(load.p_vaddr, 0x0804_8000);
        // 52-byte header + 32-byte phdr + 12 bytes of text.
        assert_eq!(load.p_filesz, 96);
        assert_eq!(load.p_memsz, 96);
    }

    #[test]
    fn consecutive_nobits_do_not_overlap() {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".data", &[1; 8]).writable())
            .section(SectionSpec::nobits(".tbss", 16).writable())
            .section(SectionSpec::nobits(".bss", 32).writable().align(32))
            .build();
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let tbss = elf.section_by_name(".tbss").unwrap();
        let bss = elf.section_by_name(".bss").unwrap();
        assert!(bss.sh_addr >= tbss.sh_addr + tbss.sh_size);
        assert_eq!(bss.sh_addr % 32, 0);
    }
}
