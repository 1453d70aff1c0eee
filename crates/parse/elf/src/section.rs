//! Section header table parsing.
//!
//! Parsing runs in two passes: every entry is decoded positionally with its
//! name left as a raw offset, then all names are resolved against the
//! section-name string table (`e_shstrndx`).

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{ElfError, Table};
use crate::header::{Class, Decoder, ElfHeader, check_table};
use crate::reader::Reader;

/// Section type: inactive entry.
pub const SHT_NULL: u32 = 0;
/// Section type: program-defined contents.
pub const SHT_PROGBITS: u32 = 1;
/// Section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;
/// Section type: string table.
pub const SHT_STRTAB: u32 = 3;
/// Section type: relocation entries with addends.
pub const SHT_RELA: u32 = 4;
/// Section type: symbol hash table.
pub const SHT_HASH: u32 = 5;
/// Section type: dynamic linking information.
pub const SHT_DYNAMIC: u32 = 6;
/// Section type: notes.
pub const SHT_NOTE: u32 = 7;
/// Section type: occupies no file space (`.bss`).
pub const SHT_NOBITS: u32 = 8;
/// Section type: relocation entries without addends.
pub const SHT_REL: u32 = 9;
/// Section type: dynamic symbol table.
pub const SHT_DYNSYM: u32 = 11;
/// Section type: array of constructors.
pub const SHT_INIT_ARRAY: u32 = 14;
/// Section type: array of destructors.
pub const SHT_FINI_ARRAY: u32 = 15;
/// Section type: array of pre-constructors.
pub const SHT_PREINIT_ARRAY: u32 = 16;
/// Section type: section group.
pub const SHT_GROUP: u32 = 17;
/// Section type: extended section indices.
pub const SHT_SYMTAB_SHNDX: u32 = 18;
/// GNU extension: GNU-style hash table.
pub const SHT_GNU_HASH: u32 = 0x6fff_fff6;
/// GNU extension: version definitions.
pub const SHT_GNU_VERDEF: u32 = 0x6fff_fffd;
/// GNU extension: version requirements.
pub const SHT_GNU_VERNEED: u32 = 0x6fff_fffe;
/// GNU extension: version symbol table.
pub const SHT_GNU_VERSYM: u32 = 0x6fff_ffff;

/// Special section index: undefined.
pub const SHN_UNDEF: u16 = 0;

/// Section type (`sh_type`).
///
/// Unknown values are kept verbatim in [`SectionType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    /// `SHT_NULL`.
    Null,
    /// `SHT_PROGBITS`.
    ProgBits,
    /// `SHT_SYMTAB`.
    SymTab,
    /// `SHT_STRTAB`.
    StrTab,
    /// `SHT_RELA`.
    Rela,
    /// `SHT_HASH`.
    Hash,
    /// `SHT_DYNAMIC`.
    Dynamic,
    /// `SHT_NOTE`.
    Note,
    /// `SHT_NOBITS`.
    NoBits,
    /// `SHT_REL`.
    Rel,
    /// `SHT_DYNSYM`.
    DynSym,
    /// `SHT_INIT_ARRAY`.
    InitArray,
    /// `SHT_FINI_ARRAY`.
    FiniArray,
    /// `SHT_PREINIT_ARRAY`.
    PreinitArray,
    /// `SHT_GROUP`.
    Group,
    /// `SHT_SYMTAB_SHNDX`.
    SymTabShndx,
    /// `SHT_GNU_HASH`.
    GnuHash,
    /// `SHT_GNU_verdef`.
    GnuVerdef,
    /// `SHT_GNU_verneed`.
    GnuVerneed,
    /// `SHT_GNU_versym`.
    GnuVersym,
    /// Any other value.
    Other(u32),
}

impl From<u32> for SectionType {
    fn from(value: u32) -> Self {
        match value {
            SHT_NULL => Self::Null,
            SHT_PROGBITS => Self::ProgBits,
            SHT_SYMTAB => Self::SymTab,
            SHT_STRTAB => Self::StrTab,
            SHT_RELA => Self::Rela,
            SHT_HASH => Self::Hash,
            SHT_DYNAMIC => Self::Dynamic,
            SHT_NOTE => Self::Note,
            SHT_NOBITS => Self::NoBits,
            SHT_REL => Self::Rel,
            SHT_DYNSYM => Self::DynSym,
            SHT_INIT_ARRAY => Self::InitArray,
            SHT_FINI_ARRAY => Self::FiniArray,
            SHT_PREINIT_ARRAY => Self::PreinitArray,
            SHT_GROUP => Self::Group,
            SHT_SYMTAB_SHNDX => Self::SymTabShndx,
            SHT_GNU_HASH => Self::GnuHash,
            SHT_GNU_VERDEF => Self::GnuVerdef,
            SHT_GNU_VERNEED => Self::GnuVerneed,
            SHT_GNU_VERSYM => Self::GnuVersym,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::ProgBits => "PROGBITS",
            Self::SymTab => "SYMTAB",
            Self::StrTab => "STRTAB",
            Self::Rela => "RELA",
            Self::Hash => "HASH",
            Self::Dynamic => "DYNAMIC",
            Self::Note => "NOTE",
            Self::NoBits => "NOBITS",
            Self::Rel => "REL",
            Self::DynSym => "DYNSYM",
            Self::InitArray => "INIT_ARRAY",
            Self::FiniArray => "FINI_ARRAY",
            Self::PreinitArray => "PREINIT_ARRAY",
            Self::Group => "GROUP",
            Self::SymTabShndx => "SYMTAB_SHNDX",
            Self::GnuHash => "GNU_HASH",
            Self::GnuVerdef => "VERDEF",
            Self::GnuVerneed => "VERNEED",
            Self::GnuVersym => "VERSYM",
            Self::Other(v) => return write!(f, "{v:#010x}"),
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// Section attribute flags (`sh_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        /// `SHF_WRITE`: writable at run time.
        const WRITE = 0x1;
        /// `SHF_ALLOC`: occupies memory during execution.
        const ALLOC = 0x2;
        /// `SHF_EXECINSTR`: executable machine instructions.
        const EXECINSTR = 0x4;
        /// `SHF_MERGE`: may be merged to eliminate duplicates.
        const MERGE = 0x10;
        /// `SHF_STRINGS`: NUL-terminated strings.
        const STRINGS = 0x20;
        /// `SHF_INFO_LINK`: `sh_info` holds a section index.
        const INFO_LINK = 0x40;
        /// `SHF_LINK_ORDER`: ordering requirement.
        const LINK_ORDER = 0x80;
        /// `SHF_OS_NONCONFORMING`: OS-specific processing required.
        const OS_NONCONFORMING = 0x100;
        /// `SHF_GROUP`: member of a section group.
        const GROUP = 0x200;
        /// `SHF_TLS`: thread-local storage.
        const TLS = 0x400;
        /// `SHF_COMPRESSED`: compressed data.
        const COMPRESSED = 0x800;
    }
}

impl fmt::Display for SectionFlags {
    /// Formats with readelf's single-letter key (`WAXMSILOGTC`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KEY: [(SectionFlags, char); 11] = [
            (SectionFlags::WRITE, 'W'),
            (SectionFlags::ALLOC, 'A'),
            (SectionFlags::EXECINSTR, 'X'),
            (SectionFlags::MERGE, 'M'),
            (SectionFlags::STRINGS, 'S'),
            (SectionFlags::INFO_LINK, 'I'),
            (SectionFlags::LINK_ORDER, 'L'),
            (SectionFlags::OS_NONCONFORMING, 'O'),
            (SectionFlags::GROUP, 'G'),
            (SectionFlags::TLS, 'T'),
            (SectionFlags::COMPRESSED, 'C'),
        ];
        for (flag, letter) in KEY {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// A parsed section header entry with its name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Position in the section header table.
    pub index: u32,
    /// Name resolved through the section-name string table.
    pub name: String,
    /// Raw offset of the name in the section-name string table.
    pub sh_name: u32,
    /// Section type.
    pub sh_type: SectionType,
    /// Attribute flags; unknown bits are retained.
    pub sh_flags: SectionFlags,
    /// Virtual address in memory (0 for non-allocated sections).
    pub sh_addr: u64,
    /// File offset of the section data.
    pub sh_offset: u64,
    /// Size of the section in bytes (in memory for `NOBITS`).
    pub sh_size: u64,
    /// Associated section index (e.g. the string table of a symbol table).
    pub sh_link: u32,
    /// Extra information, meaning depends on the type.
    pub sh_info: u32,
    /// Required alignment (zero or a power of two).
    pub sh_addralign: u64,
    /// Size of each entry for table-like sections.
    pub sh_entsize: u64,
}

impl SectionHeader {
    /// Decodes the entry at `offset`, leaving `name` empty.
    fn parse(d: &Decoder<'_, '_>, index: u32, offset: u64) -> Result<Self, ElfError> {
        let w = d.class.word_size();
        let sh_name = d.u32(offset)?;
        let sh_type = SectionType::from(d.u32(offset + 4)?);
        let flags_raw = match d.class {
            Class::Elf32 => u64::from(d.u32(offset + 8)?),
            Class::Elf64 => d.word(offset + 8)?,
        };
        let sh_addr = d.word(offset + 8 + w)?;
        let sh_offset = d.word(offset + 8 + 2 * w)?;
        let sh_size = d.word(offset + 8 + 3 * w)?;
        let rest = offset + 8 + 4 * w;
        Ok(Self {
            index,
            name: String::new(),
            sh_name,
            sh_type,
            sh_flags: SectionFlags::from_bits_retain(flags_raw),
            sh_addr,
            sh_offset,
            sh_size,
            sh_link: d.u32(rest)?,
            sh_info: d.u32(rest + 4)?,
            sh_addralign: d.word(rest + 8)?,
            sh_entsize: d.word(rest + 8 + w)?,
        })
    }

    /// Bytes the section occupies in the file (zero for `NOBITS`).
    #[must_use]
    pub fn file_size(&self) -> u64 {
        if self.is_nobits() { 0 } else { self.sh_size }
    }

    /// Returns `true` for zero-fill (`SHT_NOBITS`) sections.
    #[must_use]
    pub fn is_nobits(&self) -> bool {
        self.sh_type == SectionType::NoBits
    }

    /// Returns `true` if the section occupies memory at run time.
    #[must_use]
    pub fn is_alloc(&self) -> bool {
        self.sh_flags.contains(SectionFlags::ALLOC)
    }

    /// Returns `true` for thread-local sections.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.sh_flags.contains(SectionFlags::TLS)
    }
}

/// A NUL-terminated string table located in the file.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'r, 'a> {
    reader: &'r Reader<'a>,
    offset: u64,
    size: u64,
}

impl<'r, 'a> StringTable<'r, 'a> {
    /// Locates the string table held by `section`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::TruncatedTable`] if the table data lies outside
    /// the file or the section is `NOBITS` with a non-zero size.
    pub fn new(reader: &'r Reader<'a>, section: &SectionHeader) -> Result<Self, ElfError> {
        let truncated = ElfError::TruncatedTable(Table::SectionData(section.index));
        if section.is_nobits() && section.sh_size != 0 {
            return Err(truncated);
        }
        reader
            .read_bytes(section.sh_offset, section.sh_size)
            .map_err(|_| truncated)?;
        Ok(Self {
            reader,
            offset: section.sh_offset,
            size: section.sh_size,
        })
    }

    /// Looks up the string starting at `offset` within the table.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::UnterminatedString`] if no NUL byte follows
    /// `offset` inside the table.
    pub fn get(&self, offset: u32) -> Result<String, ElfError> {
        self.reader
            .read_cstr(self.offset, self.size, u64::from(offset))
    }
}

/// Parses the section header table and resolves every name.
///
/// # Errors
///
/// - [`ElfError::TruncatedTable`] if the table (or the name table's data)
///   runs past the end of the file.
/// - [`ElfError::InvalidStringTableIndex`] if `e_shstrndx` is not a valid
///   section index.
/// - [`ElfError::UnterminatedString`] if a name is not NUL-terminated
///   inside the name table.
pub(crate) fn parse_section_headers(
    d: &Decoder<'_, '_>,
    header: &ElfHeader,
) -> Result<Vec<SectionHeader>, ElfError> {
    check_table(
        d.reader,
        Table::SectionHeaders,
        header.e_shoff,
        header.e_shnum,
        header.e_shentsize,
        d.class.shdr_size(),
    )?;

    // Pass 1: positional decode.
    let entsize = u64::from(header.e_shentsize);
    let mut sections = (0..header.e_shnum)
        .map(|i| SectionHeader::parse(d, i, header.e_shoff + u64::from(i) * entsize))
        .collect::<Result<Vec<_>, _>>()?;

    // Pass 2: names.
    if header.e_shstrndx == u32::from(SHN_UNDEF) {
        return Ok(sections);
    }
    let names = sections
        .get(header.e_shstrndx as usize)
        .ok_or(ElfError::InvalidStringTableIndex {
            index: header.e_shstrndx,
            count: header.e_shnum,
        })?;
    let strtab = StringTable::new(d.reader, names)?;
    for section in &mut sections {
        section.name = strtab.get(section.sh_name)?;
    }

    Ok(sections)
}
