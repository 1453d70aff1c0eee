//! ELF file header parsing.
//!
//! Decodes the identity bytes first (magic, class, data encoding), then the
//! class-dependent remainder of the header in the file's own byte order.

use core::fmt;

use crate::error::{ElfError, Table};
use crate::reader::{Endian, Reader};

/// ELF magic bytes: `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Size of the `e_ident` array.
pub const EI_NIDENT: u64 = 16;

/// `EI_CLASS` value for 32-bit objects.
pub const ELFCLASS32: u8 = 1;
/// `EI_CLASS` value for 64-bit objects.
pub const ELFCLASS64: u8 = 2;
/// `EI_DATA` value for little-endian objects.
pub const ELFDATA2LSB: u8 = 1;
/// `EI_DATA` value for big-endian objects.
pub const ELFDATA2MSB: u8 = 2;

/// `e_phnum` escape value: the real count lives in section 0's `sh_info`.
pub const PN_XNUM: u16 = 0xffff;
/// `e_shstrndx` escape value: the real index lives in section 0's `sh_link`.
pub const SHN_XINDEX: u16 = 0xffff;

/// Address class of an ELF object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// 32-bit addresses and offsets.
    Elf32,
    /// 64-bit addresses and offsets.
    Elf64,
}

impl Class {
    /// Size of an address-sized field in bytes.
    #[must_use]
    pub const fn word_size(self) -> u64 {
        match self {
            Self::Elf32 => 4,
            Self::Elf64 => 8,
        }
    }

    /// Size of the file header.
    #[must_use]
    pub const fn header_size(self) -> u64 {
        match self {
            Self::Elf32 => 52,
            Self::Elf64 => 64,
        }
    }

    /// Size of one program header entry.
    #[must_use]
    pub const fn phdr_size(self) -> u64 {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 56,
        }
    }

    /// Size of one section header entry.
    #[must_use]
    pub const fn shdr_size(self) -> u64 {
        match self {
            Self::Elf32 => 40,
            Self::Elf64 => 64,
        }
    }

    /// Size of one symbol table entry.
    #[must_use]
    pub const fn sym_size(self) -> u64 {
        match self {
            Self::Elf32 => 16,
            Self::Elf64 => 24,
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elf32 => write!(f, "ELF32"),
            Self::Elf64 => write!(f, "ELF64"),
        }
    }
}

/// Object file type (`e_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfType {
    /// `ET_NONE`.
    None,
    /// `ET_REL`: relocatable object.
    Relocatable,
    /// `ET_EXEC`: fixed-address executable.
    Executable,
    /// `ET_DYN`: shared object or position-independent executable.
    Shared,
    /// `ET_CORE`: core dump.
    Core,
    /// Any other (OS- or processor-specific) value.
    Other(u16),
}

impl From<u16> for ElfType {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Relocatable,
            2 => Self::Executable,
            3 => Self::Shared,
            4 => Self::Core,
            other => Self::Other(other),
        }
    }
}

impl From<ElfType> for u16 {
    fn from(value: ElfType) -> Self {
        match value {
            ElfType::None => 0,
            ElfType::Relocatable => 1,
            ElfType::Executable => 2,
            ElfType::Shared => 3,
            ElfType::Core => 4,
            ElfType::Other(other) => other,
        }
    }
}

impl fmt::Display for ElfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Relocatable => write!(f, "REL"),
            Self::Executable => write!(f, "EXEC"),
            Self::Shared => write!(f, "DYN"),
            Self::Core => write!(f, "CORE"),
            Self::Other(v) => write!(f, "{v:#06x}"),
        }
    }
}

/// Returns a human-readable name for an `e_machine` value.
#[must_use]
pub fn machine_name(machine: u16) -> &'static str {
    match machine {
        0 => "none",
        3 => "Intel 80386",
        8 => "MIPS",
        20 => "PowerPC",
        21 => "PowerPC64",
        22 => "IBM S/390",
        40 => "ARM",
        42 => "SuperH",
        50 => "IA-64",
        62 => "x86-64",
        183 => "AArch64",
        243 => "RISC-V",
        258 => "LoongArch",
        _ => "unknown",
    }
}

/// The identity bytes (`e_ident`) of an ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdentity {
    /// The four magic bytes.
    pub magic: [u8; 4],
    /// Address class.
    pub class: Class,
    /// Byte order of every multi-byte field.
    pub endian: Endian,
    /// `EI_VERSION`.
    pub version: u8,
    /// `EI_OSABI`.
    pub os_abi: u8,
    /// `EI_ABIVERSION`.
    pub abi_version: u8,
}

impl ElfIdentity {
    /// Decodes and validates the identity bytes.
    ///
    /// # Errors
    ///
    /// - [`ElfError::InvalidMagic`] if the magic does not match (checked on
    ///   whatever prefix of the four bytes is present).
    /// - [`ElfError::TruncatedHeader`] if the file is shorter than `e_ident`.
    /// - [`ElfError::UnsupportedClass`] / [`ElfError::UnsupportedEncoding`].
    pub fn parse(reader: &Reader<'_>) -> Result<Self, ElfError> {
        let prefix = reader.as_bytes();
        let magic_len = prefix.len().min(ELF_MAGIC.len());
        if prefix[..magic_len] != ELF_MAGIC[..magic_len] {
            return Err(ElfError::InvalidMagic);
        }
        if reader.len() < EI_NIDENT {
            return Err(ElfError::TruncatedHeader {
                needed: EI_NIDENT,
                available: reader.len(),
            });
        }

        let ident = reader.read_bytes(0, EI_NIDENT)?;
        let class = match ident[4] {
            ELFCLASS32 => Class::Elf32,
            ELFCLASS64 => Class::Elf64,
            other => return Err(ElfError::UnsupportedClass(other)),
        };
        let endian = match ident[5] {
            ELFDATA2LSB => Endian::Little,
            ELFDATA2MSB => Endian::Big,
            other => return Err(ElfError::UnsupportedEncoding(other)),
        };

        Ok(Self {
            magic: ELF_MAGIC,
            class,
            endian,
            version: ident[6],
            os_abi: ident[7],
            abi_version: ident[8],
        })
    }
}

/// Field decoder bound to one file's class and byte order.
#[derive(Clone, Copy)]
pub(crate) struct Decoder<'r, 'a> {
    pub(crate) reader: &'r Reader<'a>,
    pub(crate) class: Class,
    pub(crate) endian: Endian,
}

impl<'r, 'a> Decoder<'r, 'a> {
    pub(crate) fn new(reader: &'r Reader<'a>, ident: &ElfIdentity) -> Self {
        Self {
            reader,
            class: ident.class,
            endian: ident.endian,
        }
    }

    pub(crate) fn u8(&self, off: u64) -> Result<u8, ElfError> {
        self.reader.read_u8(off)
    }

    pub(crate) fn u16(&self, off: u64) -> Result<u16, ElfError> {
        self.reader.read_u16(off, self.endian)
    }

    pub(crate) fn u32(&self, off: u64) -> Result<u32, ElfError> {
        self.reader.read_u32(off, self.endian)
    }

    /// Reads an address-sized field (`Elf32_Addr`/`Elf64_Addr`, `_Off`, `_Xword`).
    pub(crate) fn word(&self, off: u64) -> Result<u64, ElfError> {
        #[expect(clippy::cast_possible_truncation, reason = "word size is 4 or 8")]
        let width = self.class.word_size() as usize;
        self.reader.read_uint(off, width, self.endian)
    }
}

/// Parsed ELF file header.
///
/// Counts and the string table index are already resolved through the
/// extended-numbering escapes (`PN_XNUM`, `SHN_XINDEX`, `e_shnum == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    /// Object file type.
    pub e_type: ElfType,
    /// Target machine architecture.
    pub e_machine: u16,
    /// `e_version`.
    pub e_version: u32,
    /// Virtual address of the entry point.
    pub e_entry: u64,
    /// Offset of the program header table in the file.
    pub e_phoff: u64,
    /// Offset of the section header table in the file.
    pub e_shoff: u64,
    /// Processor-specific flags.
    pub e_flags: u32,
    /// Size of this header as recorded in the file.
    pub e_ehsize: u16,
    /// Size of each program header entry.
    pub e_phentsize: u16,
    /// Number of program header entries.
    pub e_phnum: u32,
    /// Size of each section header entry.
    pub e_shentsize: u16,
    /// Number of section header entries.
    pub e_shnum: u32,
    /// Index of the section holding section names.
    pub e_shstrndx: u32,
}

impl ElfHeader {
    /// Parses the file header that follows `ident`.
    ///
    /// # Errors
    ///
    /// - [`ElfError::TruncatedHeader`] if the file is shorter than the header
    ///   of the detected class.
    /// - [`ElfError::TruncatedTable`] if extended numbering points at a
    ///   section 0 that lies outside the file.
    #[expect(clippy::similar_names, reason = "ELF field names")]
    pub fn parse(reader: &Reader<'_>, ident: &ElfIdentity) -> Result<Self, ElfError> {
        let needed = ident.class.header_size();
        if reader.len() < needed {
            return Err(ElfError::TruncatedHeader {
                needed,
                available: reader.len(),
            });
        }

        let d = Decoder::new(reader, ident);
        let w = ident.class.word_size();

        let e_type = ElfType::from(d.u16(16)?);
        let e_machine = d.u16(18)?;
        let e_version = d.u32(20)?;
        let e_entry = d.word(24)?;
        let e_phoff = d.word(24 + w)?;
        let e_shoff = d.word(24 + 2 * w)?;
        let tail = 24 + 3 * w;
        let e_flags = d.u32(tail)?;
        let e_ehsize = d.u16(tail + 4)?;
        let e_phentsize = d.u16(tail + 6)?;
        let raw_phnum = d.u16(tail + 8)?;
        let e_shentsize = d.u16(tail + 10)?;
        let raw_shnum = d.u16(tail + 12)?;
        let raw_shstrndx = d.u16(tail + 14)?;

        let mut header = Self {
            e_type,
            e_machine,
            e_version,
            e_entry,
            e_phoff,
            e_shoff,
            e_flags,
            e_ehsize,
            e_phentsize,
            e_phnum: u32::from(raw_phnum),
            e_shentsize,
            e_shnum: u32::from(raw_shnum),
            e_shstrndx: u32::from(raw_shstrndx),
        };

        let extended =
            (raw_shnum == 0 && e_shoff != 0) || raw_shstrndx == SHN_XINDEX || raw_phnum == PN_XNUM;
        if extended {
            let (size, link, info) = header.initial_section(&d)?;
            if raw_shnum == 0 {
                header.e_shnum = u32::try_from(size).unwrap_or(u32::MAX);
            }
            if raw_shstrndx == SHN_XINDEX {
                header.e_shstrndx = link;
            }
            if raw_phnum == PN_XNUM {
                header.e_phnum = info;
            }
        }

        Ok(header)
    }

    /// Reads `sh_size`, `sh_link` and `sh_info` of section 0, which carry
    /// the overflow values for extended numbering.
    fn initial_section(&self, d: &Decoder<'_, '_>) -> Result<(u64, u32, u32), ElfError> {
        let shdr_size = d.class.shdr_size();
        if d.reader.read_bytes(self.e_shoff, shdr_size).is_err() {
            return Err(ElfError::TruncatedTable(Table::SectionHeaders));
        }
        let base = self.e_shoff;
        Ok(match d.class {
            Class::Elf32 => (
                u64::from(d.u32(base + 20)?),
                d.u32(base + 24)?,
                d.u32(base + 28)?,
            ),
            Class::Elf64 => (d.word(base + 32)?, d.u32(base + 40)?, d.u32(base + 44)?),
        })
    }

    /// Byte extent `(offset, size)` of the program header table.
    #[must_use]
    pub fn program_table_extent(&self) -> Option<(u64, u64)> {
        let size = u64::from(self.e_phnum).checked_mul(u64::from(self.e_phentsize))?;
        Some((self.e_phoff, size))
    }

    /// Byte extent `(offset, size)` of the section header table.
    #[must_use]
    pub fn section_table_extent(&self) -> Option<(u64, u64)> {
        let size = u64::from(self.e_shnum).checked_mul(u64::from(self.e_shentsize))?;
        Some((self.e_shoff, size))
    }
}

/// Checks that a table of `count` entries of `entsize` bytes at `offset`
/// lies inside the file and that entries are at least `min_entsize` long.
pub(crate) fn check_table(
    reader: &Reader<'_>,
    table: Table,
    offset: u64,
    count: u32,
    entsize: u16,
    min_entsize: u64,
) -> Result<(), ElfError> {
    if count == 0 {
        return Ok(());
    }
    if u64::from(entsize) < min_entsize {
        return Err(ElfError::TruncatedTable(table));
    }
    let end = u64::from(count)
        .checked_mul(u64::from(entsize))
        .and_then(|size| offset.checked_add(size))
        .ok_or(ElfError::TruncatedTable(table))?;
    if end > reader.len() {
        return Err(ElfError::TruncatedTable(table));
    }
    Ok(())
}
