//! Program header (segment) table parsing.
//!
//! Segments are the loader's view of the file: each `PT_LOAD` entry maps
//! `filesz` bytes from the file and zero-fills the remaining
//! `memsz - filesz` bytes (the `.bss` tail).

use alloc::vec::Vec;
use core::fmt;

use crate::error::{ElfError, Table};
use crate::header::{Class, Decoder, ElfHeader, check_table};

/// Program header type: unused entry.
pub const PT_NULL: u32 = 0;
/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;
/// Program header type: dynamic linking information.
pub const PT_DYNAMIC: u32 = 2;
/// Program header type: program interpreter path.
pub const PT_INTERP: u32 = 3;
/// Program header type: auxiliary notes.
pub const PT_NOTE: u32 = 4;
/// Program header type: reserved.
pub const PT_SHLIB: u32 = 5;
/// Program header type: the program header table itself.
pub const PT_PHDR: u32 = 6;
/// Program header type: thread-local storage template.
pub const PT_TLS: u32 = 7;
/// GNU extension: `.eh_frame_hdr` location.
pub const PT_GNU_EH_FRAME: u32 = 0x6474_e550;
/// GNU extension: stack executability.
pub const PT_GNU_STACK: u32 = 0x6474_e551;
/// GNU extension: read-only after relocation.
pub const PT_GNU_RELRO: u32 = 0x6474_e552;
/// GNU extension: program properties.
pub const PT_GNU_PROPERTY: u32 = 0x6474_e553;

/// Segment type (`p_type`).
///
/// Unknown values are kept verbatim in [`SegmentType::Other`]; they are not
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// `PT_NULL`.
    Null,
    /// `PT_LOAD`.
    Load,
    /// `PT_DYNAMIC`.
    Dynamic,
    /// `PT_INTERP`.
    Interp,
    /// `PT_NOTE`.
    Note,
    /// `PT_SHLIB`.
    Shlib,
    /// `PT_PHDR`.
    Phdr,
    /// `PT_TLS`.
    Tls,
    /// `PT_GNU_EH_FRAME`.
    GnuEhFrame,
    /// `PT_GNU_STACK`.
    GnuStack,
    /// `PT_GNU_RELRO`.
    GnuRelro,
    /// `PT_GNU_PROPERTY`.
    GnuProperty,
    /// Any other value.
    Other(u32),
}

impl From<u32> for SegmentType {
    fn from(value: u32) -> Self {
        match value {
            PT_NULL => Self::Null,
            PT_LOAD => Self::Load,
            PT_DYNAMIC => Self::Dynamic,
            PT_INTERP => Self::Interp,
            PT_NOTE => Self::Note,
            PT_SHLIB => Self::Shlib,
            PT_PHDR => Self::Phdr,
            PT_TLS => Self::Tls,
            PT_GNU_EH_FRAME => Self::GnuEhFrame,
            PT_GNU_STACK => Self::GnuStack,
            PT_GNU_RELRO => Self::GnuRelro,
            PT_GNU_PROPERTY => Self::GnuProperty,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::Load => "LOAD",
            Self::Dynamic => "DYNAMIC",
            Self::Interp => "INTERP",
            Self::Note => "NOTE",
            Self::Shlib => "SHLIB",
            Self::Phdr => "PHDR",
            Self::Tls => "TLS",
            Self::GnuEhFrame => "GNU_EH_FRAME",
            Self::GnuStack => "GNU_STACK",
            Self::GnuRelro => "GNU_RELRO",
            Self::GnuProperty => "GNU_PROPERTY",
            Self::Other(v) => return write!(f, "{v:#010x}"),
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// Segment permission flags (`p_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        /// `PF_X`: executable.
        const X = 0x1;
        /// `PF_W`: writable.
        const W = 0x2;
        /// `PF_R`: readable.
        const R = 0x4;
    }
}

impl fmt::Display for SegmentFlags {
    /// Formats as readelf does: `R`, `W`, `E` columns, blank when unset.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::R) { 'R' } else { ' ' };
        let w = if self.contains(Self::W) { 'W' } else { ' ' };
        let x = if self.contains(Self::X) { 'E' } else { ' ' };
        write!(f, "{r}{w}{x}")
    }
}

/// A parsed program header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Position in the program header table.
    pub index: usize,
    /// Segment type.
    pub p_type: SegmentType,
    /// Permission flags; bits outside `R|W|X` are retained.
    pub p_flags: SegmentFlags,
    /// Offset of the segment data in the file.
    pub p_offset: u64,
    /// Virtual address of the segment.
    pub p_vaddr: u64,
    /// Physical address of the segment.
    pub p_paddr: u64,
    /// Bytes of the segment present in the file.
    pub p_filesz: u64,
    /// Bytes of the segment in memory.
    pub p_memsz: u64,
    /// Alignment in memory and in the file.
    pub p_align: u64,
}

impl ProgramHeader {
    /// Decodes the entry at `offset`.
    ///
    /// Field order differs between classes: ELF32 stores `p_flags` after
    /// `p_memsz`, ELF64 right after `p_type`.
    fn parse(d: &Decoder<'_, '_>, index: usize, offset: u64) -> Result<Self, ElfError> {
        let p_type = SegmentType::from(d.u32(offset)?);
        Ok(match d.class {
            Class::Elf32 => Self {
                index,
                p_type,
                p_offset: d.word(offset + 4)?,
                p_vaddr: d.word(offset + 8)?,
                p_paddr: d.word(offset + 12)?,
                p_filesz: d.word(offset + 16)?,
                p_memsz: d.word(offset + 20)?,
                p_flags: SegmentFlags::from_bits_retain(d.u32(offset + 24)?),
                p_align: d.word(offset + 28)?,
            },
            Class::Elf64 => Self {
                index,
                p_type,
                p_flags: SegmentFlags::from_bits_retain(d.u32(offset + 4)?),
                p_offset: d.word(offset + 8)?,
                p_vaddr: d.word(offset + 16)?,
                p_paddr: d.word(offset + 24)?,
                p_filesz: d.word(offset + 32)?,
                p_memsz: d.word(offset + 40)?,
                p_align: d.word(offset + 48)?,
            },
        })
    }

    /// Returns `true` for `PT_LOAD` segments.
    #[must_use]
    pub fn is_load(&self) -> bool {
        self.p_type == SegmentType::Load
    }

    /// Bytes that exist only in memory (`memsz - filesz`), zero when the
    /// segment is malformed with `memsz < filesz`.
    #[must_use]
    pub fn zero_fill_size(&self) -> u64 {
        self.p_memsz.saturating_sub(self.p_filesz)
    }

    /// Returns `true` if `p_align` is zero or a power of two.
    #[must_use]
    pub fn has_valid_alignment(&self) -> bool {
        self.p_align == 0 || self.p_align.is_power_of_two()
    }

    /// Returns `true` if the virtual range `[addr, addr + size)` lies within
    /// the segment's memory image.
    #[must_use]
    pub fn contains_vaddr_range(&self, addr: u64, size: u64) -> bool {
        let Some(seg_end) = self.p_vaddr.checked_add(self.p_memsz) else {
            return false;
        };
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        addr >= self.p_vaddr && end <= seg_end
    }
}

/// Parses the whole program header table.
///
/// # Errors
///
/// Returns [`ElfError::TruncatedTable`] if the table extent exceeds the file
/// or the entry size is smaller than the class's native entry.
pub(crate) fn parse_program_headers(
    d: &Decoder<'_, '_>,
    header: &ElfHeader,
) -> Result<Vec<ProgramHeader>, ElfError> {
    check_table(
        d.reader,
        Table::ProgramHeaders,
        header.e_phoff,
        header.e_phnum,
        header.e_phentsize,
        d.class.phdr_size(),
    )?;

    let entsize = u64::from(header.e_phentsize);
    (0..header.e_phnum)
        .map(|i| {
            let offset = header.e_phoff + u64::from(i) * entsize;
            ProgramHeader::parse(d, i as usize, offset)
        })
        .collect()
}
