//! The parsed view of one ELF file.
//!
//! [`ElfFile::parse`] runs the whole pipeline in a single pass: identity and
//! file header first, then the program and section header tables. Any error
//! aborts the parse; the tables are never consulted when the header is bad.

use alloc::vec::Vec;

use crate::error::{ElfError, Table};
use crate::header::{Decoder, ElfHeader, ElfIdentity};
use crate::reader::Reader;
use crate::section::{SectionHeader, SectionType, parse_section_headers};
use crate::segment::{ProgramHeader, parse_program_headers};
use crate::symbol::{Symbol, parse_symbols};

/// A parsed ELF file: the reader plus an immutable snapshot of its headers.
#[derive(Debug, Clone)]
pub struct ElfFile<'a> {
    reader: Reader<'a>,
    identity: ElfIdentity,
    header: ElfHeader,
    program_headers: Vec<ProgramHeader>,
    sections: Vec<SectionHeader>,
}

impl<'a> ElfFile<'a> {
    /// Parses the image held by `reader`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ElfError`] encountered; no partial result is
    /// produced.
    pub fn parse(reader: Reader<'a>) -> Result<Self, ElfError> {
        let identity = ElfIdentity::parse(&reader)?;
        let header = ElfHeader::parse(&reader, &identity)?;
        let d = Decoder::new(&reader, &identity);
        let program_headers = parse_program_headers(&d, &header)?;
        let sections = parse_section_headers(&d, &header)?;
        Ok(Self {
            reader,
            identity,
            header,
            program_headers,
            sections,
        })
    }

    /// Returns the decoded identity bytes.
    #[must_use]
    pub fn identity(&self) -> &ElfIdentity {
        &self.identity
    }

    /// Returns the parsed file header.
    #[must_use]
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// Returns the virtual address of the entry point.
    #[must_use]
    pub fn entry_point(&self) -> u64 {
        self.header.e_entry
    }

    /// Returns all program headers in table order.
    #[must_use]
    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }

    /// Returns the `PT_LOAD` program headers.
    pub fn load_segments(&self) -> impl Iterator<Item = &ProgramHeader> {
        self.program_headers.iter().filter(|p| p.is_load())
    }

    /// Returns all section headers in table order (index 0 is the null section).
    #[must_use]
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Finds the first section with the given name.
    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Finds the first section with the given type.
    #[must_use]
    pub fn section_by_type(&self, sh_type: SectionType) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.sh_type == sh_type)
    }

    /// Returns the file bytes of `section` (empty for `NOBITS`).
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::TruncatedTable`] if the data lies outside the file.
    pub fn section_data(&self, section: &SectionHeader) -> Result<&[u8], ElfError> {
        self.reader
            .read_bytes(section.sh_offset, section.file_size())
            .map_err(|_| ElfError::TruncatedTable(Table::SectionData(section.index)))
    }

    /// Decodes the symbols of a `SHT_SYMTAB`/`SHT_DYNSYM` section.
    ///
    /// # Errors
    ///
    /// See [`ElfError`]: truncated data, a bad `sh_link` or a malformed name.
    pub fn symbols(&self, symtab: &SectionHeader) -> Result<Vec<Symbol>, ElfError> {
        let d = Decoder::new(&self.reader, &self.identity);
        parse_symbols(&d, &self.sections, symtab)
    }

    /// Returns the symbol table sections (`.symtab` and `.dynsym`).
    pub fn symbol_tables(&self) -> impl Iterator<Item = &SectionHeader> {
        self.sections
            .iter()
            .filter(|s| matches!(s.sh_type, SectionType::SymTab | SectionType::DynSym))
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.reader.len()
    }

    /// Returns the underlying reader.
    #[must_use]
    pub fn reader(&self) -> &Reader<'a> {
        &self.reader
    }
}

#[cfg(feature = "std")]
impl ElfFile<'static> {
    /// Opens and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// I/O errors ([`ElfError::NotFound`], [`ElfError::PermissionDenied`],
    /// [`ElfError::Io`]) or any parse error.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ElfError> {
        Self::parse(Reader::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ElfBuilder, SectionSpec};
    use crate::header::Class;
    use crate::reader::Endian;

    #[test]
    fn corrupt_magic_stops_before_tables() {
        // Both tables are also truncated; the magic error must win.
        let mut buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".text", &[0x90; 8]).executable())
            .build();
        buf[1] = b'X';
        buf[56..58].copy_from_slice(&100u16.to_le_bytes());
        buf.truncate(buf.len() - 8);
        assert_eq!(
            ElfFile::parse(Reader::from_bytes(&buf)).err(),
            Some(ElfError::InvalidMagic)
        );
    }

    #[test]
    fn section_data_round_trip() {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".rodata", b"I am Const Data\0"))
            .section(SectionSpec::nobits(".bss", 64).writable())
            .build();
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let rodata = elf.section_by_name(".rodata").unwrap();
        assert_eq!(elf.section_data(rodata).unwrap(), b"I am Const Data\0");
        let bss = elf.section_by_name(".bss").unwrap();
        assert!(elf.section_data(bss).unwrap().is_empty());
        assert_eq!(elf.file_size(), buf.len() as u64);
    }

    #[test]
    fn open_missing_file() {
        let path = std::env::temp_dir().join("elfsight-does-not-exist.bin");
        assert_eq!(ElfFile::open(&path).err(), Some(ElfError::NotFound));
    }

    #[test]
    fn open_file_from_disk() {
        let buf = ElfBuilder::new(Class::Elf64, Endian::Little)
            .section(SectionSpec::progbits(".text", &[0x90; 8]).executable())
            .build();
        let path = std::env::temp_dir().join(format!("elfsight-open-{}.elf", std::process::id()));
        std::fs::write(&path, &buf).unwrap();
        let elf = ElfFile::open(&path);
        std::fs::remove_file(&path).unwrap();
        let elf = elf.expect("valid ELF on disk");
        assert!(elf.section_by_name(".text").is_some());
        assert!(elf.section_by_type(SectionType::StrTab).is_some());
    }

    #[test]
    fn parsed_file_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ElfFile<'static>>();
    }
}
