//! Symbol table (`.symtab` / `.dynsym`) decoding.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{ElfError, Table};
use crate::header::{Class, Decoder};
use crate::section::{SectionHeader, SectionType, StringTable};

/// Symbol type: unspecified.
pub const STT_NOTYPE: u8 = 0;
/// Symbol type: data object.
pub const STT_OBJECT: u8 = 1;
/// Symbol type: function.
pub const STT_FUNC: u8 = 2;
/// Symbol type: section.
pub const STT_SECTION: u8 = 3;
/// Symbol type: source file.
pub const STT_FILE: u8 = 4;
/// Symbol type: thread-local object.
pub const STT_TLS: u8 = 6;

/// Symbol binding: local.
pub const STB_LOCAL: u8 = 0;
/// Symbol binding: global.
pub const STB_GLOBAL: u8 = 1;
/// Symbol binding: weak.
pub const STB_WEAK: u8 = 2;

/// A decoded symbol with its name resolved through the linked string table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Resolved name (empty for the null symbol and unnamed symbols).
    pub name: String,
    /// Symbol value (an address for defined symbols in executables).
    pub st_value: u64,
    /// Size in bytes.
    pub st_size: u64,
    /// Type and binding packed into one byte.
    pub st_info: u8,
    /// Visibility.
    pub st_other: u8,
    /// Index of the section the symbol is defined in.
    pub st_shndx: u16,
}

impl Symbol {
    /// Returns the symbol type (lower 4 bits of `st_info`).
    #[must_use]
    pub fn sym_type(&self) -> u8 {
        self.st_info & 0xf
    }

    /// Returns the symbol binding (upper 4 bits of `st_info`).
    #[must_use]
    pub fn sym_bind(&self) -> u8 {
        self.st_info >> 4
    }
}

/// Short readelf-style name for a symbol type.
#[must_use]
pub fn type_name(sym_type: u8) -> &'static str {
    match sym_type {
        STT_NOTYPE => "NOTYPE",
        STT_OBJECT => "OBJECT",
        STT_FUNC => "FUNC",
        STT_SECTION => "SECTION",
        STT_FILE => "FILE",
        STT_TLS => "TLS",
        _ => "OTHER",
    }
}

/// Short readelf-style name for a symbol binding.
#[must_use]
pub fn bind_name(bind: u8) -> &'static str {
    match bind {
        STB_LOCAL => "LOCAL",
        STB_GLOBAL => "GLOBAL",
        STB_WEAK => "WEAK",
        _ => "OTHER",
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#018x} {:>6} {:<7} {:<6} {}",
            self.st_value,
            self.st_size,
            type_name(self.sym_type()),
            bind_name(self.sym_bind()),
            self.name
        )
    }
}

/// Decodes every entry of a `SHT_SYMTAB` or `SHT_DYNSYM` section.
///
/// Returns an empty list for sections of any other type.
///
/// # Errors
///
/// - [`ElfError::TruncatedTable`] if the symbol data lies outside the file.
/// - [`ElfError::InvalidStringTableIndex`] if `sh_link` is not a valid
///   section index.
/// - [`ElfError::UnterminatedString`] for a malformed name.
pub(crate) fn parse_symbols(
    d: &Decoder<'_, '_>,
    sections: &[SectionHeader],
    symtab: &SectionHeader,
) -> Result<Vec<Symbol>, ElfError> {
    if !matches!(symtab.sh_type, SectionType::SymTab | SectionType::DynSym) {
        return Ok(Vec::new());
    }
    let truncated = ElfError::TruncatedTable(Table::SectionData(symtab.index));
    d.reader
        .read_bytes(symtab.sh_offset, symtab.sh_size)
        .map_err(|_| truncated)?;

    let linked = sections
        .get(symtab.sh_link as usize)
        .ok_or(ElfError::InvalidStringTableIndex {
            index: symtab.sh_link,
            count: u32::try_from(sections.len()).unwrap_or(u32::MAX),
        })?;
    let strtab = StringTable::new(d.reader, linked)?;

    let entsize = match symtab.sh_entsize {
        0 => d.class.sym_size(),
        n if n < d.class.sym_size() => return Err(truncated),
        n => n,
    };
    let count = symtab.sh_size / entsize;

    (0..count)
        .map(|i| {
            let off = symtab.sh_offset + i * entsize;
            let (st_name, st_value, st_size, st_info, st_other, st_shndx) = match d.class {
                Class::Elf32 => (
                    d.u32(off)?,
                    d.word(off + 4)?,
                    d.word(off + 8)?,
                    d.u8(off + 12)?,
                    d.u8(off + 13)?,
                    d.u16(off + 14)?,
                ),
                Class::Elf64 => (
                    d.u32(off)?,
                    d.word(off + 8)?,
                    d.word(off + 16)?,
                    d.u8(off + 4)?,
                    d.u8(off + 5)?,
                    d.u16(off + 6)?,
                ),
            };
            Ok(Symbol {
                name: strtab.get(st_name)?,
                st_value,
                st_size,
                st_info,
                st_other,
                st_shndx,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ElfFile;
    use crate::builder::{ElfBuilder, SectionSpec, SymbolSpec};
    use crate::reader::{Endian, Reader};

    fn with_symbols(class: Class, endian: Endian) -> Vec<u8> {
        ElfBuilder::new(class, endian)
            .section(SectionSpec::progbits(".text", &[0x90; 32]).executable())
            .section(SectionSpec::progbits(".data", b"I am Static Data").writable())
            .symbol(SymbolSpec::new("main", STT_FUNC, STB_GLOBAL, ".text", 0, 0x20))
            .symbol(SymbolSpec::new("static_data", STT_OBJECT, STB_LOCAL, ".data", 0, 16))
            .build()
    }

    #[test]
    fn symbols_resolve_names_and_values() {
        let buf = with_symbols(Class::Elf64, Endian::Little);
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let symtab = elf.section_by_name(".symtab").unwrap();
        let syms = elf.symbols(symtab).unwrap();

        assert_eq!(syms.len(), 3);
        assert_eq!(syms[0].name, "");
        // Locals precede globals.
        assert_eq!(syms[1].name, "static_data");
        assert_eq!(type_name(syms[1].sym_type()), "OBJECT");
        assert_eq!(syms[2].name, "main");
        assert_eq!(syms[2].sym_type(), STT_FUNC);
        assert_eq!(syms[2].sym_bind(), STB_GLOBAL);
        assert_eq!(syms[2].st_size, 0x20);
        let text = elf.section_by_name(".text").unwrap();
        assert_eq!(syms[2].st_value, text.sh_addr);
        assert_eq!(u32::from(syms[2].st_shndx), text.index);
        assert_eq!(symtab.sh_info, 2);
    }

    #[test]
    fn symbols_elf32_big_endian() {
        let buf = with_symbols(Class::Elf32, Endian::Big);
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let symtab = elf.section_by_name(".symtab").unwrap();
        let syms = elf.symbols(symtab).unwrap();
        assert_eq!(syms.len(), 3);
        assert_eq!(syms[1].name, "static_data");
        assert_eq!(syms[1].st_size, 16);
        assert_eq!(bind_name(syms[1].sym_bind()), "LOCAL");
    }

    #[test]
    fn non_symbol_section_yields_nothing() {
        let buf = with_symbols(Class::Elf64, Endian::Little);
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let text = elf.section_by_name(".text").unwrap();
        assert!(elf.symbols(text).unwrap().is_empty());
    }

    #[test]
    fn bad_link_index() {
        let buf = with_symbols(Class::Elf64, Endian::Little);
        let elf = ElfFile::parse(Reader::from_bytes(&buf)).expect("valid ELF");
        let mut symtab = elf.section_by_name(".symtab").unwrap().clone();
        symtab.sh_link = 99;
        assert!(matches!(
            elf.symbols(&symtab),
            Err(ElfError::InvalidStringTableIndex { index: 99, .. })
        ));
    }
}
