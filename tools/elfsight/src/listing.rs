//! readelf-style listings and section extraction.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use elfsight_elf::symbol::{bind_name, type_name};
use elfsight_elf::{ElfFile, Symbol};

use crate::verbose::dprintln;

/// Prints the section header table.
pub fn write_sections(elf: &ElfFile<'_>, out: &mut impl Write) -> io::Result<()> {
    let width = elf
        .sections()
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    writeln!(
        out,
        "  {:>4}  {:<width$}  {:<12}  {:>18}  {:>10}  {:>10}  {:<5}  {:>4}  {:>4}  {:>5}",
        "Nr", "Name", "Type", "Address", "Offset", "Size", "Flags", "Link", "Info", "Align"
    )?;
    writeln!(
        out,
        "  {:->4}  {:-<width$}  {:-<12}  {:->18}  {:->10}  {:->10}  {:-<5}  {:->4}  {:->4}  {:->5}",
        "", "", "", "", "", "", "", "", "", ""
    )?;
    for section in elf.sections() {
        writeln!(
            out,
            "  {:>4}  {:<width$}  {:<12}  {:>18}  {:>10}  {:>10}  {:<5}  {:>4}  {:>4}  {:>5}",
            format!("[{}]", section.index),
            section.name,
            section.sh_type.to_string(),
            format!("{:#x}", section.sh_addr),
            format!("{:#x}", section.sh_offset),
            section.sh_size,
            section.sh_flags.to_string(),
            section.sh_link,
            section.sh_info,
            section.sh_addralign,
        )?;
    }
    Ok(())
}

/// Prints the program header table.
pub fn write_segments(elf: &ElfFile<'_>, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "  {:<12}  {:>10}  {:>18}  {:>18}  {:>10}  {:>10}  {:<3}  {:>8}",
        "Type", "Offset", "VirtAddr", "PhysAddr", "FileSiz", "MemSiz", "Flg", "Align"
    )?;
    writeln!(
        out,
        "  {:-<12}  {:->10}  {:->18}  {:->18}  {:->10}  {:->10}  {:-<3}  {:->8}",
        "", "", "", "", "", "", "", ""
    )?;
    for phdr in elf.program_headers() {
        writeln!(
            out,
            "  {:<12}  {:>10}  {:>18}  {:>18}  {:>10}  {:>10}  {:<3}  {:>8}",
            phdr.p_type.to_string(),
            format!("{:#x}", phdr.p_offset),
            format!("{:#x}", phdr.p_vaddr),
            format!("{:#x}", phdr.p_paddr),
            phdr.p_filesz,
            phdr.p_memsz,
            phdr.p_flags.to_string(),
            format!("{:#x}", phdr.p_align),
        )?;
    }
    Ok(())
}

/// Prints every symbol table.
pub fn write_symbols(elf: &ElfFile<'_>, out: &mut impl Write) -> Result<()> {
    let mut any = false;
    for table in elf.symbol_tables() {
        any = true;
        let symbols = elf
            .symbols(table)
            .with_context(|| format!("reading symbol table {}", table.name))?;
        writeln!(out, "Symbol table '{}' contains {} entries:", table.name, symbols.len())?;
        writeln!(
            out,
            "  {:>5}  {:>18} {:>6} {:<7} {:<6} Name",
            "Num", "Value", "Size", "Type", "Bind"
        )?;
        for (num, symbol) in symbols.iter().enumerate() {
            writeln!(
                out,
                "  {num:>5}: {:#018x} {:>6} {:<7} {:<6} {}",
                symbol.st_value,
                symbol.st_size,
                type_name(symbol.sym_type()),
                bind_name(symbol.sym_bind()),
                display_name(symbol)
            )?;
        }
        writeln!(out)?;
    }
    if !any {
        dprintln!("no symbol tables");
    }
    Ok(())
}

/// Demangled Rust symbol name, or the raw name for anything else.
fn display_name(symbol: &Symbol) -> String {
    format!("{:#}", rustc_demangle::demangle(&symbol.name))
}

/// Writes the file bytes of section `name` to `output` and returns how many
/// were written. A `NOBITS` section produces an empty file.
pub fn extract(elf: &ElfFile<'_>, name: &str, output: &Path) -> Result<usize> {
    let section = elf
        .section_by_name(name)
        .with_context(|| format!("no section named {name}"))?;
    if section.is_nobits() {
        dprintln!(
            "{name} is NOBITS: {} bytes exist only in memory, writing an empty file",
            section.sh_size
        );
    }
    let data = elf
        .section_data(section)
        .with_context(|| format!("reading section {name}"))?;
    std::fs::write(output, data).with_context(|| format!("writing {}", output.display()))?;
    Ok(data.len())
}
