//! ELF32/ELF64 parser and layout reporter.
//!
//! Decodes the file header, program header table, section header table and
//! symbol tables of ELF images of either class and byte order, with every
//! read bounds-checked against the file. [`LayoutReport`] reconstructs how
//! those structures tile the file and flags gaps, overlaps and inconsistent
//! segments.
//!
//! # Usage
//!
//! ```
//! use elfsight_elf::builder::{ElfBuilder, SectionSpec};
//! use elfsight_elf::{Class, ElfFile, Endian, LayoutReport, Reader};
//!
//! let image = ElfBuilder::new(Class::Elf64, Endian::Little)
//!     .section(SectionSpec::progbits(".text", &[0x90; 16]).executable())
//!     .build();
//! let elf = ElfFile::parse(Reader::from_bytes(&image)).expect("valid ELF");
//! assert!(elf.section_by_name(".text").is_some());
//!
//! let report = LayoutReport::build(&elf);
//! assert!(report.is_clean());
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod builder;
pub mod error;
pub mod file;
pub mod header;
pub mod layout;
pub mod reader;
pub mod section;
pub mod segment;
pub mod symbol;

pub use error::{ElfError, Table};
pub use file::ElfFile;
pub use header::{Class, ElfHeader, ElfIdentity, ElfType, machine_name};
pub use layout::{
    ByteRange, LayoutAnomaly, LayoutReport, MappedSection, RangeKind, SegmentMapping,
};
pub use reader::{Endian, Reader};
pub use section::{SectionFlags, SectionHeader, SectionType, StringTable};
pub use segment::{ProgramHeader, SegmentFlags, SegmentType};
pub use symbol::Symbol;
