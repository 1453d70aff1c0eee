//! Parse errors.

use core::fmt;

/// A table whose declared extent was checked against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// The program header table.
    ProgramHeaders,
    /// The section header table.
    SectionHeaders,
    /// The data of the section with the given index.
    SectionData(u32),
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramHeaders => write!(f, "program header table"),
            Self::SectionHeaders => write!(f, "section header table"),
            Self::SectionData(index) => write!(f, "data of section {index}"),
        }
    }
}

/// Errors that can occur when reading or parsing an ELF file.
///
/// Every variant except the I/O ones describes malformed input; all of them
/// abort the parse, so no partial result is ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// The file does not exist.
    NotFound,
    /// The file exists but cannot be read by this process.
    PermissionDenied,
    /// Any other I/O failure while reading the file.
    #[cfg(feature = "std")]
    Io(std::io::ErrorKind),
    /// A read of `len` bytes at `offset` falls outside an image of `size` bytes.
    OutOfRange {
        /// Start of the attempted read.
        offset: u64,
        /// Length of the attempted read.
        len: u64,
        /// Size of the image.
        size: u64,
    },
    /// The file does not start with `\x7fELF`.
    InvalidMagic,
    /// `EI_CLASS` is neither `ELFCLASS32` nor `ELFCLASS64`.
    UnsupportedClass(u8),
    /// `EI_DATA` is neither `ELFDATA2LSB` nor `ELFDATA2MSB`.
    UnsupportedEncoding(u8),
    /// The file is shorter than the file header of its class.
    TruncatedHeader {
        /// Bytes required by the header.
        needed: u64,
        /// Bytes available in the file.
        available: u64,
    },
    /// A table's declared extent runs past the end of the file.
    TruncatedTable(Table),
    /// The section-name string table index is not a valid section index.
    InvalidStringTableIndex {
        /// The designated index.
        index: u32,
        /// Number of sections in the file.
        count: u32,
    },
    /// No NUL terminator was found inside the string table for the string
    /// starting at `offset`.
    UnterminatedString {
        /// Offset of the string within its table.
        offset: u64,
    },
}

impl ElfError {
    /// Returns a stable identifier for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::PermissionDenied => "PermissionDenied",
            #[cfg(feature = "std")]
            Self::Io(_) => "Io",
            Self::OutOfRange { .. } => "OutOfRange",
            Self::InvalidMagic => "InvalidMagic",
            Self::UnsupportedClass(_) => "UnsupportedClass",
            Self::UnsupportedEncoding(_) => "UnsupportedEncoding",
            Self::TruncatedHeader { .. } => "TruncatedHeader",
            Self::TruncatedTable(_) => "TruncatedTable",
            Self::InvalidStringTableIndex { .. } => "InvalidStringTableIndex",
            Self::UnterminatedString { .. } => "UnterminatedString",
        }
    }

    /// Returns `true` if the error describes malformed input rather than a
    /// failure to access the file.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::NotFound | Self::PermissionDenied => false,
            #[cfg(feature = "std")]
            Self::Io(_) => false,
            _ => true,
        }
    }

    /// Classifies an I/O error from opening or reading a file.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            kind => Self::Io(kind),
        }
    }
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            #[cfg(feature = "std")]
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::OutOfRange { offset, len, size } => write!(
                f,
                "read of {len} bytes at offset {offset:#x} exceeds file size {size}"
            ),
            Self::InvalidMagic => write!(f, "invalid ELF magic bytes"),
            Self::UnsupportedClass(class) => write!(f, "unsupported ELF class {class}"),
            Self::UnsupportedEncoding(data) => write!(f, "unsupported data encoding {data}"),
            Self::TruncatedHeader { needed, available } => write!(
                f,
                "file header needs {needed} bytes but the file has {available}"
            ),
            Self::TruncatedTable(table) => write!(f, "{table} extends past end of file"),
            Self::InvalidStringTableIndex { index, count } => write!(
                f,
                "section name string table index {index} out of range ({count} sections)"
            ),
            Self::UnterminatedString { offset } => {
                write!(f, "string at offset {offset:#x} is not NUL-terminated")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ElfError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_classification() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(ElfError::from_io(&missing), ElfError::NotFound);
        assert_eq!(ElfError::from_io(&denied), ElfError::PermissionDenied);
        assert!(!ElfError::NotFound.is_malformed());
        assert!(ElfError::InvalidMagic.is_malformed());
        assert!(ElfError::TruncatedTable(Table::ProgramHeaders).is_malformed());
    }

    #[test]
    fn display_errors() {
        let errors = [
            ElfError::NotFound,
            ElfError::PermissionDenied,
            ElfError::OutOfRange {
                offset: 1,
                len: 2,
                size: 0,
            },
            ElfError::InvalidMagic,
            ElfError::UnsupportedClass(3),
            ElfError::UnsupportedEncoding(0),
            ElfError::TruncatedHeader {
                needed: 64,
                available: 10,
            },
            ElfError::TruncatedTable(Table::SectionData(4)),
            ElfError::InvalidStringTableIndex { index: 9, count: 3 },
            ElfError::UnterminatedString { offset: 7 },
        ];
        for err in &errors {
            let msg = format!("{err}");
            assert!(!msg.is_empty());
            assert!(!err.kind().is_empty());
        }
    }
}
