//! Bounds-checked random access over a binary image.
//!
//! [`Reader`] owns (or borrows) the full byte image of a file and hands out
//! slices and fixed-width integers. Every access is checked against the
//! image size discovered at open time; nothing reads past the end.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ElfError;

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first (`ELFDATA2LSB`).
    Little,
    /// Most significant byte first (`ELFDATA2MSB`).
    Big,
}

impl Endian {
    /// Decodes an unsigned integer of `bytes.len()` bytes (at most 8).
    fn decode(self, bytes: &[u8]) -> u64 {
        match self {
            Self::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            Self::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        }
    }
}

/// A read-only binary image with bounds-checked accessors.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: Cow<'a, [u8]>,
}

impl<'a> Reader<'a> {
    /// Wraps an in-memory image without copying it.
    #[must_use]
    pub fn from_bytes(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
        }
    }

    /// Takes ownership of an in-memory image.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Reader<'static> {
        Reader {
            data: Cow::Owned(data),
        }
    }

    /// Total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns `true` if the image is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the whole image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::OutOfRange`] if `offset + len` exceeds the image
    /// size or overflows.
    pub fn read_bytes(&self, offset: u64, len: u64) -> Result<&[u8], ElfError> {
        let out_of_range = ElfError::OutOfRange {
            offset,
            len,
            size: self.len(),
        };
        let end = offset.checked_add(len).ok_or(out_of_range)?;
        if end > self.len() {
            return Err(out_of_range);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "end <= data.len(), which is a usize"
        )]
        Ok(&self.data[offset as usize..end as usize])
    }

    /// Reads an unsigned integer of `width` bytes (1, 2, 4 or 8).
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::OutOfRange`] if the field does not fit in the image.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or larger than 8.
    pub fn read_uint(&self, offset: u64, width: usize, endian: Endian) -> Result<u64, ElfError> {
        assert!(
            (1..=8).contains(&width),
            "integer width must be between 1 and 8 bytes"
        );
        let bytes = self.read_bytes(offset, width as u64)?;
        Ok(endian.decode(bytes))
    }

    /// Reads a single byte.
    pub fn read_u8(&self, offset: u64) -> Result<u8, ElfError> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    /// Reads a `u16` in the given byte order.
    #[expect(clippy::cast_possible_truncation, reason = "two-byte read")]
    pub fn read_u16(&self, offset: u64, endian: Endian) -> Result<u16, ElfError> {
        self.read_uint(offset, 2, endian).map(|v| v as u16)
    }

    /// Reads a `u32` in the given byte order.
    #[expect(clippy::cast_possible_truncation, reason = "four-byte read")]
    pub fn read_u32(&self, offset: u64, endian: Endian) -> Result<u32, ElfError> {
        self.read_uint(offset, 4, endian).map(|v| v as u32)
    }

    /// Reads a `u64` in the given byte order.
    pub fn read_u64(&self, offset: u64, endian: Endian) -> Result<u64, ElfError> {
        self.read_uint(offset, 8, endian)
    }

    /// Reads a NUL-terminated string at `base + offset`, where the string
    /// must end before `base + limit`.
    ///
    /// Invalid UTF-8 is replaced lossily.
    ///
    /// # Errors
    ///
    /// - [`ElfError::OutOfRange`] if `[base, base + limit)` is not inside the image.
    /// - [`ElfError::UnterminatedString`] if no NUL byte follows `offset`
    ///   within the limit (including an offset at or past the limit).
    pub fn read_cstr(&self, base: u64, limit: u64, offset: u64) -> Result<String, ElfError> {
        let table = self.read_bytes(base, limit)?;
        let unterminated = ElfError::UnterminatedString { offset };
        if offset >= limit {
            return Err(unterminated);
        }
        #[expect(clippy::cast_possible_truncation, reason = "offset < table.len()")]
        let rest = &table[offset as usize..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(unterminated)?;
        Ok(String::from_utf8_lossy(&rest[..nul]).into_owned())
    }
}

#[cfg(feature = "std")]
impl Reader<'static> {
    /// Reads the file at `path` into memory.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::NotFound`], [`ElfError::PermissionDenied`] or
    /// [`ElfError::Io`] for other I/O failures.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ElfError> {
        let data = std::fs::read(path).map_err(|e| ElfError::from_io(&e))?;
        Ok(Self::from_vec(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_uint_little_and_big() {
        let r = Reader::from_bytes(&IMAGE);
        assert_eq!(r.read_u16(0, Endian::Little).unwrap(), 0x0201);
        assert_eq!(r.read_u16(0, Endian::Big).unwrap(), 0x0102);
        assert_eq!(r.read_u32(4, Endian::Little).unwrap(), 0x0807_0605);
        assert_eq!(r.read_u64(0, Endian::Big).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_uint(1, 3, Endian::Big).unwrap(), 0x02_0304);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let r = Reader::from_bytes(&IMAGE);
        assert_eq!(
            r.read_bytes(6, 4),
            Err(ElfError::OutOfRange {
                offset: 6,
                len: 4,
                size: 8
            })
        );
        assert!(r.read_u64(1, Endian::Little).is_err());
        assert!(r.read_bytes(8, 0).is_ok());
    }

    #[test]
    fn read_with_overflowing_offset() {
        let r = Reader::from_bytes(&IMAGE);
        assert!(matches!(
            r.read_bytes(u64::MAX, 2),
            Err(ElfError::OutOfRange { .. })
        ));
    }

    #[test]
    fn cstr_lookup() {
        let r = Reader::from_bytes(b"xx\0.text\0.data\0");
        assert_eq!(r.read_cstr(2, 13, 1).unwrap(), ".text");
        assert_eq!(r.read_cstr(2, 13, 7).unwrap(), ".data");
        assert_eq!(r.read_cstr(2, 13, 0).unwrap(), "");
    }

    #[test]
    fn cstr_without_terminator() {
        let r = Reader::from_bytes(b"\0abc");
        assert_eq!(
            r.read_cstr(0, 4, 1),
            Err(ElfError::UnterminatedString { offset: 1 })
        );
        assert_eq!(
            r.read_cstr(0, 4, 9),
            Err(ElfError::UnterminatedString { offset: 9 })
        );
    }

    #[test]
    fn owned_reader() {
        let r = Reader::from_vec(IMAGE.to_vec());
        assert_eq!(r.len(), 8);
        assert!(!r.is_empty());
        assert_eq!(r.read_u8(7).unwrap(), 0x08);
    }
}
