//! Protection flags and address regions.

use core::fmt;

bitflags::bitflags! {
    /// Page access permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        /// Pages may be read.
        const READ  = 1 << 0;
        /// Pages may be written.
        const WRITE = 1 << 1;
        /// Pages may be executed.
        const EXEC  = 1 << 2;
    }
}

impl Protection {
    /// Read-only.
    pub const R: Self = Self::READ;
    /// Read and execute.
    pub const RX: Self = Self::READ.union(Self::EXEC);
    /// Read and write.
    pub const RW: Self = Self::READ.union(Self::WRITE);

    /// Parses the permission column of `/proc/<pid>/maps` (`r-xp`); the
    /// trailing sharing flag is ignored.
    #[must_use]
    pub fn from_perms(perms: &str) -> Option<Self> {
        let bytes = perms.as_bytes();
        if bytes.len() < 3 {
            return None;
        }
        let mut flags = Self::empty();
        for (byte, (set, flag)) in bytes.iter().zip([
            (b'r', Self::READ),
            (b'w', Self::WRITE),
            (b'x', Self::EXEC),
        ]) {
            match *byte {
                b'-' => {}
                b if b == set => flags |= flag,
                _ => return None,
            }
        }
        Some(flags)
    }

    /// Parses `r`, `rw`, `rx`, `rwx` or `none` (case-insensitive).
    #[must_use]
    pub fn from_letters(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("none") {
            return Some(Self::empty());
        }
        let mut flags = Self::empty();
        for ch in text.chars() {
            let flag = match ch.to_ascii_lowercase() {
                'r' => Self::READ,
                'w' => Self::WRITE,
                'x' => Self::EXEC,
                _ => return None,
            };
            flags |= flag;
        }
        (!flags.is_empty()).then_some(flags)
    }

    /// The `PROT_*` bits for `mprotect(2)`.
    #[cfg(unix)]
    #[must_use]
    pub fn to_prot(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.contains(Self::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(Self::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        if self.contains(Self::EXEC) {
            prot |= libc::PROT_EXEC;
        }
        prot
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'r' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'w' } else { '-' };
        let x = if self.contains(Self::EXEC) { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// A range of the process's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// First address.
    pub start: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Region {
    /// Creates a region.
    #[must_use]
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// The region occupied by `len` bytes starting at `ptr`.
    ///
    /// The pointer's provenance is exposed so the region can be read back
    /// through its address.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T, len: usize) -> Self {
        Self {
            start: ptr.expose_provenance(),
            len,
        }
    }

    /// One past the last address (saturating).
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    /// Returns `true` if both the start and the length are multiples of
    /// `page_size`.
    #[must_use]
    pub const fn is_page_aligned(&self, page_size: usize) -> bool {
        page_size != 0 && self.start % page_size == 0 && self.len % page_size == 0
    }

    /// The largest page-aligned region inside `self`, if it holds at least
    /// one whole page.
    #[must_use]
    pub fn whole_pages(&self, page_size: usize) -> Option<Self> {
        if page_size == 0 {
            return None;
        }
        let start = self.start.checked_next_multiple_of(page_size)?;
        let end = self.end() - self.end() % page_size;
        (end > start).then(|| Self::new(start, end - start))
    }

    /// Returns `true` if `addr` lies in the region.
    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end())
    }
}

/// Outcome of a successful [`Guard::protect`](crate::Guard::protect) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectStatus {
    /// The platform call changed the protection.
    Applied,
    /// The platform cannot protect this region.
    Unsupported,
    /// The platform refused the change.
    PermissionDenied,
    /// The region already carried the requested flags; nothing was called.
    AlreadySatisfied,
}

impl fmt::Display for ProtectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Applied => "applied",
            Self::Unsupported => "unsupported",
            Self::PermissionDenied => "permission-denied",
            Self::AlreadySatisfied => "already-satisfied",
        })
    }
}

/// Result record of one protect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionRegion {
    /// The protected range.
    pub region: Region,
    /// Flags the caller asked for.
    pub requested: Protection,
    /// Flags observed after the call.
    pub actual: Protection,
    /// What the call did.
    pub status: ProtectStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perms_column() {
        assert_eq!(Protection::from_perms("r-xp"), Some(Protection::RX));
        assert_eq!(Protection::from_perms("rw-s"), Some(Protection::RW));
        assert_eq!(Protection::from_perms("---p"), Some(Protection::empty()));
        assert_eq!(Protection::from_perms("rz-p"), None);
        assert_eq!(Protection::from_perms("r"), None);
    }

    #[test]
    fn letters() {
        assert_eq!(Protection::from_letters("r"), Some(Protection::R));
        assert_eq!(Protection::from_letters("RX"), Some(Protection::RX));
        assert_eq!(Protection::from_letters("none"), Some(Protection::empty()));
        assert_eq!(Protection::from_letters(""), None);
        assert_eq!(Protection::from_letters("rq"), None);
    }

    #[test]
    fn display() {
        assert_eq!(Protection::RX.to_string(), "r-x");
        assert_eq!(Protection::all().to_string(), "rwx");
        assert_eq!(Region::new(0x1000, 0x2000).to_string(), "0x1000..0x3000");
        assert_eq!(ProtectStatus::AlreadySatisfied.to_string(), "already-satisfied");
    }

    #[cfg(unix)]
    #[test]
    fn prot_bits() {
        assert_eq!(Protection::empty().to_prot(), libc::PROT_NONE);
        assert_eq!(
            Protection::RW.to_prot(),
            libc::PROT_READ | libc::PROT_WRITE
        );
    }

    #[test]
    fn page_alignment() {
        assert!(Region::new(0x4000, 0x1000).is_page_aligned(0x1000));
        assert!(!Region::new(0x4001, 0x1000).is_page_aligned(0x1000));
        assert!(!Region::new(0x4000, 0x10).is_page_aligned(0x1000));
        assert!(!Region::new(0x4000, 0x1000).is_page_aligned(0));
    }

    #[test]
    fn whole_pages() {
        let region = Region::new(0x1010, 0x3000);
        assert_eq!(region.whole_pages(0x1000), Some(Region::new(0x2000, 0x2000)));
        assert_eq!(Region::new(0x1010, 0x100).whole_pages(0x1000), None);
        assert!(region.contains(0x1010));
        assert!(!region.contains(0x4010));
    }
}
