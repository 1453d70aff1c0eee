//! Platform access behind the guard.
//!
//! [`ProtectionBackend`] is the seam between [`Guard`](crate::Guard) and the
//! operating system: it reports the page size, describes how a range is
//! currently mapped and changes protection. [`SystemBackend`] talks to the
//! host kernel; [`MemoryBackend`] simulates an address space for tests.

use std::collections::BTreeMap;

use crate::error::GuardError;
use crate::maps::MappedSpan;
use crate::protection::{Protection, Region};

/// Page protection primitives of one platform.
pub trait ProtectionBackend {
    /// Protection granularity in bytes.
    fn page_size(&self) -> usize;

    /// Returns the mappings overlapping `region` in address order.
    ///
    /// # Errors
    ///
    /// Any failure to inspect the address space.
    fn query(&self, region: Region) -> Result<Vec<MappedSpan>, GuardError>;

    /// Sets the protection of `region` to exactly `flags`.
    ///
    /// # Errors
    ///
    /// [`GuardError::PermissionDenied`], [`GuardError::UnsupportedRegion`] or
    /// [`GuardError::Fatal`] depending on the platform failure.
    ///
    /// # Safety
    ///
    /// Removing access from memory the program still uses (its stack, or
    /// data it writes later) makes those accesses fault.
    unsafe fn apply(&mut self, region: Region, flags: Protection) -> Result<(), GuardError>;
}

// ---------------------------------------------------------------------------
// SystemBackend
// ---------------------------------------------------------------------------

/// The host kernel: `mprotect(2)` and `/proc/self/maps` on Linux.
///
/// On other platforms every call fails with
/// [`GuardError::UnsupportedPlatform`].
#[derive(Debug, Clone, Copy)]
pub struct SystemBackend {
    page_size: usize,
}

impl SystemBackend {
    /// Queries the page size once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: system_page_size(),
        }
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn system_page_size() -> usize {
    // SAFETY: sysconf only reads a configuration value.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
}

#[cfg(not(unix))]
fn system_page_size() -> usize {
    4096
}

#[cfg(target_os = "linux")]
impl ProtectionBackend for SystemBackend {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn query(&self, region: Region) -> Result<Vec<MappedSpan>, GuardError> {
        let text = std::fs::read_to_string("/proc/self/maps").map_err(GuardError::Fatal)?;
        Ok(crate::maps::overlapping(&crate::maps::parse(&text), region))
    }

    unsafe fn apply(&mut self, region: Region, flags: Protection) -> Result<(), GuardError> {
        // SAFETY: the caller upholds the contract of `ProtectionBackend::apply`;
        // mprotect itself validates that the range is mapped.
        let rc = unsafe {
            libc::mprotect(
                region.start as *mut libc::c_void,
                region.len,
                flags.to_prot(),
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(crate::error::from_errno(std::io::Error::last_os_error()))
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl ProtectionBackend for SystemBackend {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn query(&self, _region: Region) -> Result<Vec<MappedSpan>, GuardError> {
        Err(GuardError::UnsupportedPlatform)
    }

    unsafe fn apply(&mut self, _region: Region, _flags: Protection) -> Result<(), GuardError> {
        Err(GuardError::UnsupportedPlatform)
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// A simulated address space with page-granular protection.
///
/// Nothing is ever dereferenced, so any address can be "mapped".
#[derive(Debug, Default)]
pub struct MemoryBackend {
    page_size: usize,
    pages: BTreeMap<usize, Protection>,
    fail_next: Option<GuardError>,
    apply_calls: usize,
}

impl MemoryBackend {
    /// An empty address space with the given page size.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Maps the pages of `region` with `flags`.
    #[must_use]
    pub fn with_mapping(mut self, region: Region, flags: Protection) -> Self {
        self.set(region, flags);
        self
    }

    /// Changes protection behind the guard's back, as another actor would.
    pub fn tamper(&mut self, region: Region, flags: Protection) {
        self.set(region, flags);
    }

    /// Makes the next [`apply`](ProtectionBackend::apply) fail with `err`.
    pub fn fail_next_apply(&mut self, err: GuardError) {
        self.fail_next = Some(err);
    }

    /// Number of `apply` calls that reached the backend.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.apply_calls
    }

    fn page_starts(&self, region: Region) -> impl Iterator<Item = usize> + use<> {
        let page = self.page_size.max(1);
        let first = region.start - region.start % page;
        (first..region.end()).step_by(page)
    }

    fn set(&mut self, region: Region, flags: Protection) {
        let pages: Vec<_> = self.page_starts(region).collect();
        for start in pages {
            self.pages.insert(start, flags);
        }
    }
}

impl ProtectionBackend for MemoryBackend {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn query(&self, region: Region) -> Result<Vec<MappedSpan>, GuardError> {
        let page = self.page_size.max(1);
        let mut spans: Vec<MappedSpan> = Vec::new();
        for start in self.page_starts(region) {
            let Some(&protection) = self.pages.get(&start) else {
                continue;
            };
            match spans.last_mut() {
                Some(last) if last.end == start && last.protection == protection => {
                    last.end += page;
                }
                _ => spans.push(MappedSpan {
                    start,
                    end: start + page,
                    protection,
                }),
            }
        }
        Ok(spans)
    }

    unsafe fn apply(&mut self, region: Region, flags: Protection) -> Result<(), GuardError> {
        self.apply_calls += 1;
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        if self.page_starts(region).any(|p| !self.pages.contains_key(&p)) {
            return Err(GuardError::UnsupportedRegion("range is not fully mapped"));
        }
        self.set(region, flags);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_coalesces_spans() {
        let backend = MemoryBackend::new(0x1000)
            .with_mapping(Region::new(0x1_0000, 0x3000), Protection::RW)
            .with_mapping(Region::new(0x1_3000, 0x1000), Protection::RX);
        let spans = backend.query(Region::new(0x1_0000, 0x4000)).unwrap();
        assert_eq!(
            spans,
            [
                MappedSpan {
                    start: 0x1_0000,
                    end: 0x1_3000,
                    protection: Protection::RW
                },
                MappedSpan {
                    start: 0x1_3000,
                    end: 0x1_4000,
                    protection: Protection::RX
                },
            ]
        );
    }

    #[test]
    fn memory_backend_rejects_unmapped_apply() {
        let mut backend =
            MemoryBackend::new(0x1000).with_mapping(Region::new(0x1_0000, 0x1000), Protection::RW);
        // SAFETY: the simulated address space is never dereferenced.
        let result = unsafe { backend.apply(Region::new(0x1_0000, 0x2000), Protection::R) };
        assert!(matches!(result, Err(GuardError::UnsupportedRegion(_))));
        assert_eq!(backend.apply_calls(), 1);
    }

    #[test]
    fn system_page_size_is_power_of_two() {
        assert!(SystemBackend::new().page_size().is_power_of_two());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn system_query_sees_own_stack() {
        let local = 0u64;
        let region = Region::from_ptr(&raw const local, 8);
        let spans = SystemBackend::new().query(region).unwrap();
        assert_eq!(spans.len(), 1);
        assert!(spans[0].protection.contains(Protection::RW));
    }
}
