//! Guard error type.

use std::{fmt, io};

use elfsight_elf::ElfError;

use crate::protection::ProtectStatus;

/// Errors returned by guard operations.
#[derive(Debug)]
pub enum GuardError {
    /// The region's start or length is not a multiple of the page size.
    Alignment {
        /// Requested start address.
        start: usize,
        /// Requested length.
        len: usize,
        /// Platform page size.
        page_size: usize,
    },
    /// The region cannot be protected as a unit.
    UnsupportedRegion(&'static str),
    /// The platform refused the protection change (`EACCES`/`EPERM`).
    PermissionDenied,
    /// The platform call failed for any other reason.
    Fatal(io::Error),
    /// The running image has no section of that name.
    SectionNotFound(String),
    /// The running image could not be parsed.
    Image(ElfError),
    /// Page protection is not implemented for this platform.
    UnsupportedPlatform,
}

impl GuardError {
    /// Short machine-readable name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alignment { .. } => "AlignmentError",
            Self::UnsupportedRegion(_) => "UnsupportedRegion",
            Self::PermissionDenied => "PermissionDenied",
            Self::Fatal(_) => "Fatal",
            Self::SectionNotFound(_) => "SectionNotFound",
            Self::Image(_) => "Image",
            Self::UnsupportedPlatform => "UnsupportedPlatform",
        }
    }

    /// The protect status this error corresponds to, if any.
    #[must_use]
    pub fn status(&self) -> Option<ProtectStatus> {
        match self {
            Self::UnsupportedRegion(_) | Self::UnsupportedPlatform => {
                Some(ProtectStatus::Unsupported)
            }
            Self::PermissionDenied => Some(ProtectStatus::PermissionDenied),
            _ => None,
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alignment {
                start,
                len,
                page_size,
            } => write!(
                f,
                "region {start:#x}+{len:#x} is not aligned to the {page_size:#x}-byte page size"
            ),
            Self::UnsupportedRegion(reason) => write!(f, "unsupported region: {reason}"),
            Self::PermissionDenied => f.write_str("permission denied by the platform"),
            Self::Fatal(err) => write!(f, "protection change failed: {err}"),
            Self::SectionNotFound(name) => write!(f, "no allocated section named {name}"),
            Self::Image(err) => write!(f, "cannot read the running image: {err}"),
            Self::UnsupportedPlatform => {
                f.write_str("page protection is not supported on this platform")
            }
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fatal(err) => Some(err),
            Self::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ElfError> for GuardError {
    fn from(err: ElfError) -> Self {
        Self::Image(err)
    }
}

/// Classifies a failed `mprotect` errno.
#[cfg(target_os = "linux")]
pub(crate) fn from_errno(err: io::Error) -> GuardError {
    match err.raw_os_error() {
        Some(libc::EACCES | libc::EPERM) => GuardError::PermissionDenied,
        Some(libc::ENOMEM) => GuardError::UnsupportedRegion("range is not fully mapped"),
        _ => GuardError::Fatal(err),
    }
}
