//! Runtime integrity guard.
//!
//! Changes and checks the page protection of regions of the running
//! process so that later tampering becomes visible:
//!
//! - [`Guard`] tracks protected regions through the
//!   `Unprotected → Protected → Violated`/`Fatal` life cycle.
//! - [`ProcessImage`] finds a named section of the running executable in
//!   memory.
//! - [`Fingerprint`] hashes region contents to detect byte-level changes.
//! - [`probe::probe_write`] demonstrates, in a child process, that a write
//!   into a read-only page faults.
//!
//! How often to verify and what to do about a violation is left to the
//! embedding application.

pub mod backend;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod image;
pub mod maps;
#[cfg(target_os = "linux")]
pub mod probe;
pub mod protection;

pub use backend::{MemoryBackend, ProtectionBackend, SystemBackend};
pub use error::GuardError;
pub use fingerprint::Fingerprint;
pub use guard::{Guard, RegionState, Verification};
pub use image::ProcessImage;
pub use maps::MappedSpan;
pub use protection::{ProtectStatus, Protection, ProtectionRegion, Region};
