//! `guard-self-test`: protect a section of this very executable and check
//! that the protection holds.

use anyhow::{Context, Result, bail};
use elfsight_guard::{
    Fingerprint, Guard, GuardError, ProcessImage, ProtectStatus, ProtectionBackend, Protection, Region,
    RegionState, Verification,
};

use crate::config::DEFAULT_GUARD_SECTION;
use crate::verbose::{dprintln, vprintln};

/// Size of the guarded static; a multiple of every common page size.
const GUARDED_SIZE: usize = 16 * 1024;

/// Page-aligned payload placed in its own section.
#[repr(C, align(16384))]
struct GuardedPage([u8; GUARDED_SIZE]);

/// Data the self-test protects. Only ever accessed through raw pointers.
#[used]
#[unsafe(link_section = ".elfsight.guarded")]
static mut GUARDED: GuardedPage = GuardedPage([0xa5; GUARDED_SIZE]);

/// Options of one self-test run.
#[derive(Debug, Clone)]
pub struct SelfTest<'a> {
    /// Section to protect.
    pub section: &'a str,
    /// Protection letters.
    pub flags: &'a str,
    /// Reopen the region for writing and change a byte before verifying.
    pub simulate_tamper: bool,
    /// Demonstrate in a child process that a write faults.
    pub probe_write: bool,
}

/// How the self-test ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Protection applied and verified.
    Verified,
    /// The final verification found different protection.
    Violated,
}

/// Runs the self-test against the running executable.
pub fn run(test: &SelfTest<'_>) -> Result<Outcome> {
    let flags = Protection::from_letters(test.flags)
        .with_context(|| format!("invalid protection {:?}", test.flags))?;

    let image = ProcessImage::current().context("locating the running executable")?;
    vprintln!("load bias: {:#x}", image.load_bias());
    let section = image
        .section_region(test.section)
        .with_context(|| format!("resolving section {}", test.section))?;

    if test.section == DEFAULT_GUARD_SECTION {
        let marker = (&raw const GUARDED).expose_provenance();
        if !section.contains(marker) {
            bail!(
                "{} resolved to {section}, which does not hold the guarded static at {marker:#x}",
                test.section
            );
        }
    }
    dprintln!("{}: {section} ({} bytes)", test.section, section.len);

    let mut guard = Guard::new();
    vprintln!("page size: {:#x}", guard.page_size());
    let region = protectable(section, guard.page_size())?;
    if region != section {
        dprintln!("{}: protecting whole pages {region}", test.section);
    }
    let original = guard
        .current_protection(region)
        .context("reading the current protection")?;
    vprintln!("current protection: {original}");
    if !original.contains(Protection::READ) {
        bail!("{region} is not readable ({original})");
    }
    // SAFETY: the region is mapped and readable and not written concurrently.
    let before = unsafe { Fingerprint::of(region) };
    vprintln!("fingerprint: {before}");

    // SAFETY: the region is a section of this executable that nothing reads,
    // writes or executes while the test runs except through this module.
    let applied = unsafe { guard.protect(region, flags) }
        .inspect_err(|err| {
            if let Some(status) = err.status() {
                dprintln!("protect {region}: {status}");
            }
        })
        .with_context(|| format!("protecting {region} as {flags}"))?;
    dprintln!(
        "protect {}: {} (requested {}, now {})",
        region,
        applied.status,
        applied.requested,
        applied.actual
    );

    let outcome = check(&mut guard, region, flags, before, test);

    // SAFETY: restores the flags the section had before the test.
    let released = unsafe { guard.release(region) };
    let outcome = outcome?;
    released.with_context(|| format!("restoring {region} to {original}"))?;
    vprintln!("restored {region} to {original}");
    Ok(outcome)
}

/// The part of `section` that page protection can cover: the section itself
/// when it is page aligned, otherwise the whole pages inside it.
fn protectable(section: Region, page_size: usize) -> Result<Region, GuardError> {
    if section.is_page_aligned(page_size) {
        return Ok(section);
    }
    section.whole_pages(page_size).ok_or(GuardError::Alignment {
        start: section.start,
        len: section.len,
        page_size,
    })
}

fn check(
    guard: &mut Guard,
    region: Region,
    flags: Protection,
    before: Fingerprint,
    test: &SelfTest<'_>,
) -> Result<Outcome> {
    match guard.verify(region, flags)? {
        Verification::Match => dprintln!("verify: protection matches {flags}"),
        Verification::Mismatch(actual) => bail!("protection did not take effect: found {actual}"),
    }

    // SAFETY: same region and flags as the first call.
    let again = unsafe { guard.protect(region, flags) }?;
    if again.status != ProtectStatus::AlreadySatisfied {
        bail!("second protect reported {} instead of already-satisfied", again.status);
    }
    dprintln!("protect again: {}", again.status);

    if test.probe_write {
        probe(region, flags)?;
    }

    if test.simulate_tamper {
        dprintln!("tampering: reopening {region} for writing");
        // SAFETY: widening access cannot fault any existing user.
        unsafe { guard.backend_mut().apply(region, Protection::RW) }?;
        let first = std::ptr::with_exposed_provenance_mut::<u8>(region.start);
        // SAFETY: the region is mapped read-write and owned by this test.
        unsafe { first.write_volatile(first.read_volatile() ^ 0xff) };
    }

    for (tracked, result) in guard.verify_all() {
        match result? {
            Verification::Match => vprintln!("{tracked}: intact"),
            Verification::Mismatch(actual) => {
                dprintln!("{tracked}: protection is {actual}, expected {flags}");
            }
        }
    }

    let mut changed = false;
    if guard.current_protection(region)?.contains(Protection::READ) {
        // SAFETY: the region is mapped and readable and not written concurrently.
        let after = unsafe { Fingerprint::of(region) };
        changed = !after.matches(&before);
        if changed {
            dprintln!("{region}: contents changed ({before} -> {after})");
        }
    }

    Ok(if changed || guard.state(region) == RegionState::Violated {
        Outcome::Violated
    } else {
        Outcome::Verified
    })
}

#[cfg(target_os = "linux")]
fn probe(region: Region, flags: Protection) -> Result<()> {
    let target = std::ptr::with_exposed_provenance_mut::<u8>(region.start);
    // SAFETY: the region is mapped and readable; only the child writes.
    let probe = unsafe { elfsight_guard::probe::probe_write(target) }
        .context("running the write probe")?;
    dprintln!("probe: {probe}");
    if !flags.contains(Protection::WRITE) && !probe.is_blocked() {
        bail!("a write into {region} was not blocked ({probe})");
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn probe(_region: Region, _flags: Protection) -> Result<()> {
    bail!(elfsight_guard::GuardError::UnsupportedPlatform)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 0x1000;

    #[test]
    fn aligned_section_is_protected_as_is() {
        let section = Region::new(0x40_0000, 2 * PAGE);
        assert_eq!(protectable(section, PAGE).unwrap(), section);
    }

    #[test]
    fn unaligned_section_shrinks_to_whole_pages() {
        // A text section sharing its first and last page with other code.
        let section = Region::new(0x40_1040, 0x3f80);
        assert_eq!(
            protectable(section, PAGE).unwrap(),
            Region::new(0x40_2000, 2 * PAGE)
        );
    }

    #[test]
    fn section_inside_one_page_cannot_be_protected() {
        let err = protectable(Region::new(0x40_1040, 0x100), PAGE).unwrap_err();
        assert!(matches!(err, GuardError::Alignment { page_size: PAGE, .. }));
    }

    #[test]
    fn unsupported_protect_reports_its_status() {
        let err = GuardError::UnsupportedRegion("spans two mappings");
        assert_eq!(err.status(), Some(ProtectStatus::Unsupported));
        assert_eq!(GuardError::PermissionDenied.status(), Some(ProtectStatus::PermissionDenied));
    }
}
