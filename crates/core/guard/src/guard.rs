//! Region tracking and the protect/verify state machine.

use std::fmt;

use crate::backend::{ProtectionBackend, SystemBackend};
use crate::error::GuardError;
use crate::protection::{ProtectStatus, Protection, ProtectionRegion, Region};

/// Lifecycle of a region the guard has touched.
///
/// `Unprotected → Protected` on a successful protect, `Protected → Violated`
/// when a verify observes different flags, `Violated → Protected` when
/// protection is re-applied, and `Fatal` when the platform call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Not tracked by this guard.
    Unprotected,
    /// The applied flags are in effect.
    Protected,
    /// The flags were changed by someone else.
    Violated,
    /// A protect call failed.
    Fatal,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unprotected => "unprotected",
            Self::Protected => "protected",
            Self::Violated => "violated",
            Self::Fatal => "fatal",
        })
    }
}

/// Outcome of a verify call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The region carries the expected flags.
    Match,
    /// The region carries these flags instead.
    Mismatch(Protection),
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    region: Region,
    original: Protection,
    applied: Protection,
    state: RegionState,
}

/// Applies and checks page protection on regions of the running process.
///
/// The guard does no locking. Its methods take `&mut self`, so concurrent
/// use from several threads needs an external `Mutex`; that also serializes
/// protect and verify calls on overlapping regions.
#[derive(Debug)]
pub struct Guard<B: ProtectionBackend = SystemBackend> {
    backend: B,
    tracked: Vec<Tracked>,
}

impl Guard<SystemBackend> {
    /// A guard over the host platform.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(SystemBackend::new())
    }
}

impl Default for Guard<SystemBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ProtectionBackend> Guard<B> {
    /// A guard over an explicit backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            tracked: Vec::new(),
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Platform page size.
    pub fn page_size(&self) -> usize {
        self.backend.page_size()
    }

    /// Current protection of `region`, which must be fully mapped with
    /// uniform flags.
    ///
    /// # Errors
    ///
    /// [`GuardError::UnsupportedRegion`] for holes or mixed protection, or
    /// any backend query failure.
    pub fn current_protection(&self, region: Region) -> Result<Protection, GuardError> {
        if region.len == 0 {
            return Err(GuardError::UnsupportedRegion("empty region"));
        }
        let spans = self.backend.query(region)?;
        let Some(first) = spans.first() else {
            return Err(GuardError::UnsupportedRegion("range is not mapped"));
        };
        let mut cursor = region.start;
        for span in &spans {
            if span.start > cursor {
                return Err(GuardError::UnsupportedRegion("range is not fully mapped"));
            }
            if span.protection != first.protection {
                return Err(GuardError::UnsupportedRegion(
                    "range spans mappings with different protection",
                ));
            }
            cursor = cursor.max(span.end);
        }
        if cursor < region.end() {
            return Err(GuardError::UnsupportedRegion("range is not fully mapped"));
        }
        Ok(first.protection)
    }

    /// Sets the protection of `region` to `flags` and starts tracking it.
    ///
    /// The alignment check comes before any platform call. If the region
    /// already carries `flags`, the platform is not called and the status
    /// is [`ProtectStatus::AlreadySatisfied`].
    ///
    /// # Errors
    ///
    /// - [`GuardError::Alignment`] if `start` or `len` is not page aligned.
    /// - [`GuardError::UnsupportedRegion`] if the region is empty, not fully
    ///   mapped or mapped with differing flags.
    /// - [`GuardError::PermissionDenied`] if the platform refuses.
    /// - [`GuardError::Fatal`] for other platform failures; the region moves
    ///   to [`RegionState::Fatal`].
    ///
    /// # Safety
    ///
    /// Memory in `region` that the program still reads, writes or executes
    /// must stay accessible under `flags`.
    pub unsafe fn protect(
        &mut self,
        region: Region,
        flags: Protection,
    ) -> Result<ProtectionRegion, GuardError> {
        let page_size = self.backend.page_size();
        if !region.is_page_aligned(page_size) {
            return Err(GuardError::Alignment {
                start: region.start,
                len: region.len,
                page_size,
            });
        }
        let current = self.current_protection(region)?;

        let status = if current == flags {
            ProtectStatus::AlreadySatisfied
        } else {
            // SAFETY: forwarded from the caller.
            if let Err(err) = unsafe { self.backend.apply(region, flags) } {
                if matches!(err, GuardError::Fatal(_)) {
                    self.track(region, current, flags, RegionState::Fatal);
                }
                return Err(err);
            }
            ProtectStatus::Applied
        };
        let actual = self.current_protection(region)?;
        self.track(region, current, flags, RegionState::Protected);
        Ok(ProtectionRegion {
            region,
            requested: flags,
            actual,
            status,
        })
    }

    /// Compares the protection of `region` with `expected`.
    ///
    /// Never changes memory. A tracked region in
    /// [`RegionState::Protected`] moves to [`RegionState::Violated`] on a
    /// mismatch.
    ///
    /// # Errors
    ///
    /// See [`current_protection`](Self::current_protection).
    pub fn verify(
        &mut self,
        region: Region,
        expected: Protection,
    ) -> Result<Verification, GuardError> {
        let actual = self.current_protection(region)?;
        if actual == expected {
            return Ok(Verification::Match);
        }
        if let Some(entry) = self.entry_mut(region) {
            if entry.state == RegionState::Protected {
                entry.state = RegionState::Violated;
            }
        }
        Ok(Verification::Mismatch(actual))
    }

    /// Verifies every tracked region against the flags applied to it.
    ///
    /// Regions in [`RegionState::Fatal`] are skipped.
    pub fn verify_all(&mut self) -> Vec<(Region, Result<Verification, GuardError>)> {
        let targets: Vec<_> = self
            .tracked
            .iter()
            .filter(|t| t.state != RegionState::Fatal)
            .map(|t| (t.region, t.applied))
            .collect();
        targets
            .into_iter()
            .map(|(region, applied)| (region, self.verify(region, applied)))
            .collect()
    }

    /// Restores the flags `region` had before it was first protected and
    /// stops tracking it.
    ///
    /// # Errors
    ///
    /// [`GuardError::UnsupportedRegion`] if the region is not tracked, or
    /// any error of the restoring platform call (the region stays tracked).
    ///
    /// # Safety
    ///
    /// As for [`protect`](Self::protect) with the original flags.
    pub unsafe fn release(&mut self, region: Region) -> Result<(), GuardError> {
        let Some(pos) = self.tracked.iter().position(|t| t.region == region) else {
            return Err(GuardError::UnsupportedRegion("region is not tracked"));
        };
        let original = self.tracked[pos].original;
        if self.current_protection(region)? != original {
            // SAFETY: forwarded from the caller.
            unsafe { self.backend.apply(region, original)? };
        }
        self.tracked.remove(pos);
        Ok(())
    }

    /// State of `region`; untracked regions are
    /// [`RegionState::Unprotected`].
    #[must_use]
    pub fn state(&self, region: Region) -> RegionState {
        self.tracked
            .iter()
            .find(|t| t.region == region)
            .map_or(RegionState::Unprotected, |t| t.state)
    }

    /// Regions currently tracked, with their state.
    pub fn tracked(&self) -> impl Iterator<Item = (Region, RegionState)> + '_ {
        self.tracked.iter().map(|t| (t.region, t.state))
    }

    fn entry_mut(&mut self, region: Region) -> Option<&mut Tracked> {
        self.tracked.iter_mut().find(|t| t.region == region)
    }

    fn track(&mut self, region: Region, current: Protection, applied: Protection, state: RegionState) {
        if let Some(entry) = self.entry_mut(region) {
            entry.applied = applied;
            entry.state = state;
        } else {
            self.tracked.push(Tracked {
                region,
                original: current,
                applied,
                state,
            });
        }
    }
}
