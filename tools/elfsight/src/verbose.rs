//! Diagnostic output levels.
//!
//! - **Quiet** (`-q`): results and errors only
//! - **Default**: results, errors and progress notes
//! - **Verbose** (`-v`): also parse details, addresses and timings
//!
//! Diagnostics go to stderr so that JSON on stdout stays machine-readable.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Results and errors only.
    Quiet = 0,
    /// Progress notes as well.
    Default = 1,
    /// Everything.
    Verbose = 2,
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Default as u8);

/// Sets the process-wide level from the `-q`/`-v` flags.
pub fn init(quiet: bool, verbose: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::Quiet,
        (false, true) => Level::Verbose,
        (false, false) => Level::Default,
    };
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// The process-wide level.
pub fn level() -> Level {
    match LEVEL.load(Ordering::Relaxed) {
        0 => Level::Quiet,
        2 => Level::Verbose,
        _ => Level::Default,
    }
}

/// `-v` was given.
pub fn is_verbose() -> bool {
    level() >= Level::Verbose
}

/// `-q` was given.
pub fn is_quiet() -> bool {
    level() == Level::Quiet
}

/// `eprintln!` in verbose mode only.
macro_rules! vprintln {
    ($($arg:tt)*) => {
        if $crate::verbose::is_verbose() {
            eprintln!($($arg)*);
        }
    };
}

pub(crate) use vprintln;

/// `eprintln!` unless quiet.
macro_rules! dprintln {
    ($($arg:tt)*) => {
        if !$crate::verbose::is_quiet() {
            eprintln!($($arg)*);
        }
    };
}

pub(crate) use dprintln;

/// Reports how long a step took when dropped, in verbose mode.
pub struct Timer {
    step: &'static str,
    since: Instant,
}

impl Timer {
    /// Starts timing `step`.
    pub fn start(step: &'static str) -> Self {
        Self {
            step,
            since: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if is_verbose() {
            eprintln!("  {} took {:.1?}", self.step, self.since.elapsed());
        }
    }
}
