//! Write probing in a disposable child process.
//!
//! Shows what page protection enforces: a write into a read-only page
//! faults in hardware, however the data was declared in the source.

use std::fmt;
use std::io;

/// What happened when the child wrote to the probed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProbe {
    /// The write completed.
    Succeeded,
    /// The child was killed by this signal (normally `SIGSEGV` or `SIGBUS`).
    Faulted(i32),
    /// The child exited with an unexpected status.
    Exited(i32),
}

impl WriteProbe {
    /// Returns `true` if the write was blocked by memory protection.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Faulted(sig) if *sig == libc::SIGSEGV || *sig == libc::SIGBUS)
    }
}

impl fmt::Display for WriteProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("write succeeded"),
            Self::Faulted(sig) if *sig == libc::SIGSEGV => f.write_str("write faulted (SIGSEGV)"),
            Self::Faulted(sig) if *sig == libc::SIGBUS => f.write_str("write faulted (SIGBUS)"),
            Self::Faulted(sig) => write!(f, "child killed by signal {sig}"),
            Self::Exited(code) => write!(f, "child exited with status {code}"),
        }
    }
}

/// Forks, rewrites the byte at `addr` in the child and reports how the
/// child ended. The parent's memory is never written.
///
/// # Errors
///
/// Failures of `fork` or `waitpid`.
///
/// # Safety
///
/// `addr` must be mapped and readable in this process.
pub unsafe fn probe_write(addr: *mut u8) -> io::Result<WriteProbe> {
    // SAFETY: the child only calls async-signal-safe functions before _exit.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }
    if pid == 0 {
        let no_core = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: the caller guarantees `addr` is mapped and readable; the
        // write only reaches the child's copy-on-write page.
        unsafe {
            libc::setrlimit(libc::RLIMIT_CORE, &raw const no_core);
            addr.write_volatile(addr.read_volatile());
            libc::_exit(0);
        }
    }

    let mut status = 0;
    loop {
        // SAFETY: `pid` is our child and `status` is a valid out pointer.
        let rc = unsafe { libc::waitpid(pid, &raw mut status, 0) };
        if rc == pid {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    Ok(if libc::WIFSIGNALED(status) {
        WriteProbe::Faulted(libc::WTERMSIG(status))
    } else if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 {
        WriteProbe::Succeeded
    } else {
        WriteProbe::Exited(libc::WEXITSTATUS(status))
    })
}
