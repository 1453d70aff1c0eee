//! Process exit codes.

use std::process::ExitCode;

use elfsight_elf::ElfError;
use elfsight_guard::GuardError;

/// Command completed.
pub const SUCCESS: u8 = 0;
/// I/O, platform or usage failure.
pub const FAILURE: u8 = 1;
/// The input is not a well-formed ELF file.
pub const MALFORMED: u8 = 2;
/// The self-test detected a protection violation.
pub const VIOLATED: u8 = 3;

/// Exit code for an error, decided by the first library error in its chain.
pub fn code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ElfError>() {
            return if err.is_malformed() { MALFORMED } else { FAILURE };
        }
        if cause.downcast_ref::<GuardError>().is_some() {
            return FAILURE;
        }
    }
    FAILURE
}

/// Short error kind for the `error:` line.
pub fn kind_of(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ElfError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<GuardError>() {
            return err.kind();
        }
    }
    "Error"
}

/// Prints `err` to stderr and converts it to an exit code.
pub fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("error: {}: {err:#}", kind_of(err));
    ExitCode::from(code_for(err))
}

/// Exit code for a command line clap rejected. Help and version output
/// succeed; usage errors are failures, never [`MALFORMED`].
pub fn usage_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { FAILURE } else { SUCCESS }
}

/// Prints clap's message and converts it to an exit code.
pub fn usage(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    ExitCode::from(usage_code(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use clap::Parser;

    use crate::cli::Cli;

    fn wrapped<E: std::error::Error + Send + Sync + 'static>(err: E) -> anyhow::Error {
        Err::<(), _>(err).context("reading x").unwrap_err()
    }

    #[test]
    fn malformed_input_is_two() {
        let err = wrapped(ElfError::InvalidMagic);
        assert_eq!(code_for(&err), MALFORMED);
        assert_eq!(kind_of(&err), "InvalidMagic");
    }

    #[test]
    fn access_failures_are_one() {
        assert_eq!(code_for(&wrapped(ElfError::NotFound)), FAILURE);
        assert_eq!(code_for(&wrapped(ElfError::PermissionDenied)), FAILURE);
        let err = wrapped(GuardError::Alignment {
            start: 1,
            len: 4096,
            page_size: 4096,
        });
        assert_eq!(code_for(&err), FAILURE);
        assert_eq!(kind_of(&err), "AlignmentError");
    }

    #[test]
    fn unknown_errors_are_one() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(code_for(&err), FAILURE);
        assert_eq!(kind_of(&err), "Error");
    }

    fn parse_error(args: &[&str]) -> clap::Error {
        Cli::try_parse_from(args).unwrap_err()
    }

    #[test]
    fn usage_errors_are_one() {
        let err = parse_error(&["elfsight", "inspect", "--no-such-flag", "a.out"]);
        assert_eq!(usage_code(&err), FAILURE);
        assert_eq!(usage_code(&parse_error(&["elfsight", "inspect"])), FAILURE);
        assert_eq!(usage_code(&parse_error(&["elfsight", "-q", "-v", "sections", "x"])), FAILURE);
    }

    #[test]
    fn help_and_version_succeed() {
        assert_eq!(usage_code(&parse_error(&["elfsight", "--help"])), SUCCESS);
        assert_eq!(usage_code(&parse_error(&["elfsight", "--version"])), SUCCESS);
        assert_eq!(usage_code(&parse_error(&["elfsight", "inspect", "--help"])), SUCCESS);
    }
}
