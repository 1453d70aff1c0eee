//! elfsight: ELF layout inspector and runtime integrity guard.
//!
//! `inspect` and the listing commands parse a binary from disk with
//! `elfsight-elf`; `guard-self-test` protects a section of the running
//! executable with `elfsight-guard` and verifies the protection.
//!
//! Exit codes: 0 success, 1 I/O or platform failure, 2 malformed input,
//! 3 protection violation detected.

mod cli;
mod config;
mod exit;
mod listing;
mod report;
mod self_test;
mod verbose;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use elfsight_elf::{ElfFile, LayoutReport};

use crate::cli::{Cli, Command, OutputFormat};
use crate::config::Config;
use crate::verbose::{dprintln, vprintln};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return exit::usage(&err),
    };
    verbose::init(cli.quiet, cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => exit::report(&err),
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Inspect(args) => {
            cmd_inspect(&args.path, config.format(args.format), config.mapping(args.mapping))
        }
        Command::GuardSelfTest(args) => cmd_guard_self_test(&self_test::SelfTest {
            section: config.guard_section(args.section.as_deref()),
            flags: config.guard_flags(args.flags.as_deref()),
            simulate_tamper: args.simulate_tamper,
            probe_write: args.probe_write,
        }),
        Command::Sections(args) => {
            let elf = open(&args.path)?;
            listing::write_sections(&elf, &mut io::stdout().lock())?;
            Ok(exit::SUCCESS)
        }
        Command::Segments(args) => {
            let elf = open(&args.path)?;
            listing::write_segments(&elf, &mut io::stdout().lock())?;
            Ok(exit::SUCCESS)
        }
        Command::Symbols(args) => {
            let elf = open(&args.path)?;
            listing::write_symbols(&elf, &mut io::stdout().lock())?;
            Ok(exit::SUCCESS)
        }
        Command::Extract(args) => {
            let elf = open(&args.path)?;
            let written = listing::extract(&elf, &args.section, &args.output)?;
            dprintln!(
                "wrote {written} bytes of {} to {}",
                args.section,
                args.output.display()
            );
            Ok(exit::SUCCESS)
        }
    }
}

/// Opens and parses `path`, logging the header in verbose mode.
fn open(path: &Path) -> Result<ElfFile<'static>> {
    let _t = verbose::Timer::start("parse");
    let elf = ElfFile::open(path).with_context(|| format!("reading {}", path.display()))?;
    vprintln!(
        "{}: {} {} sections, {} program headers",
        path.display(),
        elf.identity().class,
        elf.sections().len(),
        elf.program_headers().len()
    );
    Ok(elf)
}

fn cmd_inspect(path: &Path, format: OutputFormat, mapping: bool) -> Result<u8> {
    let elf = open(path)?;
    let layout = {
        let _t = verbose::Timer::start("layout");
        LayoutReport::build(&elf)
    };
    let report = report::Report::new(path, &elf, &layout, mapping);

    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Table => report.write_table(&mut out)?,
        OutputFormat::Json => report.write_json(&mut out)?,
    }
    out.flush()?;
    Ok(exit::SUCCESS)
}

fn cmd_guard_self_test(test: &self_test::SelfTest<'_>) -> Result<u8> {
    match self_test::run(test)? {
        self_test::Outcome::Verified => {
            println!("guard self-test passed: {} is {}", test.section, test.flags);
            Ok(exit::SUCCESS)
        }
        self_test::Outcome::Violated => {
            println!("guard self-test: violation detected in {}", test.section);
            Ok(exit::VIOLATED)
        }
    }
}
