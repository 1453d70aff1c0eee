//! Command-line interface definitions for elfsight.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

/// ELF layout inspector and runtime integrity guard.
#[derive(Debug, Parser)]
#[command(name = "elfsight", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to `elfsight.toml` when present).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Print results and errors only.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print parse details, addresses and timings.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the file layout report of an ELF binary.
    Inspect(InspectArgs),
    /// Protect a section of this executable and verify the protection.
    GuardSelfTest(GuardArgs),
    /// List the section headers.
    Sections(PathArgs),
    /// List the program headers.
    Segments(PathArgs),
    /// List the symbol tables.
    Symbols(PathArgs),
    /// Write the raw bytes of one section to a file.
    Extract(ExtractArgs),
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text columns.
    #[default]
    Table,
    /// A single JSON document.
    Json,
}

/// Arguments for the `inspect` subcommand.
#[derive(Debug, Parser)]
pub struct InspectArgs {
    /// Binary to inspect.
    pub path: PathBuf,

    /// Output format (overrides the config file).
    #[arg(long, short = 'f', value_enum)]
    pub format: Option<OutputFormat>,

    /// Also print which sections each segment maps.
    #[arg(long, short = 'm')]
    pub mapping: bool,
}

/// Arguments for the `guard-self-test` subcommand.
#[derive(Debug, Parser)]
pub struct GuardArgs {
    /// Section of this executable to protect.
    #[arg(long, short = 's')]
    pub section: Option<String>,

    /// Protection to apply: `r`, `rx`, `rw`, `rwx` or `none`.
    #[arg(long)]
    pub flags: Option<String>,

    /// Restore write access behind the guard's back before verifying.
    #[arg(long)]
    pub simulate_tamper: bool,

    /// Fork a child that writes into the protected section.
    #[arg(long)]
    pub probe_write: bool,
}

/// A single binary path.
#[derive(Debug, Parser)]
pub struct PathArgs {
    /// Binary to read.
    pub path: PathBuf,
}

/// Arguments for the `extract` subcommand.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Binary to read.
    pub path: PathBuf,

    /// Section name, e.g. `.rodata`.
    pub section: String,

    /// Output file.
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}
