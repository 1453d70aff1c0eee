//! Optional `elfsight.toml` configuration.
//!
//! ```toml
//! [report]
//! format = "json"
//! mapping = true
//!
//! [guard]
//! section = ".elfsight.guarded"
//! flags = "r"
//! ```
//!
//! Every key is optional; command-line flags take precedence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::OutputFormat;

/// File looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "elfsight.toml";

/// Section protected by `guard-self-test` unless configured otherwise.
pub const DEFAULT_GUARD_SECTION: &str = ".elfsight.guarded";

/// Protection applied by `guard-self-test` unless configured otherwise.
pub const DEFAULT_GUARD_FLAGS: &str = "r";

/// Parsed configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `[report]` table.
    #[serde(default)]
    pub report: ReportConfig,
    /// `[guard]` table.
    #[serde(default)]
    pub guard: GuardConfig,
}

/// Defaults for `inspect`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Output format.
    pub format: Option<OutputFormat>,
    /// Print the section to segment mapping.
    pub mapping: Option<bool>,
}

/// Defaults for `guard-self-test`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Section to protect.
    pub section: Option<String>,
    /// Protection letters.
    pub flags: Option<String>,
}

impl Config {
    /// Loads `explicit` if given (it must exist), otherwise
    /// [`DEFAULT_CONFIG_FILE`] from the current directory if present,
    /// otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Effective report format.
    pub fn format(&self, cli: Option<OutputFormat>) -> OutputFormat {
        cli.or(self.report.format).unwrap_or_default()
    }

    /// Effective mapping switch.
    pub fn mapping(&self, cli: bool) -> bool {
        cli || self.report.mapping.unwrap_or(false)
    }

    /// Effective guard section.
    pub fn guard_section<'a>(&'a self, cli: Option<&'a str>) -> &'a str {
        cli.or(self.guard.section.as_deref())
            .unwrap_or(DEFAULT_GUARD_SECTION)
    }

    /// Effective guard protection letters.
    pub fn guard_flags<'a>(&'a self, cli: Option<&'a str>) -> &'a str {
        cli.or(self.guard.flags.as_deref())
            .unwrap_or(DEFAULT_GUARD_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.format(None), OutputFormat::Table);
        assert!(!config.mapping(false));
        assert_eq!(config.guard_section(None), DEFAULT_GUARD_SECTION);
        assert_eq!(config.guard_flags(None), "r");
    }

    #[test]
    fn file_values_and_cli_overrides() {
        let config = Config::parse(
            r#"
            [report]
            format = "json"
            mapping = true

            [guard]
            section = ".data"
            flags = "rx"
            "#,
        )
        .unwrap();
        assert_eq!(config.format(None), OutputFormat::Json);
        assert_eq!(config.format(Some(OutputFormat::Table)), OutputFormat::Table);
        assert!(config.mapping(false));
        assert_eq!(config.guard_section(None), ".data");
        assert_eq!(config.guard_section(Some(".text")), ".text");
        assert_eq!(config.guard_flags(None), "rx");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("[report]\ncolour = true\n").is_err());
        assert!(Config::parse("[report]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let missing = std::env::temp_dir().join("elfsight-no-such-config.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(format!("{err:#}").contains("reading"));
    }
}
