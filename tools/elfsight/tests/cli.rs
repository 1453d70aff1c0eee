//! Integration tests for the elfsight binary.
//!
//! Fixtures are synthesized with the `elfsight-elf` builder and written to
//! the temporary directory; the binary runs as a subprocess.

use std::path::PathBuf;
use std::process::{Command, Output};

use elfsight_elf::builder::{ElfBuilder, SectionSpec, SegmentSpec};
use elfsight_elf::{Class, Endian, SegmentFlags};

fn elfsight(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elfsight"))
        .args(args)
        .current_dir(std::env::temp_dir())
        .output()
        .expect("failed to execute elfsight")
}

/// Writes `bytes` to a per-test file in the temporary directory.
fn fixture(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "elfsight-cli-{}-{name}",
        std::process::id()
    ));
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// One `PT_LOAD` with 4096 file bytes and 8192 memory bytes.
fn bss_image() -> Vec<u8> {
    ElfBuilder::new(Class::Elf64, Endian::Little)
        .entry(0x40_0078)
        .section(SectionSpec::progbits(".text", &[0x90; 3976]).executable())
        .section(SectionSpec::nobits(".bss", 4096).writable().align(32))
        .segment(
            SegmentSpec::load(SegmentFlags::R | SegmentFlags::W | SegmentFlags::X)
                .with_headers()
                .covering(&[".text", ".bss"]),
        )
        .build()
}

fn code(output: &Output) -> Option<i32> {
    output.status.code()
}

fn describe(output: &Output) -> String {
    format!(
        "exit={:?}\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    )
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_valid_file_exits_zero() {
    let path = fixture("valid", &bss_image());
    let output = elfsight(&["inspect", path.to_str().unwrap(), "--mapping"]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(".text"));
    assert!(stdout.contains("No layout anomalies."));
    assert!(stdout.contains("Memory-only bytes:      4096"));
}

#[test]
fn inspect_json_reports_memory_only_bytes() {
    let path = fixture("json", &bss_image());
    let output = elfsight(&["inspect", path.to_str().unwrap(), "--format", "json"]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(report["memory_only_bytes"], 4096);
    assert_eq!(report["zero_fill_section_bytes"], 4096);
    assert_eq!(report["anomalies"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["segments"][0]["filesz"], 4096);
    assert_eq!(report["segments"][0]["memsz"], 8192);

    let bss = report["sections"]
        .as_array()
        .and_then(|sections| sections.iter().find(|s| s["name"] == ".bss"))
        .expect(".bss record");
    assert_eq!(bss["type_tag"], "NOBITS");
    assert_eq!(bss["file_size"], 0);
    assert_eq!(bss["mem_size"], 4096);
    assert!(bss["vaddr"].is_u64());
}

#[test]
fn inspect_bad_magic_exits_two() {
    let mut image = bss_image();
    image[1] = b'X';
    let path = fixture("bad-magic", &image);
    let output = elfsight(&["inspect", path.to_str().unwrap()]);
    assert_eq!(code(&output), Some(2), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("InvalidMagic"));
    assert!(output.stdout.is_empty());
}

#[test]
fn inspect_truncated_file_exits_two() {
    let image = bss_image();
    let path = fixture("truncated", &image[..32]);
    let output = elfsight(&["inspect", path.to_str().unwrap()]);
    assert_eq!(code(&output), Some(2), "{}", describe(&output));
}

#[test]
fn inspect_missing_file_exits_one() {
    let output = elfsight(&["inspect", "/nonexistent/elfsight/binary"]);
    assert_eq!(code(&output), Some(1), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("NotFound"));
}

#[test]
fn config_file_sets_the_format() {
    let path = fixture("config-target", &bss_image());
    let config = fixture("config.toml", b"[report]\nformat = \"json\"\n");
    let output = elfsight(&[
        "-c",
        config.to_str().unwrap(),
        "inspect",
        path.to_str().unwrap(),
    ]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));
    serde_json::from_slice::<serde_json::Value>(&output.stdout).expect("stdout is JSON");
}

#[test]
fn unknown_flag_exits_one_not_two() {
    let output = elfsight(&["inspect", "--no-such-flag", "a.out"]);
    assert_eq!(code(&output), Some(1), "{}", describe(&output));
    assert!(!output.stderr.is_empty());
}

#[test]
fn help_exits_zero() {
    let output = elfsight(&["--help"]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("inspect"));
}

// ---------------------------------------------------------------------------
// listings
// ---------------------------------------------------------------------------

#[test]
fn listings_and_extract() {
    let path = fixture("listing", &bss_image());
    let path = path.to_str().unwrap();

    let sections = elfsight(&["sections", path]);
    assert_eq!(code(&sections), Some(0), "{}", describe(&sections));
    assert!(String::from_utf8_lossy(&sections.stdout).contains("NOBITS"));

    let segments = elfsight(&["segments", path]);
    assert_eq!(code(&segments), Some(0), "{}", describe(&segments));
    assert!(String::from_utf8_lossy(&segments.stdout).contains("LOAD"));

    let out = std::env::temp_dir().join(format!("elfsight-cli-{}-text.bin", std::process::id()));
    let extract = elfsight(&["extract", path, ".text", "-o", out.to_str().unwrap()]);
    assert_eq!(code(&extract), Some(0), "{}", describe(&extract));
    assert_eq!(std::fs::read(&out).unwrap(), vec![0x90; 3976]);
}

// ---------------------------------------------------------------------------
// guard-self-test
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
#[test]
fn guard_self_test_passes() {
    let output = elfsight(&["guard-self-test", "--probe-write"]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("passed"));
}

#[cfg(target_os = "linux")]
#[test]
fn guard_self_test_detects_tampering() {
    let output = elfsight(&["guard-self-test", "--simulate-tamper"]);
    assert_eq!(code(&output), Some(3), "{}", describe(&output));
}

#[cfg(target_os = "linux")]
#[test]
fn guard_self_test_missing_section_exits_one() {
    let output = elfsight(&["guard-self-test", "--section", ".no-such-section"]);
    assert_eq!(code(&output), Some(1), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("SectionNotFound"));
}

#[cfg(target_os = "linux")]
#[test]
fn guard_self_test_protects_whole_pages_of_text() {
    let output = elfsight(&["guard-self-test", "--section", ".text", "--flags", "rx"]);
    assert_eq!(code(&output), Some(0), "{}", describe(&output));
}
