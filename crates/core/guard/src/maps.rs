//! `/proc/<pid>/maps` parsing.

use crate::protection::{Protection, Region};

/// One mapping of the address space with uniform protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedSpan {
    /// First address.
    pub start: usize,
    /// One past the last address.
    pub end: usize,
    /// Current protection.
    pub protection: Protection,
}

impl MappedSpan {
    /// Returns `true` if the span shares at least one byte with `region`.
    #[must_use]
    pub fn overlaps(&self, region: Region) -> bool {
        self.start < region.end() && region.start < self.end
    }
}

/// Parses one line such as
/// `55d0c8a00000-55d0c8a21000 r-xp 00000000 08:01 1234 /usr/bin/cat`.
#[must_use]
pub fn parse_line(line: &str) -> Option<MappedSpan> {
    let mut fields = line.split_ascii_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }
    let protection = Protection::from_perms(fields.next()?)?;
    Some(MappedSpan {
        start,
        end,
        protection,
    })
}

/// Parses a whole maps file, skipping lines that do not parse.
#[must_use]
pub fn parse(text: &str) -> Vec<MappedSpan> {
    text.lines().filter_map(parse_line).collect()
}

/// The spans overlapping `region`, in address order.
#[must_use]
pub fn overlapping(spans: &[MappedSpan], region: Region) -> Vec<MappedSpan> {
    let mut hits: Vec<_> = spans.iter().copied().filter(|s| s.overlaps(region)).collect();
    hits.sort_by_key(|s| s.start);
    hits
}
