//! Version string classification
//!
//! A tag is classified by trying each scheme in priority order:
//! SemVer, CalVer, Numeric, and finally Opaque. The first scheme that
//! accepts the string wins, so classification never fails.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Calendar version components (`2024.01.15`, `2024-01-15.2`, `20240115`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalVer {
    pub year: u32,
    pub month: u32,
    /// Zero when the tag only carries year and month
    pub day: u32,
    /// Trailing build/sequence number, zero when absent
    pub sequence: u64,
}

impl CalVer {
    /// Date tuple followed by the sequence number
    pub fn components(&self) -> [u64; 4] {
        [
            u64::from(self.year),
            u64::from(self.month),
            u64::from(self.day),
            self.sequence,
        ]
    }
}

/// Structured form of a version string
#[derive(Debug, Clone)]
pub enum VersionKind {
    SemVer(semver::Version),
    CalVer(CalVer),
    Numeric(Vec<u64>),
    Opaque(String),
}

impl VersionKind {
    pub fn name(&self) -> &'static str {
        match self {
            VersionKind::SemVer(_) => "semver",
            VersionKind::CalVer(_) => "calver",
            VersionKind::Numeric(_) => "numeric",
            VersionKind::Opaque(_) => "opaque",
        }
    }
}

/// A release version: the label as published plus its parsed form
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    kind: VersionKind,
}

impl Version {
    /// Classify a version string. Never fails: anything that is not
    /// SemVer, CalVer or Numeric becomes `Opaque`.
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize_tag(raw);
        let kind = parse_semver(normalized)
            .map(VersionKind::SemVer)
            .or_else(|| parse_calver(normalized).map(VersionKind::CalVer))
            .or_else(|| parse_numeric(normalized).map(VersionKind::Numeric))
            .unwrap_or_else(|| VersionKind::Opaque(normalized.to_string()));

        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    /// The tag exactly as supplied, including any `v` prefix
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The tag with surrounding whitespace and a single leading `v`/`V` removed
    pub fn normalized(&self) -> &str {
        normalize_tag(&self.raw)
    }

    pub fn kind(&self) -> &VersionKind {
        &self.kind
    }

    /// True for SemVer versions carrying a prerelease component
    pub fn is_prerelease(&self) -> bool {
        matches!(&self.kind, VersionKind::SemVer(v) if !v.pre.is_empty())
    }

    /// Numeric components used when two different schemes are compared.
    /// Returns `None` for opaque versions.
    pub(crate) fn numeric_components(&self) -> Option<Vec<u64>> {
        match &self.kind {
            VersionKind::SemVer(v) => Some(vec![v.major, v.minor, v.patch]),
            VersionKind::CalVer(c) => Some(c.components().to_vec()),
            VersionKind::Numeric(parts) => Some(parts.clone()),
            VersionKind::Opaque(_) => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Version::parse(raw)
    }
}

/// Strip surrounding whitespace and one leading `v`/`V`.
///
/// Only strips when the prefix is followed by a digit, so tags such as
/// `version-1` or `v` alone are left for opaque classification.
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    match tag.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => tag,
    }
}

fn parse_semver(s: &str) -> Option<semver::Version> {
    semver::Version::parse(s).ok()
}

fn calver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})[.\-](\d{1,2})(?:[.\-](\d{1,2}))?(?:[.\-_](\d+))?$")
            .expect("calver pattern is valid")
    })
}

fn compact_calver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})(\d{2})(\d{2})(?:[.\-_](\d+))?$")
            .expect("compact calver pattern is valid")
    })
}

fn parse_calver(s: &str) -> Option<CalVer> {
    let captures = calver_pattern()
        .captures(s)
        .or_else(|| compact_calver_pattern().captures(s))?;

    let year: u32 = captures.get(1)?.as_str().parse().ok()?;
    let month: u32 = captures.get(2)?.as_str().parse().ok()?;
    let day: u32 = match captures.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let sequence: u64 = match captures.get(4) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    let day_is_valid = captures.get(3).is_none() || (1..=31).contains(&day);
    if !(1900..=9999).contains(&year) || !(1..=12).contains(&month) || !day_is_valid {
        return None;
    }

    Some(CalVer {
        year,
        month,
        day,
        sequence,
    })
}

fn parse_numeric(s: &str) -> Option<Vec<u64>> {
    if s.is_empty() {
        return None;
    }
    s.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", "semver")]
    #[case("v1.2.3", "semver")]
    #[case("V1.2.3-rc.1+build.5", "semver")]
    #[case("2024.01.15", "calver")]
    #[case("2024-01-15", "calver")]
    #[case("2024.01", "calver")]
    #[case("2024.01.15.3", "calver")]
    #[case("20240115", "calver")]
    #[case("1.2", "numeric")]
    #[case("1.2.3.4", "numeric")]
    #[case("42", "numeric")]
    #[case("2024.13", "numeric")]
    #[case("", "opaque")]
    #[case("latest", "opaque")]
    #[case("1..2", "opaque")]
    #[case("release-1.2.3", "opaque")]
    #[case("v", "opaque")]
    #[case("99999999999999999999999", "opaque")]
    fn parse_classifies_by_priority(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Version::parse(raw).kind().name(), expected);
    }

    #[test]
    fn parse_keeps_raw_tag_and_strips_prefix_for_normalized_form() {
        let version = Version::parse("v2.0.0");

        assert_eq!(version.raw(), "v2.0.0");
        assert_eq!(version.normalized(), "2.0.0");
        assert_eq!(version.to_string(), "v2.0.0");
    }

    #[test]
    fn semver_wins_over_calver_when_both_would_accept() {
        let version = Version::parse("2024.10.15");
        assert!(matches!(version.kind(), VersionKind::SemVer(_)));
    }

    #[test]
    fn calver_captures_sequence_number() {
        let Some(calver) = parse_calver("2024.01.15-2") else {
            panic!("expected calver");
        };
        assert_eq!(
            calver,
            CalVer {
                year: 2024,
                month: 1,
                day: 15,
                sequence: 2
            }
        );
    }

    #[rstest]
    #[case("1.0.0-alpha", true)]
    #[case("1.0.0", false)]
    #[case("2024.01.15", false)]
    #[case("nightly", false)]
    fn is_prerelease_reflects_semver_prerelease(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(Version::parse(raw).is_prerelease(), expected);
    }

    #[rstest]
    #[case("v1.0.0", "1.0.0")]
    #[case("  V3  ", "3")]
    #[case("version-1", "version-1")]
    #[case("v", "v")]
    fn normalize_tag_strips_single_prefix(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_tag(raw), expected);
    }
}
