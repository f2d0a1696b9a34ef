//! Ordering between classified versions

use std::cmp::Ordering;

use crate::version::parse::{Version, VersionKind};

/// Answer to "is this candidate newer than the baseline?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newness {
    /// Candidate orders strictly after the baseline (or there is no baseline)
    Newer,
    /// Candidate orders before or equal to the baseline
    NotNewer,
    /// The two versions cannot be ordered; callers treat this as not newer
    /// and should surface a warning
    Incomparable,
}

/// Compare two versions.
///
/// Returns `None` when no ordering is defined, which happens whenever an
/// opaque version meets anything other than an identical opaque version.
pub fn compare(a: &Version, b: &Version) -> Option<Ordering> {
    match (a.kind(), b.kind()) {
        (VersionKind::SemVer(x), VersionKind::SemVer(y)) => Some(compare_semver(x, y)),
        (VersionKind::CalVer(x), VersionKind::CalVer(y)) => {
            Some(x.components().cmp(&y.components()))
        }
        (VersionKind::Numeric(x), VersionKind::Numeric(y)) => Some(compare_padded(x, y)),

        // Mixed numeric schemes: compare the numeric core, then a SemVer
        // prerelease sorts below an otherwise equal release.
        (VersionKind::SemVer(_), VersionKind::Numeric(_) | VersionKind::CalVer(_))
        | (VersionKind::Numeric(_) | VersionKind::CalVer(_), VersionKind::SemVer(_))
        | (VersionKind::CalVer(_), VersionKind::Numeric(_))
        | (VersionKind::Numeric(_), VersionKind::CalVer(_)) => {
            let x = a.numeric_components()?;
            let y = b.numeric_components()?;
            Some(
                compare_padded(&x, &y)
                    .then_with(|| b.is_prerelease().cmp(&a.is_prerelease())),
            )
        }

        (VersionKind::Opaque(x), VersionKind::Opaque(y)) => (x == y).then_some(Ordering::Equal),
        (VersionKind::Opaque(_), _) | (_, VersionKind::Opaque(_)) => None,
    }
}

/// Decide whether `candidate` is newer than `baseline`.
///
/// A missing baseline means nothing has been recorded yet, so every
/// candidate is new. Prerelease policy is not applied here.
pub fn check_newer(candidate: &Version, baseline: Option<&Version>) -> Newness {
    let Some(baseline) = baseline else {
        return Newness::Newer;
    };

    match compare(candidate, baseline) {
        Some(Ordering::Greater) => Newness::Newer,
        Some(Ordering::Less | Ordering::Equal) => Newness::NotNewer,
        None => Newness::Incomparable,
    }
}

/// `check_newer` collapsed to a boolean; incomparable versions are never newer
pub fn is_newer(candidate: &Version, baseline: Option<&Version>) -> bool {
    check_newer(candidate, baseline) == Newness::Newer
}

fn compare_semver(a: &semver::Version, b: &semver::Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then_with(|| a.minor.cmp(&b.minor))
        .then_with(|| a.patch.cmp(&b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            // prerelease < release
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_prerelease(a.pre.as_str(), b.pre.as_str()),
        })
}

/// Dot-separated identifiers compared pairwise: numeric identifiers
/// numerically, alphanumeric ones lexically, numeric below alphanumeric.
/// A shorter list that is a prefix of the longer one sorts first.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(m), Ok(n)) => m.cmp(&n),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Pairwise comparison with the shorter side padded by zeros
fn compare_padded(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare(self, other)
    }
}
