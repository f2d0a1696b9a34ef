//! Target release selection

use crate::release::ReleaseRecord;
use crate::version::normalize_tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// Pinned release found in the list
    Pinned(&'a ReleaseRecord),
    /// Newest release allowed by the prerelease policy
    Latest(&'a ReleaseRecord),
    PinNotFound,
    NoEligibleRelease,
}

/// Choose the release to evaluate.
///
/// A pin is matched on the normalized tag (`v1.2.3` and `1.2.3` are the
/// same pin) and ignores the prerelease policy. Without a pin, the first
/// eligible release of the newest-first list is taken.
pub fn select_release<'a>(
    releases: &'a [ReleaseRecord],
    pin: Option<&str>,
    include_prereleases: bool,
) -> Selection<'a> {
    if let Some(pin) = pin {
        let wanted = normalize_tag(pin);
        return releases
            .iter()
            .find(|r| normalize_tag(&r.tag_name) == wanted)
            .map_or(Selection::PinNotFound, Selection::Pinned);
    }

    releases
        .iter()
        .find(|r| include_prereleases || !r.prerelease)
        .map_or(Selection::NoEligibleRelease, Selection::Latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::RepositoryId;
    use rstest::rstest;

    fn release(tag: &str, prerelease: bool) -> ReleaseRecord {
        ReleaseRecord {
            repository: RepositoryId::new("cli", "cli"),
            tag_name: tag.to_string(),
            published_at: None,
            prerelease,
            assets: vec![],
        }
    }

    fn releases() -> Vec<ReleaseRecord> {
        vec![
            release("v3.0.0-rc.1", true),
            release("v2.0.0", false),
            release("v1.0.0", false),
        ]
    }

    fn tag(selection: Selection<'_>) -> Option<&str> {
        match selection {
            Selection::Pinned(r) | Selection::Latest(r) => Some(r.tag_name.as_str()),
            _ => None,
        }
    }

    #[rstest]
    #[case(false, Some("v2.0.0"))]
    #[case(true, Some("v3.0.0-rc.1"))]
    fn latest_respects_prerelease_policy(#[case] include: bool, #[case] expected: Option<&str>) {
        let list = releases();
        let selection = select_release(&list, None, include);

        assert!(matches!(selection, Selection::Latest(_)));
        assert_eq!(tag(selection), expected);
    }

    #[rstest]
    #[case("v1.0.0")]
    #[case("1.0.0")]
    #[case(" V1.0.0 ")]
    fn pin_matches_normalized_tag(#[case] pin: &str) {
        let list = releases();
        let selection = select_release(&list, Some(pin), false);

        assert!(matches!(selection, Selection::Pinned(_)));
        assert_eq!(tag(selection), Some("v1.0.0"));
    }

    #[test]
    fn pin_ignores_prerelease_policy() {
        let list = releases();
        let selection = select_release(&list, Some("3.0.0-rc.1"), false);

        assert_eq!(tag(selection), Some("v3.0.0-rc.1"));
    }

    #[test]
    fn missing_pin_is_reported() {
        let list = releases();
        assert_eq!(
            select_release(&list, Some("v9.9.9"), true),
            Selection::PinNotFound
        );
    }

    #[test]
    fn only_prereleases_without_policy_is_not_eligible() {
        let list = vec![release("v1.0.0-beta", true)];
        assert_eq!(
            select_release(&list, None, false),
            Selection::NoEligibleRelease
        );
    }
}
