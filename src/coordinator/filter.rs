//! Ordered glob include/exclude filtering of asset names
//!
//! Patterns are evaluated in list order and the last matching pattern
//! decides: a plain pattern keeps the asset, a `!`-prefixed one drops it.
//! When the list has no include pattern at all, every asset starts out kept.

use glob::{Pattern, PatternError};

use crate::release::AssetRecord;

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    exclude: bool,
}

#[derive(Debug, Clone)]
pub struct AssetFilter {
    rules: Vec<Rule>,
    include_by_default: bool,
}

impl AssetFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let rules = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref().trim();
                let (body, exclude) = match raw.strip_prefix('!') {
                    Some(body) => (body, true),
                    None => (raw, false),
                };
                Ok(Rule {
                    pattern: Pattern::new(body)?,
                    exclude,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        let include_by_default = rules.iter().all(|r| r.exclude);

        Ok(Self {
            rules,
            include_by_default,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.rules
            .iter()
            .fold(self.include_by_default, |kept, rule| {
                if rule.pattern.matches(name) {
                    !rule.exclude
                } else {
                    kept
                }
            })
    }

    /// Assets to download, in release order
    pub fn apply<'a>(&self, assets: &'a [AssetRecord]) -> Vec<&'a AssetRecord> {
        assets.iter().filter(|a| self.matches(&a.name)).collect()
    }
}
