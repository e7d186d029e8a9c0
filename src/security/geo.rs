//! Country-based policy for sensitive routes.
//!
//! Non-sensitive routes are always allowed. On sensitive routes a blocked
//! country is blocked, an explicitly allowed country passes, and everything
//! else (including an unknown or malformed country) is challenged.

use std::collections::HashSet;

use crate::routing::matcher::{Matcher, PathPrefixMatcher};
use crate::security::Verdict;

/// Normalize a country code to two-letter uppercase ISO form.
pub fn normalize_country_code(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() == 2 && trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct GeoPolicy {
    blocked: HashSet<String>,
    allowed: HashSet<String>,
    sensitive: Vec<PathPrefixMatcher>,
}

impl GeoPolicy {
    /// Build from config lists. Entries that do not normalize are skipped;
    /// validation reports them before a policy is ever compiled.
    pub fn new(blocked: &[String], allowed: &[String], sensitive_prefixes: &[String]) -> Self {
        Self {
            blocked: blocked.iter().filter_map(|c| normalize_country_code(c)).collect(),
            allowed: allowed.iter().filter_map(|c| normalize_country_code(c)).collect(),
            sensitive: sensitive_prefixes
                .iter()
                .map(|p| PathPrefixMatcher::new(p.as_str()))
                .collect(),
        }
    }

    pub fn is_sensitive(&self, path: &str) -> bool {
        self.sensitive.iter().any(|m| m.matches(path))
    }

    /// `country` must already be normalized; `None` means unknown.
    pub fn evaluate(&self, path: &str, country: Option<&str>) -> Verdict {
        if !self.is_sensitive(path) {
            return Verdict::Allow;
        }
        match country {
            Some(code) if self.blocked.contains(code) => Verdict::Block,
            Some(code) if self.allowed.contains(code) => Verdict::Allow,
            _ => Verdict::Challenge,
        }
    }
}
