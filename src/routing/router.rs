//! Route-class lookup.
//!
//! # Responsibilities
//! - Store compiled route-class prefixes
//! - Resolve a request path to its route class
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Most specific (longest) prefix wins
//! - Unmatched paths fall back to `DEFAULT_ROUTE_CLASS`

use crate::config::RouteClassConfig;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// Class used for paths no configured prefix covers.
pub const DEFAULT_ROUTE_CLASS: &str = "default";

#[derive(Debug)]
struct CompiledRoute {
    class: String,
    matcher: PathPrefixMatcher,
}

/// Resolves paths to route classes.
#[derive(Debug, Default)]
pub struct RouteClassifier {
    routes: Vec<CompiledRoute>,
}

impl RouteClassifier {
    /// Compile route classes, most specific prefix first.
    pub fn from_config(classes: &[RouteClassConfig]) -> Self {
        let mut routes: Vec<CompiledRoute> = classes
            .iter()
            .flat_map(|class| {
                class.path_prefixes.iter().map(move |prefix| CompiledRoute {
                    class: class.name.clone(),
                    matcher: PathPrefixMatcher::new(prefix.as_str()),
                })
            })
            .collect();

        // Stable sort keeps config order among equally specific prefixes.
        routes.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));
        Self { routes }
    }

    /// Route class for `path`.
    pub fn classify(&self, path: &str) -> &str {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(path))
            .map(|route| route.class.as_str())
            .unwrap_or(DEFAULT_ROUTE_CLASS)
    }
}
