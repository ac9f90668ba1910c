//! Request matching logic.
//!
//! Indexes endpoint rules by (method, path) for exact lookup. No trimming,
//! case folding or decoding is applied to either component.

use crate::config::EndpointRule;
use crate::error::ConfigError;
use std::collections::HashMap;

/// Immutable set of endpoint rules keyed by (method, path).
///
/// Built once at startup and shared read-only between request handlers.
#[derive(Debug, Default)]
pub struct EndpointTable {
    /// Rules in configuration order
    rules: Vec<EndpointRule>,
    /// method -> path -> position in `rules`
    index: HashMap<String, HashMap<String, usize>>,
}

impl EndpointTable {
    /// Build the table, rejecting duplicate (method, path) keys.
    pub fn from_rules(rules: Vec<EndpointRule>) -> Result<Self, ConfigError> {
        let mut index: HashMap<String, HashMap<String, usize>> = HashMap::new();

        for (position, rule) in rules.iter().enumerate() {
            let paths = index.entry(rule.method.clone()).or_default();
            if let Some(&first) = paths.get(&rule.path) {
                return Err(duplicate(&rules[first], rule));
            }
            paths.insert(rule.path.clone(), position);
        }

        Ok(Self { rules, index })
    }

    /// Exact lookup on both method and path.
    pub fn find(&self, method: &str, path: &str) -> Option<&EndpointRule> {
        self.index
            .get(method)
            .and_then(|paths| paths.get(path))
            .map(|&position| &self.rules[position])
    }

    /// Lookup used for serving.
    ///
    /// Same as [`find`](Self::find), except that a HEAD request without its own
    /// rule is answered by the GET rule for the same path.
    pub fn resolve(&self, method: &str, path: &str) -> Option<&EndpointRule> {
        self.find(method, path).or_else(|| {
            if method == "HEAD" {
                self.find("GET", path)
            } else {
                None
            }
        })
    }

    /// All rules in configuration order.
    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn duplicate(first: &EndpointRule, repeat: &EndpointRule) -> ConfigError {
    ConfigError::DuplicateEndpoint {
        index: repeat.index,
        first: first.index,
        method: repeat.method.clone(),
        path: repeat.path.clone(),
    }
}
