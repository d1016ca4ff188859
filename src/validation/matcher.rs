//! Rule matching logic.
//!
//! # Responsibilities
//! - Find the first rule whose method and URL patterns both match
//! - Compile patterns lazily and keep them compiled
//! - Never fail past the caller on a broken pattern
//!
//! # Design Decisions
//! - Patterns must match the whole value (anchored)
//! - Rule order is significant: first match wins
//! - A pattern that does not compile ends the lookup with no match

use std::sync::Arc;

use axum::http::{Method, Uri};
use dashmap::DashMap;
use regex::Regex;

use crate::validation::rule::ValidationRule;
use crate::validation::source::ValidationRuleSource;

/// Looks up the validation rule for a request.
pub struct RuleMatcher {
    source: Arc<dyn ValidationRuleSource>,
    compiled: DashMap<String, Regex>,
}

impl RuleMatcher {
    pub fn new(source: Arc<dyn ValidationRuleSource>) -> Self {
        Self {
            source,
            compiled: DashMap::new(),
        }
    }

    /// Returns the first rule, in configured order, matching both the
    /// method and the request URI.
    ///
    /// A pattern that does not compile aborts the lookup: the request gets
    /// no rule. URL patterns are only compiled for rules whose method matched.
    pub fn matching_rule(&self, method: &Method, uri: &Uri) -> Option<ValidationRule> {
        let rules = self.source.current_rules();
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        for rule in rules.iter() {
            if !self.compile(&rule.method_pattern)?.is_match(method.as_str()) {
                continue;
            }
            if self.compile(&rule.url_pattern)?.is_match(target) {
                return Some(rule.clone());
            }
        }
        None
    }

    fn compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Some(regex.clone());
        }

        // Check the bare pattern first so that anchoring cannot repair it.
        let anchored = Regex::new(pattern).and_then(|_| Regex::new(&format!("^(?:{})$", pattern)));
        match anchored {
            Ok(regex) => {
                self.compiled.insert(pattern.to_string(), regex.clone());
                Some(regex)
            }
            Err(e) => {
                tracing::error!(pattern = %pattern, error = %e, "Invalid validation rule pattern, no rule applies");
                None
            }
        }
    }
}
