//! Snapshots of the configured rule list.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::validation::rule::ValidationRule;

/// Supplies the ordered rule list. Implementations publish new lists as
/// whole snapshots; readers never see a partially updated list.
pub trait ValidationRuleSource: Send + Sync {
    fn current_rules(&self) -> Arc<Vec<ValidationRule>>;
}

/// Rule source fed from configuration, swapped atomically on reload.
#[derive(Debug)]
pub struct RuleStore {
    rules: ArcSwap<Vec<ValidationRule>>,
}

impl RuleStore {
    pub fn new(rules: Vec<ValidationRule>) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    /// Replace the whole rule list.
    pub fn publish(&self, rules: Vec<ValidationRule>) {
        tracing::info!(count = rules.len(), "Publishing validation rules");
        self.rules.store(Arc::new(rules));
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ValidationRuleSource for RuleStore {
    fn current_rules(&self) -> Arc<Vec<ValidationRule>> {
        self.rules.load_full()
    }
}
