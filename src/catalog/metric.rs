//! [`MetricDefinition`]: the loader's output and the evaluator's input.

use std::sync::atomic::AtomicIsize;

use crate::expr::CompiledExpr;

/// A compiled, catalog-resolved metric, ready to be packed into counter
/// groups (C4) and evaluated per frame (C7).
///
/// See SPEC_FULL.md §3, "MetricDefinition".
#[derive(Debug)]
pub struct MetricDefinition {
    /// User-facing name, with any `metric_` prefix stripped.
    pub name: String,
    /// The catalog key this metric was resolved from (e.g. `metric_CPI`).
    pub legacy_name: String,
    /// One-line description from the catalog.
    pub description: String,
    /// Catalog category (e.g. `"General"`, `"Memory"`).
    pub category: String,
    /// Catalog level (e.g. `"1"`, `"L1"`).
    pub level: String,
    /// The compiled formula. `compiled.variables` is this metric's ordered
    /// set of referenced event placeholders.
    pub compiled: CompiledExpr,
    /// The compiled threshold expression, if the catalog entry had one.
    pub threshold: Option<CompiledExpr>,
    /// Single-assignment cache of the group index this metric's events were
    /// found in, resolved lazily by [`crate::eval`]. `-1` means unresolved.
    pub group_index_cache: AtomicIsize,
}

impl MetricDefinition {
    /// The ordered set of event names this metric's formula references.
    /// After compilation every one of these is either a concrete event name
    /// or an unresolvable name that will evaluate to NaN forever (the
    /// retire-latency-unavailable case, see SPEC_FULL.md §4.1).
    pub fn referenced_events(&self) -> &[String] {
        &self.compiled.variables
    }

    /// Strip a leading `metric_` prefix (case-sensitive, matching the
    /// catalog's own convention) from a legacy catalog key.
    pub fn strip_metric_prefix(legacy_name: &str) -> &str {
        legacy_name.strip_prefix("metric_").unwrap_or(legacy_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_metric_prefix() {
        assert_eq!(MetricDefinition::strip_metric_prefix("metric_CPI"), "CPI");
        assert_eq!(MetricDefinition::strip_metric_prefix("CPI"), "CPI");
    }
}
