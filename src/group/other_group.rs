//! [`OtherGroup`]: the trivial one-event-per-group flavour for bare
//! platform counters.

use crate::events::other::OtherEvent;

/// A group holding exactly one bare platform counter (power/RAPL, cstate
/// residency, ...). No packing rule applies: every such event gets its own
/// group.
///
/// See SPEC_FULL.md §3, "CounterGroup".
#[derive(Clone, Debug)]
pub struct OtherGroup {
    /// The single event this group schedules.
    pub event: OtherEvent,
    /// Metric names this group serves, insertion-ordered, deduplicated.
    pub metric_names: Vec<String>,
}

impl OtherGroup {
    /// A fresh group wrapping `event`, initially serving no metrics.
    pub fn new(event: OtherEvent) -> OtherGroup {
        OtherGroup {
            event,
            metric_names: Vec::new(),
        }
    }

    /// Record `metric_name` as served by this group, if not already
    /// present.
    pub fn record_metric(&mut self, metric_name: &str) {
        if !self.metric_names.iter().any(|m| m == metric_name) {
            self.metric_names.push(metric_name.to_string());
        }
    }
}
