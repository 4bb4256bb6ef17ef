//! [`UncoreGroup`]: the device-level counter group flavour.

use crate::events::uncore::UncoreEvent;
use crate::metadata::Metadata;

/// A counter group scheduled onto one uncore device-class PMU: N
/// general-purpose slots, all holding events of the same unit class.
///
/// See SPEC_FULL.md §3, "CounterGroup", and §4.4, "UncoreGroup add-event".
#[derive(Clone, Debug, Default)]
pub struct UncoreGroup {
    /// General-purpose slots.
    pub gp: Vec<Option<UncoreEvent>>,
    /// The unit class shared by every non-empty slot, set by the first
    /// event placed.
    pub unit: Option<String>,
    /// Metric names this group serves, insertion-ordered, deduplicated.
    pub metric_names: Vec<String>,
}

impl UncoreGroup {
    /// A group with `gp_slots` empty general-purpose slots and no unit
    /// class yet assigned.
    pub fn new(gp_slots: u32) -> UncoreGroup {
        UncoreGroup {
            gp: vec![None; gp_slots as usize],
            unit: None,
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

    /// Every event currently scheduled in this group, slot order.
    pub fn events(&self) -> impl Iterator<Item = &UncoreEvent> {
        self.gp.iter().filter_map(|slot| slot.as_ref())
    }

    fn contains_raw_encoding(&self, raw_encoding: &str) -> bool {
        self.gp
            .iter()
            .filter_map(|slot| slot.as_ref())
            .any(|e| e.raw_encoding == raw_encoding)
    }

    /// Attempt to place `event` into this group. Rejects on unit mismatch,
    /// duplicate raw encoding, or slot exhaustion.
    pub fn try_add(&mut self, event: &UncoreEvent) -> bool {
        if self.contains_raw_encoding(&event.raw_encoding) {
            return false;
        }
        if let Some(unit) = &self.unit {
            if unit != &event.unit {
                return false;
            }
        }
        for slot in self.gp.iter_mut() {
            if slot.is_none() {
                *slot = Some(event.clone());
                self.unit.get_or_insert_with(|| event.unit.clone());
                return true;
            }
        }
        false
    }

    /// Whether this event could still be added without mutating the group.
    pub fn can_accept(&self, event: &UncoreEvent) -> bool {
        if self.contains_raw_encoding(&event.raw_encoding) {
            return false;
        }
        if let Some(unit) = &self.unit {
            if unit != &event.unit {
                return false;
            }
        }
        self.gp.iter().any(Option::is_none)
    }

    /// Whether this group has no scheduled events at all.
    pub fn is_empty(&self) -> bool {
        self.gp.iter().all(Option::is_none)
    }

    /// This group's event set, as the multiset of raw encodings, used for
    /// subset comparisons in dedup (P3).
    pub fn encoding_set(&self) -> std::collections::BTreeSet<String> {
        self.gp
            .iter()
            .filter_map(|s| s.as_ref())
            .map(|e| e.raw_encoding.clone())
            .collect()
    }

    /// Whether every non-empty slot shares this group's unit class and no
    /// raw encoding repeats (P2).
    pub fn is_valid(&self) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        for slot in self.gp.iter().flatten() {
            if let Some(unit) = &self.unit {
                if &slot.unit != unit {
                    return false;
                }
            }
            if !seen.insert(slot.raw_encoding.clone()) {
                return false;
            }
        }
        true
    }

    /// Expand this group into one group per device ID present for its unit
    /// class, rewriting each event's raw encoding to target that instance
    /// (SPEC_FULL.md §4.4, "Uncore expansion").
    pub fn expand_per_device(&self, metadata: &Metadata) -> Vec<UncoreGroup> {
        let Some(unit) = &self.unit else {
            return vec![self.clone()];
        };
        let device_ids = metadata
            .uncore_device_ids
            .get(unit)
            .cloned()
            .unwrap_or_default();
        if device_ids.is_empty() {
            return vec![self.clone()];
        }
        let mut sorted_ids = device_ids;
        sorted_ids.sort_unstable();
        sorted_ids
            .into_iter()
            .map(|device_id| UncoreGroup {
                gp: self
                    .gp
                    .iter()
                    .map(|slot| slot.as_ref().map(|e| e.for_device(device_id)))
                    .collect(),
                unit: self.unit.clone(),
                metric_names: self.metric_names.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::synthetic_x86;

    fn cha_event(name: &str, raw: &str) -> UncoreEvent {
        UncoreEvent {
            name: name.to_string(),
            raw_encoding: raw.to_string(),
            unit: "cha".to_string(),
            unique_id: format!("{name}_ID"),
        }
    }

    #[test]
    fn first_event_sets_unit_class() {
        let mut group = UncoreGroup::new(4);
        assert!(group.try_add(&cha_event("A", "event=0x1")));
        assert_eq!(group.unit.as_deref(), Some("cha"));
    }

    #[test]
    fn mismatched_unit_is_rejected() {
        let mut group = UncoreGroup::new(4);
        assert!(group.try_add(&cha_event("A", "event=0x1")));
        let mut imc_event = cha_event("B", "event=0x2");
        imc_event.unit = "imc".to_string();
        assert!(!group.try_add(&imc_event));
    }

    #[test]
    fn expand_per_device_pins_ids_in_sorted_order() {
        let metadata = synthetic_x86();
        let mut group = UncoreGroup::new(4);
        group.try_add(&cha_event("A", "event=0x1"));
        let expanded = group.expand_per_device(&metadata);
        assert_eq!(expanded.len(), 4);
        for (index, instance) in expanded.iter().enumerate() {
            let encoding = instance.gp[0].as_ref().unwrap().raw_encoding.clone();
            assert!(encoding.contains(&format!("device={index}")));
        }
    }
}
