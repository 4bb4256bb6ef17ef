//! [`CoreGroup`]: the per-core counter group flavour.

use crate::events::core::{CoreEvent, CounterMask, FixedSlot};
use crate::metadata::Metadata;

/// A counter group scheduled onto one CPU core's PMU: exactly four
/// fixed-purpose slots plus `metadata.gp_counters_per_core` general-purpose
/// slots.
///
/// See SPEC_FULL.md §3, "CounterGroup".
#[derive(Clone, Debug, Default)]
pub struct CoreGroup {
    /// Slot 0 = instructions retired, 1 = cpu-cycles, 2 = ref-cycles,
    /// 3 = topdown.slots.
    pub fixed: [Option<CoreEvent>; 4],
    /// General-purpose slots, sized at construction by
    /// `metadata.gp_counters_per_core`.
    pub gp: Vec<Option<CoreEvent>>,
    /// Metric names this group serves, insertion-ordered, deduplicated.
    pub metric_names: Vec<String>,
}

impl CoreGroup {
    /// A group with `gp_slots` empty general-purpose slots and four empty
    /// fixed slots.
    pub fn new(gp_slots: u32) -> CoreGroup {
        CoreGroup {
            fixed: [None, None, None, None],
            gp: vec![None; gp_slots as usize],
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

    /// The raw encodings currently scheduled in this group, in slot order
    /// (fixed first, then GP).
    pub fn raw_encodings(&self) -> Vec<&str> {
        self.fixed
            .iter()
            .chain(self.gp.iter())
            .filter_map(|slot| slot.as_ref())
            .map(|e| e.raw_encoding.as_str())
            .collect()
    }

    /// Every event currently scheduled in this group, fixed slots first.
    pub fn events(&self) -> impl Iterator<Item = &CoreEvent> {
        self.fixed.iter().chain(self.gp.iter()).filter_map(|slot| slot.as_ref())
    }

    fn contains_raw_encoding(&self, raw_encoding: &str) -> bool {
        self.fixed
            .iter()
            .chain(self.gp.iter())
            .filter_map(|slot| slot.as_ref())
            .any(|e| e.raw_encoding == raw_encoding)
    }

    /// Attempt to place `event` into this group, per SPEC_FULL.md §4.4's
    /// "CoreGroup add-event" rule. Returns `true` on success.
    pub fn try_add(&mut self, event: &CoreEvent, metadata: &Metadata) -> bool {
        if self.contains_raw_encoding(&event.raw_encoding) {
            return false;
        }
        if let Some(slot) = event.fixed_slot {
            if metadata.capabilities.contains(slot.required_capability())
                && self.fixed[slot.index()].is_none()
            {
                self.fixed[slot.index()] = Some(event.clone());
                return true;
            }
            return false;
        }
        for (index, gp_slot) in self.gp.iter_mut().enumerate() {
            if gp_slot.is_none() && event.eligible_mask.admits(index as u32) {
                *gp_slot = Some(event.clone());
                return true;
            }
        }
        false
    }

    /// Whether every occupied slot holds an event admissible into that
    /// slot under `metadata` (P1).
    pub fn is_valid(&self, metadata: &Metadata) -> bool {
        for (index, slot) in self.fixed.iter().enumerate() {
            if let Some(event) = slot {
                let expected = match event.fixed_slot {
                    Some(s) if s.index() == index => s,
                    _ => return false,
                };
                if !metadata.capabilities.contains(expected.required_capability()) {
                    return false;
                }
            }
        }
        for (index, slot) in self.gp.iter().enumerate() {
            if let Some(event) = slot {
                if event.fixed_slot.is_some() || !event.eligible_mask.admits(index as u32) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether this event's fixed slot (if any) can still be added, or a GP
    /// slot is available, without yet mutating the group — used by merge.
    pub fn can_accept(&self, event: &CoreEvent, metadata: &Metadata) -> bool {
        if self.contains_raw_encoding(&event.raw_encoding) {
            return false;
        }
        if let Some(slot) = event.fixed_slot {
            return metadata.capabilities.contains(slot.required_capability())
                && self.fixed[slot.index()].is_none();
        }
        self.gp
            .iter()
            .enumerate()
            .any(|(i, s)| s.is_none() && event.eligible_mask.admits(i as u32))
    }

    /// Whether this group has no scheduled events at all.
    pub fn is_empty(&self) -> bool {
        self.fixed.iter().all(Option::is_none) && self.gp.iter().all(Option::is_none)
    }

    /// This group's event set, as the multiset of raw encodings used for
    /// subset comparisons in dedup (P3).
    pub fn encoding_set(&self) -> std::collections::BTreeSet<String> {
        self.raw_encodings().into_iter().map(str::to_string).collect()
    }
}

/// The four well-known fixed slot semantics, in slot-index order, used by
/// diagnostics and tests.
pub const FIXED_SLOT_ORDER: [FixedSlot; 4] = [
    FixedSlot::InstructionsRetired,
    FixedSlot::CpuCycles,
    FixedSlot::RefCycles,
    FixedSlot::TopdownSlots,
];
