//! The group packer (C4): bin-packs the events a compiled metric needs
//! into counter groups that respect the active platform's hardware
//! constraints, then deduplicates and merges groups to minimize
//! time-multiplexing.
//!
//! [`pack`] is the entry point. It walks every surviving
//! [`crate::catalog::MetricDefinition`] in catalog order, assigning its
//! events to whichever counter group flavour they belong to
//! ([`core_group::CoreGroup`], [`uncore_group::UncoreGroup`],
//! [`other_group::OtherGroup`]), then runs dedup, merge-to-fixpoint, the
//! ARM-only small-group merge, and uncore per-device expansion, in that
//! order (SPEC_FULL.md §4.4).

pub mod core_group;
pub mod other_group;
pub mod uncore_group;

#[cfg(test)]
mod proptests;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::catalog::loader::CatalogFlavour;
use crate::catalog::MetricDefinition;
use crate::events::constants::Constant;
use crate::events::core::CoreEvent;
use crate::events::uncore::UncoreEvent;
use crate::events::{Event, Registry};
use crate::metadata::Metadata;

pub use core_group::CoreGroup;
pub use other_group::OtherGroup;
pub use uncore_group::UncoreGroup;

/// A packing-phase defect. SPEC_FULL.md §7 classifies "event admissible
/// nowhere" as non-fatal (the owning metric is dropped with a
/// `log::warn!`, see [`pack`]'s `dropped_metrics` output); this type exists
/// for the one condition that *is* a bug if it ever fires: a group that
/// violates its own invariants after packing completes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PackError {
    /// A produced group violates the eligibility/uniqueness invariants from
    /// SPEC_FULL.md §3's "Invariants" (P1/P2). Packing only reaches this
    /// state if one of [`CoreGroup::try_add`] / [`UncoreGroup::try_add`]
    /// has a bug, since every caller in this module routes through them.
    #[error("group invariant violated after packing: {detail}")]
    InvariantViolated {
        /// Human-readable description of which invariant and where.
        detail: String,
    },
}

/// The externalised form of one counter group: an ordered list of (raw
/// encoding, event name) pairs, in the exact order the group's slots were
/// filled. This is both what gets emitted to the counter-reading tool's
/// `-e` argument (outside this crate's scope, see SPEC_FULL.md §6) and the
/// schedule [`crate::frame`] aligns observations against.
///
/// The event name recorded here is whatever name the compiled formula's
/// variables reference for this event: a fixed counter's tool-native name
/// (SPEC_FULL.md §4.3 step (c)), an uncore event's short `UniqueID` (step
/// (i)), or an "other" event's bare name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupDefinition {
    /// (raw_encoding, event_name) pairs, in schedule order.
    pub events: Vec<(String, String)>,
}

impl CoreGroup {
    /// This group's externalised schedule, fixed slots first. Fixed-counter
    /// events are named by their tool-native translation when one exists
    /// (SPEC_FULL.md §4.3 step (c)); every other event keeps its catalog
    /// name.
    pub fn to_definition(&self) -> GroupDefinition {
        GroupDefinition {
            events: self
                .events()
                .map(|e| {
                    let name = crate::events::core::fixed_counter_translation(&e.name)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.name.clone());
                    (e.raw_encoding.clone(), name)
                })
                .collect(),
        }
    }
}

impl UncoreGroup {
    /// This group's externalised schedule: every event is named by its
    /// short `UniqueID`, matching step (i)'s abbreviation.
    pub fn to_definition(&self) -> GroupDefinition {
        GroupDefinition {
            events: self
                .events()
                .map(|e| (e.raw_encoding.clone(), e.unique_id.clone()))
                .collect(),
        }
    }
}

impl OtherGroup {
    /// This group's (single-event) externalised schedule.
    pub fn to_definition(&self) -> GroupDefinition {
        GroupDefinition {
            events: vec![(self.event.name.clone(), self.event.name.clone())],
        }
    }
}

/// Every group list [`pack`] produces, plus the metric names dropped along
/// the way because no counter group could ever admit one of their events.
#[derive(Clone, Debug, Default)]
pub struct PackedGroups {
    pub core: Vec<CoreGroup>,
    pub uncore: Vec<UncoreGroup>,
    pub other: Vec<OtherGroup>,
    /// Metric names excluded because one of their events resolved to no
    /// registry entry, or was admissible in no counter group on this
    /// platform (SPEC_FULL.md §4.4, "Uncollectable-event handling", and
    /// §7's "Packing errors").
    pub dropped_metrics: Vec<String>,
}

impl PackedGroups {
    /// The flattened, ordered schedule every group in this set emits: core
    /// groups, then uncore groups (already expanded per-device), then
    /// other groups. [`crate::frame`] aligns observations against exactly
    /// this order.
    pub fn group_definitions(&self) -> Vec<GroupDefinition> {
        self.core
            .iter()
            .map(CoreGroup::to_definition)
            .chain(self.uncore.iter().map(UncoreGroup::to_definition))
            .chain(self.other.iter().map(OtherGroup::to_definition))
            .collect()
    }
}

/// Pack every surviving metric's events into counter groups.
///
/// `metrics` should already have been filtered by the loader so that every
/// referenced event is collectable on `metadata` (SPEC_FULL.md §4.1); this
/// function additionally drops any metric whose event is admissible in no
/// counter group at all, which can only be detected once actual slot
/// geometry (eligibility masks, fixed-slot capabilities) is considered.
pub fn pack(
    metrics: &[MetricDefinition],
    registry: &Registry,
    metadata: &Metadata,
    uncore_unique_ids: &BTreeMap<String, String>,
    flavour: CatalogFlavour,
) -> Result<PackedGroups, PackError> {
    let mut finished_core: Vec<CoreGroup> = Vec::new();
    let mut finished_uncore: Vec<UncoreGroup> = Vec::new();
    let mut other: Vec<OtherGroup> = Vec::new();
    let mut current_core: Option<CoreGroup> = None;
    let mut current_uncore: Option<UncoreGroup> = None;
    let mut dropped_metrics: Vec<String> = Vec::new();

    for metric in metrics {
        let mut events = Vec::new();
        let mut uncollectable = false;
        for var in metric.referenced_events() {
            if var.ends_with(":retire_latency") || Constant::from_name(var).is_some() {
                continue;
            }
            match registry.resolve(var, uncore_unique_ids) {
                Some(event) => events.push(event),
                None => {
                    log::warn!(
                        "metric {:?} references event {var:?}, which no registry can place; dropping",
                        metric.name
                    );
                    uncollectable = true;
                    break;
                }
            }
        }
        if uncollectable {
            dropped_metrics.push(metric.name.clone());
            continue;
        }

        let mut unplaceable = false;
        for event in &events {
            match event {
                Event::Core(core_event) => {
                    if !place_core_event(
                        core_event,
                        metadata,
                        &metric.name,
                        &mut current_core,
                        &mut finished_core,
                    ) {
                        unplaceable = true;
                        break;
                    }
                }
                Event::Uncore(uncore_event) => {
                    if !place_uncore_event(
                        uncore_event,
                        metadata,
                        &metric.name,
                        &mut current_uncore,
                        &mut finished_uncore,
                    ) {
                        unplaceable = true;
                        break;
                    }
                }
                Event::Other(other_event) => {
                    let mut group = OtherGroup::new(other_event.clone());
                    group.record_metric(&metric.name);
                    other.push(group);
                }
            }
        }
        if unplaceable {
            log::warn!(
                "metric {:?} references an event admissible in no counter group on this platform; dropping",
                metric.name
            );
            dropped_metrics.push(metric.name.clone());
        }
    }

    if let Some(g) = current_core.take() {
        if !g.is_empty() {
            finished_core.push(g);
        }
    }
    if let Some(g) = current_uncore.take() {
        if !g.is_empty() {
            finished_uncore.push(g);
        }
    }

    let core = merge_to_fixpoint(dedup_core(finished_core), metadata);
    let core = if flavour == CatalogFlavour::ArmComponent {
        merge_small_groups_arm(core, metadata)
    } else {
        core
    };
    let uncore = merge_uncore_to_fixpoint(dedup_uncore(finished_uncore));
    let uncore: Vec<UncoreGroup> = uncore
        .into_iter()
        .flat_map(|g| g.expand_per_device(metadata))
        .collect();

    for group in &core {
        if !group.is_valid(metadata) {
            return Err(PackError::InvariantViolated {
                detail: "core group has an event in a slot it isn't eligible for".to_string(),
            });
        }
    }
    for group in &uncore {
        if !group.is_valid() {
            return Err(PackError::InvariantViolated {
                detail: "uncore group mixes unit classes or duplicates a raw encoding".to_string(),
            });
        }
    }

    Ok(PackedGroups {
        core,
        uncore,
        other,
        dropped_metrics,
    })
}

/// Try to place `event` into `current`, opening one or more new groups as
/// needed. Returns `false` if a brand-new, empty group still can't hold the
/// event (it's admissible nowhere on this platform).
fn place_core_event(
    event: &CoreEvent,
    metadata: &Metadata,
    metric_name: &str,
    current: &mut Option<CoreGroup>,
    finished: &mut Vec<CoreGroup>,
) -> bool {
    if current.is_none() {
        *current = Some(CoreGroup::new(metadata.gp_counters_per_core));
    }
    if current.as_mut().unwrap().try_add(event, metadata) {
        current.as_mut().unwrap().record_metric(metric_name);
        return true;
    }
    let mut fresh = CoreGroup::new(metadata.gp_counters_per_core);
    if !fresh.try_add(event, metadata) {
        return false;
    }
    if let Some(full) = current.take() {
        finished.push(full);
    }
    fresh.record_metric(metric_name);
    *current = Some(fresh);
    true
}

/// Uncore groups are sized by the same general-purpose slot budget as core
/// groups; metadata exposes no separate per-device counter count.
fn place_uncore_event(
    event: &UncoreEvent,
    metadata: &Metadata,
    metric_name: &str,
    current: &mut Option<UncoreGroup>,
    finished: &mut Vec<UncoreGroup>,
) -> bool {
    if current.is_none() {
        *current = Some(UncoreGroup::new(metadata.gp_counters_per_core));
    }
    if current.as_mut().unwrap().try_add(event) {
        current.as_mut().unwrap().record_metric(metric_name);
        return true;
    }
    let mut fresh = UncoreGroup::new(metadata.gp_counters_per_core);
    if !fresh.try_add(event) {
        return false;
    }
    if let Some(full) = current.take() {
        finished.push(full);
    }
    fresh.record_metric(metric_name);
    *current = Some(fresh);
    true
}

/// Drop any group whose event set is a (non-strict) subset of another's,
/// folding the dropped group's served metric names into the survivor (P3).
fn dedup_core(groups: Vec<CoreGroup>) -> Vec<CoreGroup> {
    let mut kept: Vec<CoreGroup> = Vec::new();
    for group in groups {
        let set = group.encoding_set();
        if let Some(idx) = kept.iter().position(|k| set.is_subset(&k.encoding_set())) {
            for name in &group.metric_names {
                kept[idx].record_metric(name);
            }
            continue;
        }
        let mut absorbed = Vec::new();
        kept.retain(|k| {
            if k.encoding_set().is_subset(&set) {
                absorbed.extend(k.metric_names.clone());
                false
            } else {
                true
            }
        });
        let mut group = group;
        for name in absorbed {
            group.record_metric(&name);
        }
        kept.push(group);
    }
    kept
}

fn dedup_uncore(groups: Vec<UncoreGroup>) -> Vec<UncoreGroup> {
    let mut kept: Vec<UncoreGroup> = Vec::new();
    for group in groups {
        let set = group.encoding_set();
        if let Some(idx) = kept.iter().position(|k| set.is_subset(&k.encoding_set())) {
            for name in &group.metric_names {
                kept[idx].record_metric(name);
            }
            continue;
        }
        let mut absorbed = Vec::new();
        kept.retain(|k| {
            if k.encoding_set().is_subset(&set) {
                absorbed.extend(k.metric_names.clone());
                false
            } else {
                true
            }
        });
        let mut group = group;
        for name in absorbed {
            group.record_metric(&name);
        }
        kept.push(group);
    }
    kept
}

/// Merge `b`'s events into a clone of `a`, treating an event `b` holds that
/// `a` already has (duplicate raw encoding) as already satisfied rather than
/// a placement conflict. Returns `None` if some event of `b` genuinely can't
/// fit in `a`.
fn try_merge_core(a: &CoreGroup, b: &CoreGroup, metadata: &Metadata) -> Option<CoreGroup> {
    let mut merged = a.clone();
    for event in b.events() {
        if merged.encoding_set().contains(&event.raw_encoding) {
            continue;
        }
        if !merged.try_add(event, metadata) {
            return None;
        }
    }
    for name in &b.metric_names {
        merged.record_metric(name);
    }
    Some(merged)
}

fn try_merge_uncore(a: &UncoreGroup, b: &UncoreGroup) -> Option<UncoreGroup> {
    let mut merged = a.clone();
    for event in b.events() {
        if merged.encoding_set().contains(&event.raw_encoding) {
            continue;
        }
        if !merged.try_add(event) {
            return None;
        }
    }
    for name in &b.metric_names {
        merged.record_metric(name);
    }
    Some(merged)
}

/// Repeatedly merge any two groups where the second can be folded entirely
/// into the first, until no further merge is possible (SPEC_FULL.md §4.4,
/// "Merging"). Only tries `(i, j)` with `i < j` folded into `i`; pair order
/// in the input is otherwise preserved.
fn merge_to_fixpoint(mut groups: Vec<CoreGroup>, metadata: &Metadata) -> Vec<CoreGroup> {
    loop {
        let mut merged_any = false;
        'outer: for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if let Some(merged) = try_merge_core(&groups[i], &groups[j], metadata) {
                    groups[i] = merged;
                    groups.remove(j);
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            return groups;
        }
    }
}

/// The architected cycle-counter event every ARM component catalog uses to
/// compute IPC-style metrics. It's an ordinary GP-eligible event in the
/// catalog data (no dedicated fixed slot the way x86 models cpu-cycles),
/// but the small-group merge budget excludes it by name regardless (
/// SPEC_FULL.md §4.4, "Small-group merge").
const ARM_CYCLES_EVENT: &str = "CPU_CYCLES";

/// A group's size for small-group-merge budgeting purposes: its event count
/// excluding [`ARM_CYCLES_EVENT`].
fn budgeted_size(group: &CoreGroup) -> usize {
    group.events().filter(|e| e.name != ARM_CYCLES_EVENT).count()
}

/// Merge `b`'s events into a clone of `a`, deduplicating by event *name*
/// rather than raw encoding: ARM component catalogs sometimes reference the
/// same architected event under more than one `RawEncoding` spelling, and
/// the small-group merge's budget is itself name-based (SPEC_FULL.md §4.4,
/// "Small-group merge"). Returns `None` if some event of `b` genuinely
/// can't be physically placed in `a`.
fn try_merge_dedup_by_name(a: &CoreGroup, b: &CoreGroup, metadata: &Metadata) -> Option<CoreGroup> {
    let mut merged = a.clone();
    for event in b.events() {
        if merged.events().any(|existing| existing.name == event.name) {
            continue;
        }
        if !merged.try_add(event, metadata) {
            return None;
        }
    }
    for name in &b.metric_names {
        merged.record_metric(name);
    }
    Some(merged)
}

/// The ARM/component small-group merge (SPEC_FULL.md §4.4, "Small-group
/// merge (ARM/component path)"): groups are sorted small-first, then
/// walked in that order, accumulating each into the group in progress as
/// long as the combined budgeted size still fits the GP budget and the
/// merge is physically placeable; once neither holds, the accumulated
/// group is closed off and a new one starts from the next group. This
/// greedily forms the smallest budget-fitting prefix at each step, rather
/// than searching every already-closed group for room.
fn merge_small_groups_arm(mut groups: Vec<CoreGroup>, metadata: &Metadata) -> Vec<CoreGroup> {
    let budget = metadata.gp_counters_per_core as usize;
    groups.sort_by_key(budgeted_size);

    let mut groups = groups.into_iter();
    let mut result = Vec::new();
    let Some(mut current) = groups.next() else {
        return result;
    };
    let mut current_size = budgeted_size(&current);

    for next in groups {
        let next_size = budgeted_size(&next);
        if current_size + next_size <= budget {
            if let Some(combined) = try_merge_dedup_by_name(&current, &next, metadata) {
                current_size = budgeted_size(&combined);
                current = combined;
                continue;
            }
        }
        result.push(current);
        current = next;
        current_size = next_size;
    }
    result.push(current);
    result
}

fn merge_uncore_to_fixpoint(mut groups: Vec<UncoreGroup>) -> Vec<UncoreGroup> {
    loop {
        let mut merged_any = false;
        'outer: for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if let Some(merged) = try_merge_uncore(&groups[i], &groups[j]) {
                    groups[i] = merged;
                    groups.remove(j);
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            return groups;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::core::{CounterMask, FixedSlot};
    use crate::metadata::synthetic_x86;

    fn gp_event(name: &str, raw: &str) -> CoreEvent {
        CoreEvent {
            name: name.to_string(),
            raw_encoding: raw.to_string(),
            eligible_mask: CounterMask::first_n(4),
            fixed_slot: None,
            modifier: None,
        }
    }

    fn fixed_event(slot: FixedSlot, raw: &str) -> CoreEvent {
        CoreEvent {
            name: format!("fixed{}", slot.index()),
            raw_encoding: raw.to_string(),
            eligible_mask: CounterMask::empty(),
            fixed_slot: Some(slot),
            modifier: None,
        }
    }

    fn cha_event(name: &str, raw: &str) -> UncoreEvent {
        UncoreEvent {
            name: name.to_string(),
            raw_encoding: raw.to_string(),
            unit: "cha".to_string(),
            unique_id: format!("{name}_ID"),
        }
    }

    #[test]
    fn dedup_drops_strict_subset_group_and_keeps_its_metrics() {
        let metadata = synthetic_x86();
        let mut big = CoreGroup::new(4);
        big.try_add(&gp_event("A", "event=0x1"), &metadata);
        big.try_add(&gp_event("B", "event=0x2"), &metadata);
        big.record_metric("metric_big");

        let mut small = CoreGroup::new(4);
        small.try_add(&gp_event("A", "event=0x1"), &metadata);
        small.record_metric("metric_small");

        let deduped = dedup_core(vec![big, small]);
        assert_eq!(deduped.len(), 1);
        assert!(deduped[0].metric_names.contains(&"metric_big".to_string()));
        assert!(deduped[0].metric_names.contains(&"metric_small".to_string()));
    }

    #[test]
    fn merge_to_fixpoint_combines_groups_that_fit_together() {
        let metadata = synthetic_x86();
        let mut a = CoreGroup::new(4);
        a.try_add(&gp_event("A", "event=0x1"), &metadata);
        a.try_add(&gp_event("B", "event=0x2"), &metadata);
        a.record_metric("metric_a");

        let mut b = CoreGroup::new(4);
        b.try_add(&gp_event("C", "event=0x3"), &metadata);
        b.record_metric("metric_b");

        let merged = merge_to_fixpoint(vec![a, b], &metadata);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].raw_encodings().len(), 3);
    }

    #[test]
    fn merge_to_fixpoint_leaves_incompatible_groups_separate() {
        let metadata = synthetic_x86();
        let mut a = CoreGroup::new(2);
        a.try_add(&gp_event("A", "event=0x1"), &metadata);
        a.try_add(&gp_event("B", "event=0x2"), &metadata);
        a.record_metric("metric_a");

        let mut b = CoreGroup::new(2);
        b.try_add(&gp_event("C", "event=0x3"), &metadata);
        b.try_add(&gp_event("D", "event=0x4"), &metadata);
        b.record_metric("metric_b");

        let merged = merge_to_fixpoint(vec![a, b], &metadata);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_preserves_duplicate_fixed_slot_as_already_satisfied() {
        let metadata = synthetic_x86();
        let mut a = CoreGroup::new(4);
        a.try_add(&fixed_event(FixedSlot::CpuCycles, "event=0x3c"), &metadata);
        a.record_metric("metric_a");

        let mut b = CoreGroup::new(4);
        b.try_add(&fixed_event(FixedSlot::CpuCycles, "event=0x3c"), &metadata);
        b.record_metric("metric_b");

        let merged = try_merge_core(&a, &b, &metadata).expect("duplicate fixed event should merge");
        assert_eq!(merged.raw_encodings().len(), 1);
        assert_eq!(merged.metric_names.len(), 2);
    }

    #[test]
    fn small_group_merge_excludes_cpu_cycles_from_the_budget() {
        let metadata = synthetic_x86(); // gp_counters_per_core: 4
        // Three groups, each pairing a distinct event with its own copy of
        // CPU_CYCLES (every ARM ratio metric references it). If CPU_CYCLES
        // counted toward the merge budget like any other event, each
        // group's size would be double-counted on every step (2, then 4,
        // then 6), and the third merge would be refused at a 4-slot
        // budget even though deduplicating the repeated CPU_CYCLES by name
        // leaves a free physical slot the whole way through. Excluding it
        // from the budget lets all three combine into one group.
        let mut a = CoreGroup::new(4);
        a.try_add(&gp_event("CPU_CYCLES", "event=0x11"), &metadata);
        a.try_add(&gp_event("A", "event=0x1"), &metadata);
        a.record_metric("metric_a");

        let mut b = CoreGroup::new(4);
        b.try_add(&gp_event("CPU_CYCLES", "event=0x11"), &metadata);
        b.try_add(&gp_event("B", "event=0x2"), &metadata);
        b.record_metric("metric_b");

        let mut c = CoreGroup::new(4);
        c.try_add(&gp_event("CPU_CYCLES", "event=0x11"), &metadata);
        c.try_add(&gp_event("C", "event=0x3"), &metadata);
        c.record_metric("metric_c");

        let merged = merge_small_groups_arm(vec![a, b, c], &metadata);
        assert_eq!(merged.len(), 1, "shared CPU_CYCLES should dedup rather than exhaust the GP budget");
        assert_eq!(merged[0].raw_encodings().len(), 4, "one CPU_CYCLES slot plus A, B, C");
        assert_eq!(merged[0].metric_names.len(), 3);
    }

    #[test]
    fn small_group_merge_sorts_small_first_and_fills_the_budget_greedily() {
        let metadata = synthetic_x86(); // gp_counters_per_core: 4
        // A 3-event group can't absorb anything else at a 4-slot budget,
        // but two 1-event groups should combine with each other.
        let mut triple = CoreGroup::new(4);
        triple.try_add(&gp_event("A", "event=0x1"), &metadata);
        triple.try_add(&gp_event("B", "event=0x2"), &metadata);
        triple.try_add(&gp_event("C", "event=0x3"), &metadata);
        triple.record_metric("metric_triple");

        let mut single_d = CoreGroup::new(4);
        single_d.try_add(&gp_event("D", "event=0x4"), &metadata);
        single_d.record_metric("metric_d");

        let mut single_e = CoreGroup::new(4);
        single_e.try_add(&gp_event("E", "event=0x5"), &metadata);
        single_e.record_metric("metric_e");

        let merged = merge_small_groups_arm(vec![triple, single_d, single_e], &metadata);
        assert_eq!(merged.len(), 2, "the two singles should merge together, leaving the triple alone");
        assert!(merged.iter().any(|g| g.raw_encodings().len() == 3 && g.metric_names.contains(&"metric_triple".to_string())));
        assert!(merged.iter().any(|g| g.raw_encodings().len() == 2
            && g.metric_names.contains(&"metric_d".to_string())
            && g.metric_names.contains(&"metric_e".to_string())));
    }

    #[test]
    fn uncore_merge_respects_unit_class() {
        let mut cha = UncoreGroup::new(4);
        cha.try_add(&cha_event("A", "event=0x1"));
        cha.record_metric("metric_a");

        let mut imc = UncoreGroup::new(4);
        let mut imc_event = cha_event("B", "event=0x2");
        imc_event.unit = "imc".to_string();
        imc.try_add(&imc_event);
        imc.record_metric("metric_b");

        let merged = merge_uncore_to_fixpoint(vec![cha, imc]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn core_group_definition_translates_fixed_counter_names() {
        let metadata = synthetic_x86();
        let mut group = CoreGroup::new(4);
        group.try_add(&fixed_event(FixedSlot::CpuCycles, "event=0x3c"), &metadata);
        let def = group.to_definition();
        assert_eq!(def.events, vec![("event=0x3c".to_string(), "cpu-cycles".to_string())]);
    }

    #[test]
    fn uncore_group_definition_uses_unique_id() {
        let mut group = UncoreGroup::new(4);
        group.try_add(&cha_event("UNC_CHA_CLOCKTICKS", "event=0x00"));
        let def = group.to_definition();
        assert_eq!(def.events, vec![("event=0x00".to_string(), "UNC_CHA_CLOCKTICKS_ID".to_string())]);
    }
}
