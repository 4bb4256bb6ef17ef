//! Property tests for the packing invariants (SPEC_FULL.md §8, P1-P4, P7).
//!
//! Strategies build small random pools of GP-only core events (no fixed
//! slots, since those have their own dedicated unit tests) with random raw
//! encodings and eligibility masks, then check that [`pack`]'s output -
//! and repeated application of its dedup/merge helpers - holds the stated
//! invariants regardless of how the pool was shuffled.

use proptest::prelude::*;

use super::*;
use crate::events::core::CounterMask;
use crate::metadata::synthetic_x86;

fn arb_event_pool() -> impl Strategy<Value = Vec<CoreEvent>> {
    proptest::collection::vec(1u32..=0b1111u32, 1..=6).prop_map(|masks| {
        masks
            .into_iter()
            .enumerate()
            .map(|(index, mask_bits)| CoreEvent {
                name: format!("EVENT_{index}"),
                raw_encoding: format!("event=0x{index:02x}"),
                eligible_mask: CounterMask::from_bits_truncate(mask_bits),
                fixed_slot: None,
                modifier: None,
            })
            .collect()
    })
}

fn pack_into_groups(events: &[CoreEvent], metadata: &crate::metadata::Metadata) -> Vec<CoreGroup> {
    let mut current: Option<CoreGroup> = None;
    let mut finished = Vec::new();
    for event in events {
        place_core_event(event, metadata, "metric", &mut current, &mut finished);
    }
    if let Some(g) = current.take() {
        if !g.is_empty() {
            finished.push(g);
        }
    }
    finished
}

proptest! {
    /// P1: every occupied slot in every produced group admits the event it
    /// holds under the active metadata.
    #[test]
    fn p1_every_slot_is_eligible_for_its_event(events in arb_event_pool()) {
        let metadata = synthetic_x86();
        let groups = merge_to_fixpoint(dedup_core(pack_into_groups(&events, &metadata)), &metadata);
        for group in &groups {
            prop_assert!(group.is_valid(&metadata));
        }
    }

    /// P3: after dedup, no group's event set is a (non-strict) subset of
    /// another's.
    #[test]
    fn p3_dedup_leaves_no_subset_groups(events in arb_event_pool()) {
        let metadata = synthetic_x86();
        let groups = dedup_core(pack_into_groups(&events, &metadata));
        for i in 0..groups.len() {
            for j in 0..groups.len() {
                if i != j {
                    prop_assert!(!groups[i].encoding_set().is_subset(&groups[j].encoding_set()));
                }
            }
        }
    }

    /// P4: after merge-to-fixpoint, no pair of groups can still be folded
    /// into one another.
    #[test]
    fn p4_merged_groups_cannot_merge_further(events in arb_event_pool()) {
        let metadata = synthetic_x86();
        let groups = merge_to_fixpoint(dedup_core(pack_into_groups(&events, &metadata)), &metadata);
        for i in 0..groups.len() {
            for j in 0..groups.len() {
                if i != j {
                    prop_assert!(try_merge_core(&groups[i], &groups[j], &metadata).is_none());
                }
            }
        }
    }

    /// P7: dedup and merge-to-fixpoint are each idempotent - applying them
    /// again to their own output changes nothing.
    #[test]
    fn p7_dedup_and_merge_are_idempotent(events in arb_event_pool()) {
        let metadata = synthetic_x86();
        let once = merge_to_fixpoint(dedup_core(pack_into_groups(&events, &metadata)), &metadata);
        let twice = merge_to_fixpoint(dedup_core(once.clone()), &metadata);
        prop_assert_eq!(once.len(), twice.len());
        let once_sets: Vec<_> = once.iter().map(CoreGroup::encoding_set).collect();
        let twice_sets: Vec<_> = twice.iter().map(CoreGroup::encoding_set).collect();
        prop_assert_eq!(once_sets, twice_sets);
    }
}
