//! Per-core PMU counter events.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::metadata::{Capabilities, Metadata};

bitflags! {
    /// Which general-purpose counter slots an event is eligible for.
    ///
    /// Bit `i` set means the event may be placed in GP slot `i`. Platforms
    /// with more than 32 GP counters don't exist today, so a `u32` mask is
    /// sufficient; [`CounterMask::all`] is clamped to a platform's actual
    /// `gp_counters_per_core` by [`CoreEvent::is_collectable`] callers
    /// (packing, not eligibility, enforces the count).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CounterMask: u32 {
        const SLOT_0 = 1 << 0;
        const SLOT_1 = 1 << 1;
        const SLOT_2 = 1 << 2;
        const SLOT_3 = 1 << 3;
        const SLOT_4 = 1 << 4;
        const SLOT_5 = 1 << 5;
        const SLOT_6 = 1 << 6;
        const SLOT_7 = 1 << 7;
    }
}

impl CounterMask {
    /// Build a mask with the first `n` slots eligible.
    pub fn first_n(n: u32) -> CounterMask {
        if n >= 32 {
            return CounterMask::all();
        }
        CounterMask::from_bits_truncate((1u32 << n) - 1)
    }

    /// Whether slot `index` is eligible under this mask.
    pub fn admits(&self, index: u32) -> bool {
        index < 32 && self.bits() & (1 << index) != 0
    }
}

/// One of the four hard-wired fixed-purpose counter slots a [`CoreGroup`]
/// reserves.
///
/// [`CoreGroup`]: crate::group::core_group::CoreGroup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FixedSlot {
    /// Slot 0: instructions retired.
    InstructionsRetired = 0,
    /// Slot 1: cpu-cycles.
    CpuCycles = 1,
    /// Slot 2: ref-cycles.
    RefCycles = 2,
    /// Slot 3: topdown.slots.
    TopdownSlots = 3,
}

impl FixedSlot {
    /// The capability bit that must be set for this fixed slot to be
    /// usable on the current platform.
    pub fn required_capability(&self) -> Capabilities {
        match self {
            FixedSlot::InstructionsRetired => Capabilities::FIXED_INSTRUCTIONS,
            FixedSlot::CpuCycles => Capabilities::FIXED_CYCLES,
            FixedSlot::RefCycles => Capabilities::FIXED_REF_CYCLES,
            FixedSlot::TopdownSlots => Capabilities::FIXED_TMA,
        }
    }

    /// Slot index, 0..=3.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// A performance event counted by a per-CPU-core PMU counter, fixed or
/// general-purpose.
///
/// See SPEC_FULL.md §3, "Core event".
#[derive(Clone, Debug, PartialEq)]
pub struct CoreEvent {
    /// Catalog name, e.g. `"INST_RETIRED.ANY"`.
    pub name: String,
    /// Raw encoding string as it will appear in the emitted group
    /// schedule, e.g. `"event=0xc0,umask=0x00"`.
    pub raw_encoding: String,
    /// Which general-purpose slots this event may occupy.
    pub eligible_mask: CounterMask,
    /// If set, this event targets one of the four fixed-purpose slots
    /// instead of a general-purpose one.
    pub fixed_slot: Option<FixedSlot>,
    /// Optional modifier suffix, e.g. `:c1`, `:e1`, or a hybrid-core
    /// selector.
    pub modifier: Option<String>,
}

impl CoreEvent {
    /// This event's uniqueness key within a group: the raw encoding plus
    /// name and modifiers (SPEC_FULL.md §3).
    pub fn unique_key(&self) -> String {
        match &self.modifier {
            Some(m) => format!("{}|{}|{}", self.raw_encoding, self.name, m),
            None => format!("{}|{}", self.raw_encoding, self.name),
        }
    }

    /// Collectability rule from SPEC_FULL.md §4.2:
    ///
    /// - the name must be in the external tool's supported-events listing,
    /// - fixed-counter events additionally require their capability bit,
    /// - offcore-response events require [`Capabilities::OFFCORE_RESPONSE`],
    /// - PEBS-marked events require [`Capabilities::PEBS`].
    pub fn is_collectable(&self, metadata: &Metadata) -> bool {
        if !metadata.supported_events.is_empty() && !metadata.supported_events.contains(&self.name)
        {
            return false;
        }
        if let Some(slot) = self.fixed_slot {
            if !metadata.capabilities.contains(slot.required_capability()) {
                return false;
            }
        }
        if self.name.contains("OCR") && !metadata.capabilities.contains(Capabilities::OFFCORE_RESPONSE)
        {
            return false;
        }
        if self.is_pebs() && !metadata.capabilities.contains(Capabilities::PEBS) {
            return false;
        }
        true
    }

    fn is_pebs(&self) -> bool {
        self.modifier
            .as_deref()
            .map(|m| m.contains("pebs"))
            .unwrap_or(false)
            || self.raw_encoding.contains("pebs")
    }
}

/// Catalog event name -> tool-native event name, used by the formula
/// compiler's step (c), "Fixed-counter name translation" (SPEC_FULL.md
/// §4.3).
pub fn fixed_counter_translation(catalog_name: &str) -> Option<&'static str> {
    match catalog_name {
        "INST_RETIRED.ANY" => Some("instructions"),
        "CPU_CLK_UNHALTED.THREAD" => Some("cpu-cycles"),
        "CPU_CLK_UNHALTED.REF_TSC" => Some("ref-cycles"),
        "TOPDOWN.SLOTS" => Some("topdown.slots"),
        _ => None,
    }
}

/// A registry of [`CoreEvent`]s, keyed by catalog name.
#[derive(Clone, Debug, Default)]
pub struct CoreRegistry {
    events: BTreeMap<String, CoreEvent>,
}

impl CoreRegistry {
    /// Insert or overwrite an event by name.
    pub fn insert(&mut self, event: CoreEvent) {
        self.events.insert(event.name.clone(), event);
    }

    /// Look up an event by its catalog name.
    pub fn find(&self, name: &str) -> Option<&CoreEvent> {
        self.events.get(name)
    }

    /// Iterate over every registered event.
    pub fn iter(&self) -> impl Iterator<Item = &CoreEvent> {
        self.events.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::synthetic_x86;

    fn fixed_instructions() -> CoreEvent {
        CoreEvent {
            name: "INST_RETIRED.ANY".to_string(),
            raw_encoding: "event=0xc0".to_string(),
            eligible_mask: CounterMask::empty(),
            fixed_slot: Some(FixedSlot::InstructionsRetired),
            modifier: None,
        }
    }

    #[test]
    fn counter_mask_first_n() {
        let mask = CounterMask::first_n(4);
        assert!(mask.admits(0));
        assert!(mask.admits(3));
        assert!(!mask.admits(4));
    }

    #[test]
    fn fixed_slot_requires_capability() {
        let mut metadata = synthetic_x86();
        metadata.capabilities = Capabilities::empty();
        let event = fixed_instructions();
        assert!(!event.is_collectable(&metadata));

        metadata.capabilities = Capabilities::FIXED_INSTRUCTIONS;
        assert!(event.is_collectable(&metadata));
    }

    #[test]
    fn unsupported_event_name_is_rejected() {
        let mut metadata = synthetic_x86();
        metadata.supported_events.insert("OTHER_EVENT".to_string());
        let event = CoreEvent {
            name: "INST_RETIRED.ANY".to_string(),
            raw_encoding: "event=0xc0".to_string(),
            eligible_mask: CounterMask::first_n(4),
            fixed_slot: None,
            modifier: None,
        };
        assert!(!event.is_collectable(&metadata));
    }

    #[test]
    fn unique_key_includes_modifier() {
        let mut event = CoreEvent {
            name: "X".to_string(),
            raw_encoding: "event=0x1".to_string(),
            eligible_mask: CounterMask::all(),
            fixed_slot: None,
            modifier: None,
        };
        let without = event.unique_key();
        event.modifier = Some(":c1".to_string());
        let with = event.unique_key();
        assert_ne!(without, with);
    }
}
