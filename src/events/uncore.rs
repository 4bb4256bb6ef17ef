//! Device-level (uncore) PMU counter events.

use std::collections::BTreeMap;

use crate::metadata::{Capabilities, Metadata};

/// A performance event counted by a device-level counter (memory
/// controller, coherence agent, interconnect, ...) with multiple instances
/// per socket.
///
/// See SPEC_FULL.md §3, "Uncore event".
#[derive(Clone, Debug, PartialEq)]
pub struct UncoreEvent {
    /// Catalog name, e.g. `"UNC_CHA_TOR_INSERTS.IA_MISS_CRD"`.
    pub name: String,
    /// Raw encoding before per-instance device-ID rewriting.
    pub raw_encoding: String,
    /// Unit class, e.g. `"cha"`, `"imc"`, `"upi"`.
    pub unit: String,
    /// Short abbreviation substituted into compiled formulas in place of
    /// the full event name (SPEC_FULL.md §4.3 step (i)).
    pub unique_id: String,
}

impl UncoreEvent {
    /// Collectability rule from SPEC_FULL.md §4.2: the platform must
    /// support uncore events at all, and must have at least one device of
    /// this event's unit class.
    pub fn is_collectable(&self, metadata: &Metadata) -> bool {
        metadata.capabilities.contains(Capabilities::UNCORE)
            && metadata.uncore_device_count(&self.unit) > 0
    }

    /// Rewrite this event's raw encoding to target a specific device
    /// instance, used during group-expansion (SPEC_FULL.md §4.4, "Uncore
    /// expansion").
    pub fn for_device(&self, device_id: u32) -> UncoreEvent {
        UncoreEvent {
            name: self.name.clone(),
            raw_encoding: format!("{},device={}", self.raw_encoding, device_id),
            unit: self.unit.clone(),
            unique_id: self.unique_id.clone(),
        }
    }
}

/// A registry of [`UncoreEvent`]s, keyed by catalog name.
#[derive(Clone, Debug, Default)]
pub struct UncoreRegistry {
    events: BTreeMap<String, UncoreEvent>,
}

impl UncoreRegistry {
    /// Insert or overwrite an event by name.
    pub fn insert(&mut self, event: UncoreEvent) {
        self.events.insert(event.name.clone(), event);
    }

    /// Look up an event by its catalog name.
    pub fn find(&self, name: &str) -> Option<&UncoreEvent> {
        self.events.get(name)
    }

    /// Iterate over every registered event.
    pub fn iter(&self) -> impl Iterator<Item = &UncoreEvent> {
        self.events.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::synthetic_x86;

    fn cha_event() -> UncoreEvent {
        UncoreEvent {
            name: "UNC_CHA_TOR_INSERTS.IA_MISS_CRD".to_string(),
            raw_encoding: "event=0x35,umask=0x21".to_string(),
            unit: "cha".to_string(),
            unique_id: "CHA_TOR_IA_MISS_CRD".to_string(),
        }
    }

    #[test]
    fn collectable_requires_device_present() {
        let mut metadata = synthetic_x86();
        let event = cha_event();
        assert!(event.is_collectable(&metadata));

        metadata.uncore_device_ids.clear();
        assert!(!event.is_collectable(&metadata));
    }

    #[test]
    fn for_device_rewrites_encoding_and_keeps_identity() {
        let event = cha_event();
        let instance = event.for_device(2);
        assert_eq!(instance.name, event.name);
        assert_eq!(instance.unit, event.unit);
        assert!(instance.raw_encoding.contains("device=2"));
        assert_ne!(instance.raw_encoding, event.raw_encoding);
    }
}
