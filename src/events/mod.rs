//! Typed event registries (C2).
//!
//! The catalog loader resolves every alias in a metric's formula to a
//! concrete [`Event`]: a [`core::CoreEvent`] counted by a per-core PMU
//! counter, an [`uncore::UncoreEvent`] counted by a device-level counter, or
//! a bare [`other::OtherEvent`] (power/RAPL, cstate residencies, and similar
//! platform counters that aren't scheduled into a [`crate::group`]
//! counter group at all).
//!
//! Each event family has its own registry offering `find` and
//! `is_collectable`; [`Registry`] bundles the three together behind the
//! single entry point the loader actually uses.

pub mod constants;
pub mod core;
pub mod other;
pub mod uncore;

pub use self::core::CoreEvent;
pub use self::other::OtherEvent;
pub use self::uncore::UncoreEvent;

use std::collections::BTreeMap;

use crate::metadata::{Metadata, Scope};

/// A concrete, catalog-resolved event of any family.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A per-core PMU counter event.
    Core(CoreEvent),
    /// A device-level (uncore) PMU counter event.
    Uncore(UncoreEvent),
    /// A bare platform counter (power/RAPL, cstate residency, ...).
    Other(OtherEvent),
}

impl Event {
    /// The event's catalog name.
    pub fn name(&self) -> &str {
        match self {
            Event::Core(e) => &e.name,
            Event::Uncore(e) => &e.name,
            Event::Other(e) => &e.name,
        }
    }

    /// Whether this event can be collected on the given platform and in the
    /// given scope.
    ///
    /// See SPEC_FULL.md §4.2 for the per-family eligibility rules.
    pub fn is_collectable(&self, metadata: &Metadata, scope: &Scope) -> bool {
        match self {
            Event::Core(e) => e.is_collectable(metadata),
            Event::Uncore(e) => e.is_collectable(metadata),
            Event::Other(e) => e.is_collectable(metadata, scope),
        }
    }
}

/// Bundles the three per-family registries behind one lookup surface.
///
/// Built by [`crate::catalog::loader::Loader`] from the core- and
/// uncore-events catalog files; "other" events have no catalog file of
/// their own (their names are recognized by a fixed prefix, see
/// [`other::OtherRegistry`]).
#[derive(Clone, Debug, Default)]
pub struct Registry {
    /// Per-core PMU counter events, keyed by catalog name.
    pub core: core::CoreRegistry,
    /// Device-level (uncore) PMU counter events, keyed by catalog name.
    pub uncore: uncore::UncoreRegistry,
    /// Bare platform counters recognized by name prefix.
    pub other: other::OtherRegistry,
}

impl Registry {
    /// Resolve a bare catalog name to a concrete event, checking the core
    /// registry first, then uncore, then falling back to treating it as an
    /// "other" event if its name has a recognized prefix.
    pub fn find(&self, name: &str) -> Option<Event> {
        if let Some(core) = self.core.find(name) {
            return Some(Event::Core(core.clone()));
        }
        if let Some(uncore) = self.uncore.find(name) {
            return Some(Event::Uncore(uncore.clone()));
        }
        if other::OtherRegistry::looks_like_other(name) {
            return Some(Event::Other(OtherEvent {
                name: name.to_string(),
            }));
        }
        None
    }

    /// Resolve a compiled formula's variable name to its concrete event,
    /// undoing the two renames the formula compiler applies before a
    /// variable name ever reaches the registry: step (c) translates a
    /// fixed-counter catalog name to its tool-native form, and step (i)
    /// abbreviates a full uncore catalog name to its short `UniqueID`.
    /// `uncore_unique_ids` is the catalog-name -> `UniqueID` map the loader
    /// built for step (i); pass an empty map for catalogs with no uncore
    /// events (e.g. the ARM component schema).
    pub fn resolve(&self, var_name: &str, uncore_unique_ids: &BTreeMap<String, String>) -> Option<Event> {
        if let Some(event) = self.find(var_name) {
            return Some(event);
        }
        if let Some(core) = self
            .core
            .iter()
            .find(|e| core::fixed_counter_translation(&e.name) == Some(var_name))
        {
            return Some(Event::Core(core.clone()));
        }
        if let Some(catalog_name) = uncore_unique_ids
            .iter()
            .find(|(_, id)| id.as_str() == var_name)
            .map(|(name, _)| name)
        {
            if let Some(uncore) = self.uncore.find(catalog_name) {
                return Some(Event::Uncore(uncore.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::core::{CounterMask, FixedSlot};

    #[test]
    fn registry_prefers_core_then_uncore_then_other() {
        let mut registry = Registry::default();
        registry.core.insert(CoreEvent {
            name: "INST_RETIRED.ANY".to_string(),
            raw_encoding: "event=0xc0".to_string(),
            eligible_mask: CounterMask::all(),
            fixed_slot: Some(FixedSlot::InstructionsRetired),
            modifier: None,
        });
        registry.uncore.insert(UncoreEvent {
            name: "UNC_CHA_CLOCKTICKS".to_string(),
            raw_encoding: "event=0x00".to_string(),
            unit: "cha".to_string(),
            unique_id: "CHA_CLOCKTICKS".to_string(),
        });

        assert!(matches!(
            registry.find("INST_RETIRED.ANY"),
            Some(Event::Core(_))
        ));
        assert!(matches!(
            registry.find("UNC_CHA_CLOCKTICKS"),
            Some(Event::Uncore(_))
        ));
        assert!(matches!(
            registry.find("power/energy-pkg/"),
            Some(Event::Other(_))
        ));
        assert_eq!(registry.find("totally_unknown_event"), None);
    }

    #[test]
    fn resolve_undoes_fixed_counter_translation_and_uncore_abbreviation() {
        let mut registry = Registry::default();
        registry.core.insert(CoreEvent {
            name: "CPU_CLK_UNHALTED.THREAD".to_string(),
            raw_encoding: "event=0x3c".to_string(),
            eligible_mask: CounterMask::empty(),
            fixed_slot: Some(FixedSlot::CpuCycles),
            modifier: None,
        });
        registry.uncore.insert(UncoreEvent {
            name: "UNC_CHA_CLOCKTICKS".to_string(),
            raw_encoding: "event=0x00".to_string(),
            unit: "cha".to_string(),
            unique_id: "CHA_CLOCKTICKS".to_string(),
        });
        let mut unique_ids = BTreeMap::new();
        unique_ids.insert("UNC_CHA_CLOCKTICKS".to_string(), "CHA_CLOCKTICKS".to_string());

        assert!(matches!(registry.resolve("cpu-cycles", &unique_ids), Some(Event::Core(_))));
        assert!(matches!(
            registry.resolve("CHA_CLOCKTICKS", &unique_ids),
            Some(Event::Uncore(_))
        ));
        assert_eq!(registry.resolve("nonexistent", &unique_ids), None);
    }
}
