//! Bare platform counters that aren't scheduled into a counter group at
//! all: power/RAPL domains and cstate residency counters.

use crate::metadata::{Metadata, Scope};

/// A bare platform counter, e.g. `power/energy-pkg/` or `cstate_core/c6-residency/`.
///
/// See SPEC_FULL.md §3, "Other event". These events have no catalog file;
/// they are recognized purely by name prefix (see [`OtherRegistry::looks_like_other`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtherEvent {
    /// The bare event name, e.g. `"power/energy-pkg/"`.
    pub name: String,
}

impl OtherEvent {
    /// Collectability rule from SPEC_FULL.md §4.2: "other" events are
    /// collectable only in system scope, and only if the external tool
    /// reports the name as supported.
    pub fn is_collectable(&self, metadata: &Metadata, scope: &Scope) -> bool {
        matches!(scope, Scope::System)
            && (metadata.supported_events.is_empty()
                || metadata.supported_events.contains(&self.name))
    }
}

/// A trivial "registry" for other events: there is nothing to load, only a
/// name-prefix recognizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtherRegistry;

impl OtherRegistry {
    /// Whether `name` looks like a power/RAPL or cstate-residency counter.
    pub fn looks_like_other(name: &str) -> bool {
        name.starts_with("power/") || name.starts_with("cstate_")
    }
}
