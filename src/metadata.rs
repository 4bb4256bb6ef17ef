//! Platform metadata (C5).
//!
//! A [`Metadata`] value describes the microarchitecture being measured:
//! socket/core/thread topology, the number of general-purpose counters per
//! core, the capability bits that gate fixed-counter and uncore events, and
//! the uncore device topology. It is produced by an external collaborator
//! (CPUID-based microarchitecture discovery is out of scope for this
//! crate, per SPEC_FULL.md §1) and is immutable for the lifetime of a run.
//!
//! Everything downstream — the event registries in [`crate::events`], the
//! group packer in [`crate::group`], and the formula compiler in
//! [`crate::expr`] — treats a `Metadata` as a read-only value, typically
//! shared behind an `Arc`.

use std::collections::BTreeMap;

use bitflags::bitflags;

bitflags! {
    /// Capability bits that gate which events and fixed counters a
    /// platform supports.
    ///
    /// These correspond 1:1 to the capability booleans enumerated in
    /// SPEC_FULL.md §3 ("Microarchitecture descriptor").
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// The platform exposes a usable `instructions retired` fixed counter.
        const INSTRUCTIONS       = 1 << 0;
        /// The platform exposes a usable `ref-cycles` fixed counter.
        const REF_CYCLES         = 1 << 1;
        /// The platform exposes a usable `cpu-cycles` fixed counter.
        const FIXED_CYCLES       = 1 << 2;
        /// The fixed-counter slot for instructions is distinct from the
        /// general-purpose instructions counter (some platforms alias them).
        const FIXED_INSTRUCTIONS = 1 << 3;
        /// The platform exposes a usable fixed `ref-cycles` counter distinct
        /// from the general-purpose one.
        const FIXED_REF_CYCLES   = 1 << 4;
        /// The platform supports the fixed-counter Top-down Microarchitecture
        /// Analysis slots counter (`TOPDOWN.SLOTS`).
        const FIXED_TMA          = 1 << 5;
        /// The platform supports PEBS-marked events.
        const PEBS               = 1 << 6;
        /// The platform supports off-core response events.
        const OFFCORE_RESPONSE   = 1 << 7;
        /// The platform has at least one uncore PMU device.
        const UNCORE             = 1 << 8;
    }
}

/// Socket-to-CPU topology plus the capability and counter-count facts a run
/// needs.
///
/// Produced once per run by an external discovery step and shared
/// read-only thereafter (see SPEC_FULL.md §4.5).
#[derive(Clone, Debug)]
pub struct Metadata {
    /// Vendor tag, e.g. `"GenuineIntel"`, `"AuthenticAMD"`, `"ARM"`.
    pub vendor: String,
    /// Microarchitecture tag, e.g. `"SPR"`, `"GNR_X2"`, `"neoverse-n1"`.
    pub microarch: String,
    /// Number of sockets (packages) in the system.
    pub sockets: u32,
    /// Physical cores per socket.
    pub cores_per_socket: u32,
    /// Hardware threads per core (2 when hyperthreading/SMT is on, else 1).
    pub threads_per_core: u32,
    /// Number of general-purpose PMU counters available per core.
    pub gp_counters_per_core: u32,
    /// Nominal TSC frequency, in Hz.
    pub tsc_frequency_hz: f64,
    /// Uncore device class name (e.g. `"cha"`, `"imc"`, `"upi"`) to the
    /// sorted list of instance IDs present on this platform.
    pub uncore_device_ids: BTreeMap<String, Vec<u32>>,
    /// Capability bits gating fixed-counter and uncore/PEBS/OCR events.
    pub capabilities: Capabilities,
    /// Whether the external tool's "supported events" listing includes a
    /// given raw event name; callers can substitute a real probe, this is
    /// typically populated from `perf list`.
    pub supported_events: std::collections::BTreeSet<String>,
    /// `cpu_id -> socket_id` map; every logical CPU in the system must
    /// appear exactly once.
    pub cpu_to_socket: BTreeMap<u32, u32>,
    /// Transaction rate used to substitute the `TXN` formula constant, or
    /// `None` if transaction-rate metrics were not requested.
    pub transaction_rate: Option<f64>,
    /// The running CPU's MIDR_EL1 value, used by the `strcmp_cpuid_str`
    /// formula intrinsic (SPEC_FULL.md §4.3 step (e), ARM component
    /// catalogs). `None` on non-ARM platforms.
    pub arm_current_cpuid: Option<u64>,
}

/// The granularity at which counter values are aggregated.
///
/// See SPEC_FULL.md's glossary entry for "Granularity".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One aggregate value for the whole system.
    #[default]
    System,
    /// One aggregate value per socket.
    Socket,
    /// One value per logical CPU.
    Cpu,
}

/// Whose activity is being measured.
///
/// See SPEC_FULL.md's glossary entry for "Scope".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The whole system.
    System,
    /// A fixed list of process IDs.
    Process(Vec<u32>),
    /// A fixed list of cgroup paths.
    Cgroup(Vec<String>),
}

impl Metadata {
    /// Total logical CPU count: `sockets * cores_per_socket * threads_per_core`.
    pub fn logical_cpus(&self) -> u32 {
        self.sockets * self.cores_per_socket * self.threads_per_core
    }

    /// The `TSC` platform constant: nominal cycles-per-second across the
    /// whole system.
    pub fn tsc(&self) -> f64 {
        self.logical_cpus() as f64 * self.tsc_frequency_hz
    }

    /// `TSC` scaled for a single socket, used when compiling a formula at
    /// [`Granularity::Socket`].
    pub fn tsc_per_socket(&self) -> f64 {
        self.tsc() / self.sockets as f64
    }

    /// `TSC` scaled for a single logical CPU, used when compiling a
    /// formula at [`Granularity::Cpu`].
    pub fn tsc_per_cpu(&self) -> f64 {
        self.tsc() / self.logical_cpus() as f64
    }

    /// Whether hyperthreading (SMT) is active.
    pub fn hyperthreading_on(&self) -> bool {
        self.threads_per_core > 1
    }

    /// Number of uncore device instances of the given unit class, or 0 if
    /// the platform has none.
    pub fn uncore_device_count(&self, unit: &str) -> usize {
        self.uncore_device_ids.get(unit).map_or(0, Vec::len)
    }

    /// Look up the socket a given logical CPU belongs to.
    pub fn socket_of(&self, cpu: u32) -> Option<u32> {
        self.cpu_to_socket.get(&cpu).copied()
    }
}

#[cfg(test)]
pub(crate) fn synthetic_x86() -> Metadata {
    let mut cpu_to_socket = BTreeMap::new();
    for cpu in 0..8 {
        cpu_to_socket.insert(cpu, cpu / 4);
    }
    let mut uncore_device_ids = BTreeMap::new();
    uncore_device_ids.insert("cha".to_string(), vec![0, 1, 2, 3]);

    Metadata {
        vendor: "GenuineIntel".to_string(),
        microarch: "SPR".to_string(),
        sockets: 2,
        cores_per_socket: 2,
        threads_per_core: 2,
        gp_counters_per_core: 4,
        tsc_frequency_hz: 2_000_000_000.0,
        uncore_device_ids,
        capabilities: Capabilities::INSTRUCTIONS
            | Capabilities::REF_CYCLES
            | Capabilities::FIXED_CYCLES
            | Capabilities::FIXED_TMA
            | Capabilities::UNCORE,
        supported_events: Default::default(),
        cpu_to_socket,
        transaction_rate: None,
        arm_current_cpuid: None,
    }
}

#[cfg(test)]
pub(crate) fn synthetic_arm() -> Metadata {
    let mut cpu_to_socket = BTreeMap::new();
    for cpu in 0..4 {
        cpu_to_socket.insert(cpu, 0);
    }

    Metadata {
        vendor: "ARM".to_string(),
        microarch: "neoverse-n1".to_string(),
        sockets: 1,
        cores_per_socket: 4,
        threads_per_core: 1,
        gp_counters_per_core: 4,
        tsc_frequency_hz: 1_000_000_000.0,
        uncore_device_ids: BTreeMap::new(),
        capabilities: Capabilities::empty(),
        supported_events: Default::default(),
        cpu_to_socket,
        transaction_rate: None,
        arm_current_cpuid: Some(0x410fd0c1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsc_is_product_of_topology_and_frequency() {
        let metadata = synthetic_x86();
        assert_eq!(metadata.logical_cpus(), 8);
        assert_eq!(metadata.tsc(), 8.0 * 2_000_000_000.0);
        assert_eq!(metadata.tsc_per_socket(), metadata.tsc() / 2.0);
        assert_eq!(metadata.tsc_per_cpu(), metadata.tsc() / 8.0);
    }

    #[test]
    fn hyperthreading_flag_follows_threads_per_core() {
        let mut metadata = synthetic_x86();
        assert!(metadata.hyperthreading_on());
        metadata.threads_per_core = 1;
        assert!(!metadata.hyperthreading_on());
    }

    #[test]
    fn socket_lookup_is_populated_for_every_cpu() {
        let metadata = synthetic_x86();
        for cpu in 0..8 {
            assert!(metadata.socket_of(cpu).is_some());
        }
        assert_eq!(metadata.socket_of(99), None);
    }
}
