//! The catalog loader (C1): resolves a microarchitecture tag to an embedded
//! catalog subtree, resolves every `ReportMetrics` entry to a concrete
//! metric, and hands each formula to [`crate::expr::compile`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicIsize;

use crate::catalog::metric::MetricDefinition;
use crate::catalog::resource::ResourceTree;
use crate::catalog::schema::{
    ArmComponentEventsFile, ArmComponentMetricsFile, CoreEventEntry, CoreEventsFile,
    MetricsConfig, PerfmonMetricEntry, PerfmonMetricsFile, RetireLatencyFile, UncoreEventsFile,
};
use crate::error::MetricsError;
use crate::events::core::{CounterMask, FixedSlot};
use crate::events::uncore::UncoreEvent;
use crate::events::{CoreEvent, Registry};
use crate::expr::{self, CompileContext, CompiledExpr};
use crate::metadata::{Capabilities, Granularity, Metadata, Scope};

/// Which catalog schema a loaded microarchitecture used. The group packer's
/// ARM-only small-group merge (SPEC_FULL.md §4.4) keys off this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogFlavour {
    /// A perfmon/perfspect-style catalog (x86 family).
    Perfmon,
    /// An ARM "component" catalog (`ArchStdEvent`/`MetricExpr` schema).
    ArmComponent,
}

/// Options governing a single catalog-load call.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Overrides the embedded metrics-config file with one read from the
    /// real filesystem; subordinate catalog files are then resolved
    /// relative to this path's parent directory.
    pub override_config_path: Option<PathBuf>,
    /// Transaction rate substituted for the `TXN` formula constant, if
    /// transaction-rate metrics were requested.
    pub transaction_rate: Option<f64>,
    /// Prefer alternate-TMA metrics even when the platform supports
    /// fixed-TMA counters (useful for testing the fallback path).
    pub prefer_alternate_tma: bool,
    /// The granularity platform constants (`TSC`, ...) are compiled for.
    pub granularity: Granularity,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            override_config_path: None,
            transaction_rate: None,
            prefer_alternate_tma: false,
            granularity: Granularity::System,
        }
    }
}

/// Everything [`load`] produces: the event registry a metric's events
/// resolve against, the compiled metrics that survived resolution, the
/// catalog schema flavour, and the event names dropped along the way
/// (SPEC_FULL.md §4.4, "Uncollectable-event handling").
#[derive(Debug)]
pub struct LoadedCatalog {
    pub registry: Registry,
    pub metrics: Vec<MetricDefinition>,
    pub flavour: CatalogFlavour,
    pub dropped_events: Vec<String>,
    /// Catalog event name -> short `UniqueID`, needed to resolve a
    /// metric's abbreviated uncore variables back to registry events (see
    /// [`crate::events::Registry::resolve`]). Empty for the ARM schema,
    /// which has no uncore events.
    pub uncore_unique_ids: BTreeMap<String, String>,
}

/// Resolve `uarch_tag` against the embedded catalog, compile every
/// resolvable report metric, and return the result.
///
/// Dispatches on `metadata.vendor`: `"ARM"` (case-insensitively) loads the
/// ARM component schema; anything else loads the perfmon schema under the
/// `x86` family subtree.
pub fn load(
    uarch_tag: &str,
    metadata: &Metadata,
    config: &LoaderConfig,
) -> Result<LoadedCatalog, MetricsError> {
    if metadata.vendor.eq_ignore_ascii_case("ARM") {
        load_arm_component(uarch_tag, metadata, config)
    } else {
        load_perfmon(uarch_tag, metadata, config)
    }
}

/// Normalised candidate directory names for a microarchitecture tag, most
/// specific first: lowercased, `-` folded to `_`, then progressively
/// shorter prefixes of its `_`-separated parts (so `GNR_X2` tries `gnr_x2`
/// then `gnr`, matching variants like `GNR-D`).
fn normalize_tag_candidates(tag: &str) -> Vec<String> {
    let canon = tag.to_lowercase().replace('-', "_");
    let parts: Vec<&str> = canon.split('_').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return vec![canon];
    }
    (1..=parts.len()).rev().map(|n| parts[..n].join("_")).collect()
}

/// Known ARM microarchitecture aliases mapping to a shared resource
/// subtree, per SPEC_FULL.md §4.1 ("For ARM, a small table maps known
/// microarchitectures to a shared subtree").
const ARM_UARCH_ALIASES: &[(&str, &str)] = &[
    ("neoverse-n1", "neoverse-n1"),
    ("neoverse_n1", "neoverse-n1"),
    ("neoverse-n2", "neoverse-n1"),
    ("neoverse_n2", "neoverse-n1"),
];

fn resolve_dir(tree: &ResourceTree, family: &str, tag: &str) -> Result<String, MetricsError> {
    if family == "arm" {
        let lower = tag.to_lowercase();
        for (alias, target) in ARM_UARCH_ALIASES {
            if lower == *alias && tree.has_dir(&format!("arm/{target}")) {
                return Ok(target.to_string());
            }
        }
    }
    for candidate in normalize_tag_candidates(tag) {
        if tree.has_dir(&format!("{family}/{candidate}")) {
            return Ok(candidate);
        }
    }
    Err(MetricsError::CatalogFileNotFound {
        path: format!("{family}/{tag}"),
    })
}

/// Reads catalog files either from the embedded [`ResourceTree`] or, once an
/// override config path redirects us, from the real filesystem relative to
/// that path's parent directory.
enum Source {
    Embedded { tree: ResourceTree, base: String },
    FileSystem { base: PathBuf },
}

impl Source {
    fn read_json<T: serde::de::DeserializeOwned>(&self, filename: &str) -> Result<T, MetricsError> {
        match self {
            Source::Embedded { tree, base } => tree.read_json(&format!("{base}{filename}")),
            Source::FileSystem { base } => {
                let path = base.join(filename);
                let text = std::fs::read_to_string(&path).map_err(|source| MetricsError::CatalogIo {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|source| MetricsError::CatalogJson {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }
}

fn load_perfmon(
    uarch_tag: &str,
    metadata: &Metadata,
    config: &LoaderConfig,
) -> Result<LoadedCatalog, MetricsError> {
    let tree = ResourceTree;

    let (metrics_config, subordinate_source): (MetricsConfig, Source) =
        match &config.override_config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| MetricsError::CatalogIo {
                    path: path.clone(),
                    source,
                })?;
                let parsed = serde_json::from_str(&text).map_err(|source| MetricsError::CatalogJson {
                    path: path.display().to_string(),
                    source,
                })?;
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (parsed, Source::FileSystem { base })
            }
            None => {
                let dir = resolve_dir(&tree, "x86", uarch_tag)?;
                let base = format!("x86/{dir}/");
                let parsed = tree.read_json(&format!("{base}metrics.config.json"))?;
                (parsed, Source::Embedded { tree, base })
            }
        };

    let perfmon: PerfmonMetricsFile =
        subordinate_source.read_json(&metrics_config.perfmon_metrics_file)?;
    let core_events: CoreEventsFile =
        subordinate_source.read_json(&metrics_config.perfmon_core_events_file)?;
    let uncore_events: UncoreEventsFile =
        subordinate_source.read_json(&metrics_config.perfmon_uncore_events_file)?;
    let retire_latency: Option<RetireLatencyFile> = metrics_config
        .perfmon_retire_latency_file
        .as_deref()
        .map(|f| subordinate_source.read_json(f))
        .transpose()?;
    let alternate_tma: Option<PerfmonMetricsFile> = metrics_config
        .alternate_tma_metrics_file
        .as_deref()
        .map(|f| subordinate_source.read_json(f))
        .transpose()?;
    let perfspect: Option<PerfmonMetricsFile> = metrics_config
        .perfspect_metrics_file
        .as_deref()
        .map(|f| subordinate_source.read_json(f))
        .transpose()?;

    let registry = build_registry(&core_events, &uncore_events);
    let uncore_unique_ids = uncore_unique_id_map(&registry);
    let retire_latency_means = retire_latency
        .as_ref()
        .map(retire_latency_mean_map)
        .unwrap_or_default();

    let perfmon_by_legacy = index_by_legacy(&perfmon.metrics);
    let perfspect_by_legacy = perfspect
        .as_ref()
        .map(|f| index_by_legacy(&f.metrics))
        .unwrap_or_default();
    let alt_tma_by_legacy = alternate_tma
        .as_ref()
        .map(|f| index_by_legacy(&f.metrics))
        .unwrap_or_default();

    let use_alternate_tma = config.prefer_alternate_tma
        || !metadata.capabilities.contains(Capabilities::FIXED_TMA);

    let mut metrics = Vec::new();
    let mut dropped_events = Vec::new();

    for entry in &metrics_config.report_metrics {
        let source_entry = if use_alternate_tma && alt_tma_by_legacy.contains_key(entry.legacy_name.as_str())
        {
            alt_tma_by_legacy.get(entry.legacy_name.as_str()).copied()
        } else {
            match entry.origin.as_str() {
                "perfmon" => perfmon_by_legacy.get(entry.legacy_name.as_str()).copied(),
                "perfspect" => perfspect_by_legacy.get(entry.legacy_name.as_str()).copied(),
                other => {
                    return Err(MetricsError::UnknownOrigin {
                        origin: other.to_string(),
                        legacy_name: entry.legacy_name.clone(),
                    })
                }
            }
        };

        let Some(source_entry) = source_entry else {
            log::warn!(
                "report metric {:?} (legacy name {:?}) did not resolve in any catalog; dropping",
                entry.metric_name,
                entry.legacy_name
            );
            continue;
        };

        match compile_perfmon_metric(
            source_entry,
            &registry,
            metadata,
            config,
            &uncore_unique_ids,
            &retire_latency_means,
        )? {
            Some(metric) => metrics.push(metric),
            None => dropped_events.push(source_entry.legacy_name.clone()),
        }
    }

    Ok(LoadedCatalog {
        registry,
        metrics,
        flavour: CatalogFlavour::Perfmon,
        dropped_events,
        uncore_unique_ids,
    })
}

fn index_by_legacy(metrics: &[PerfmonMetricEntry]) -> BTreeMap<&str, &PerfmonMetricEntry> {
    metrics.iter().map(|m| (m.legacy_name.as_str(), m)).collect()
}

fn uncore_unique_id_map(registry: &Registry) -> BTreeMap<String, String> {
    registry
        .uncore
        .iter()
        .map(|e| (e.name.clone(), e.unique_id.clone()))
        .collect()
}

fn retire_latency_mean_map(file: &RetireLatencyFile) -> BTreeMap<String, f64> {
    file.data.iter().map(|(k, v)| (k.clone(), v.mean)).collect()
}

/// Replace any `[EVENT:retire_latency]` placeholder whose `EVENT` is
/// present in the retire-latency data with its mean, as a numeric literal.
/// Placeholders for events with no retire-latency data are left untouched;
/// the group packer treats any such residual name as a non-event
/// (SPEC_FULL.md §4.4).
fn substitute_retire_latency(formula: &str, means: &BTreeMap<String, f64>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find(']') {
            Some(close) => {
                let inner = &after_open[..close];
                if let Some(event) = inner.strip_suffix(":retire_latency") {
                    if let Some(mean) = means.get(event) {
                        out.push_str(&mean.to_string());
                    } else {
                        out.push('[');
                        out.push_str(inner);
                        out.push(']');
                    }
                } else {
                    out.push('[');
                    out.push_str(inner);
                    out.push(']');
                }
                rest = &after_open[close + 1..];
            }
            None => {
                out.push('[');
                out.push_str(after_open);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn compile_perfmon_metric(
    entry: &PerfmonMetricEntry,
    registry: &Registry,
    metadata: &Metadata,
    config: &LoaderConfig,
    uncore_unique_ids: &BTreeMap<String, String>,
    retire_latency_means: &BTreeMap<String, f64>,
) -> Result<Option<MetricDefinition>, MetricsError> {
    let mut aliases: BTreeMap<String, String> = BTreeMap::new();
    for e in &entry.events {
        aliases.insert(e.alias.clone(), e.name.clone());
    }
    for c in &entry.constants {
        aliases.insert(c.alias.clone(), c.name.clone());
    }

    let ctx = CompileContext {
        aliases: aliases.clone(),
        uncore_unique_ids: uncore_unique_ids.clone(),
        granularity: config.granularity,
    };

    let mut metadata = metadata.clone();
    metadata.transaction_rate = config.transaction_rate;

    let formula = substitute_retire_latency(&entry.formula, retire_latency_means);
    let compiled = expr::compile(&formula, &ctx, &metadata).map_err(|source| MetricsError::Compile {
        metric_name: entry.metric_name.clone(),
        source,
    })?;

    if !all_events_collectable(&compiled, registry, &metadata, uncore_unique_ids) {
        return Ok(None);
    }

    let threshold = match &entry.threshold {
        Some(t) => {
            let mut threshold_aliases = aliases.clone();
            for tm in &t.threshold_metrics {
                threshold_aliases.insert(tm.alias.clone(), tm.value.clone());
            }
            let threshold_ctx = CompileContext {
                aliases: threshold_aliases,
                uncore_unique_ids: uncore_unique_ids.clone(),
                granularity: config.granularity,
            };
            let threshold_formula = substitute_retire_latency(&t.formula, retire_latency_means);
            match expr::compile(&threshold_formula, &threshold_ctx, &metadata) {
                Ok(compiled_threshold)
                    if all_events_collectable(&compiled_threshold, registry, &metadata, uncore_unique_ids) =>
                {
                    Some(compiled_threshold)
                }
                Ok(_) => {
                    log::warn!(
                        "threshold for metric {:?} references an uncollectable event; dropping threshold only",
                        entry.metric_name
                    );
                    None
                }
                Err(err) => {
                    log::warn!(
                        "threshold for metric {:?} failed to compile: {err}; dropping threshold only",
                        entry.metric_name
                    );
                    None
                }
            }
        }
        None => None,
    };

    Ok(Some(MetricDefinition {
        name: MetricDefinition::strip_metric_prefix(&entry.metric_name).to_string(),
        legacy_name: entry.legacy_name.clone(),
        description: entry.brief_description.clone(),
        category: entry.category.clone(),
        level: entry.level.clone(),
        compiled,
        threshold,
        group_index_cache: AtomicIsize::new(-1),
    }))
}

/// Every variable a compiled formula references must resolve to a
/// collectable event, or name a retire-latency placeholder that was left
/// unsubstituted (the packer's job, not the loader's, to skip those).
///
/// A fixed-counter or uncore variable has already been rewritten to its
/// tool-native name or short `UniqueID` (steps (c) and (i) of
/// [`expr::compile`]) by the time it shows up here, so [`Registry::resolve`]
/// does the reverse walk to recover the catalog event each one came from.
fn all_events_collectable(
    compiled: &CompiledExpr,
    registry: &Registry,
    metadata: &Metadata,
    uncore_unique_ids: &BTreeMap<String, String>,
) -> bool {
    for var in &compiled.variables {
        if var.ends_with(":retire_latency") {
            continue;
        }
        match registry.resolve(var, uncore_unique_ids) {
            Some(event) if event.is_collectable(metadata, &Scope::System) => continue,
            _ => {
                log::warn!("event {var:?} is not collectable on this platform; dropping metric");
                return false;
            }
        }
    }
    true
}

fn build_registry(core_events: &CoreEventsFile, uncore_events: &UncoreEventsFile) -> Registry {
    let mut registry = Registry::default();
    for entry in &core_events.events {
        registry.core.insert(core_event_from_entry(entry));
    }
    for entry in &uncore_events.events {
        registry.uncore.insert(UncoreEvent {
            name: entry.name.clone(),
            raw_encoding: entry.raw_encoding.clone(),
            unit: entry.unit.clone(),
            unique_id: entry.unique_id.clone(),
        });
    }
    registry
}

fn core_event_from_entry(entry: &CoreEventEntry) -> CoreEvent {
    let (fixed_slot, eligible_mask) = parse_counter_field(&entry.counter);
    CoreEvent {
        name: entry.name.clone(),
        raw_encoding: entry.raw_encoding.clone(),
        eligible_mask,
        fixed_slot,
        modifier: entry.modifier.clone(),
    }
}

/// Parse a `Counter` field: `"Fixed0"`..`"Fixed3"` names a fixed-purpose
/// slot, anything else is a comma-separated list of eligible GP indices.
fn parse_counter_field(counter: &str) -> (Option<FixedSlot>, CounterMask) {
    match counter {
        "Fixed0" => return (Some(FixedSlot::InstructionsRetired), CounterMask::empty()),
        "Fixed1" => return (Some(FixedSlot::CpuCycles), CounterMask::empty()),
        "Fixed2" => return (Some(FixedSlot::RefCycles), CounterMask::empty()),
        "Fixed3" => return (Some(FixedSlot::TopdownSlots), CounterMask::empty()),
        _ => {}
    }
    let mut mask = CounterMask::empty();
    for part in counter.split(',') {
        if let Ok(index) = part.trim().parse::<u32>() {
            mask |= CounterMask::from_bits_truncate(1 << index);
        }
    }
    (None, mask)
}

fn load_arm_component(
    uarch_tag: &str,
    metadata: &Metadata,
    config: &LoaderConfig,
) -> Result<LoadedCatalog, MetricsError> {
    let tree = ResourceTree;
    let dir = resolve_dir(&tree, "arm", uarch_tag)?;
    let base = format!("arm/{dir}/");

    let metrics_file: ArmComponentMetricsFile =
        tree.read_json(&format!("{base}component.metrics.json"))?;
    let events_file: ArmComponentEventsFile =
        tree.read_json(&format!("{base}component.events.json"))?;

    let mut registry = Registry::default();
    for entry in &events_file.events {
        registry.core.insert(core_event_from_entry(entry));
    }

    let mut metadata = metadata.clone();
    metadata.transaction_rate = config.transaction_rate;

    let mut metrics = Vec::new();
    let mut dropped_events = Vec::new();

    for entry in &metrics_file.metrics {
        let Some(name) = entry.name() else {
            log::warn!("ARM component metric entry has neither MetricName nor ArchStdEvent, skipping");
            continue;
        };
        let name = name.to_string();
        let ctx = CompileContext {
            aliases: BTreeMap::new(),
            uncore_unique_ids: BTreeMap::new(),
            granularity: config.granularity,
        };
        let compiled =
            expr::compile(&entry.metric_expr, &ctx, &metadata).map_err(|source| MetricsError::Compile {
                metric_name: name.clone(),
                source,
            })?;
        if !all_events_collectable(&compiled, &registry, &metadata, &BTreeMap::new()) {
            dropped_events.push(name);
            continue;
        }
        metrics.push(MetricDefinition {
            name: MetricDefinition::strip_metric_prefix(&name).to_string(),
            legacy_name: name,
            description: entry.brief_description.clone(),
            category: entry.metric_group.clone(),
            level: entry.scale_unit.clone(),
            compiled,
            threshold: None,
            group_index_cache: AtomicIsize::new(-1),
        });
    }

    Ok(LoadedCatalog {
        registry,
        metrics,
        flavour: CatalogFlavour::ArmComponent,
        dropped_events,
        uncore_unique_ids: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{synthetic_arm, synthetic_x86};

    #[test]
    fn normalize_tag_tries_progressively_shorter_prefixes() {
        assert_eq!(normalize_tag_candidates("GNR_X2"), vec!["gnr_x2", "gnr"]);
        assert_eq!(normalize_tag_candidates("GNR-D"), vec!["gnr_d", "gnr"]);
        assert_eq!(normalize_tag_candidates("SPR"), vec!["spr"]);
    }

    #[test]
    fn loads_embedded_x86_catalog_end_to_end() {
        let metadata = synthetic_x86();
        let config = LoaderConfig::default();
        let loaded = load("SPR", &metadata, &config).expect("synthetic x86 catalog should load");
        assert_eq!(loaded.flavour, CatalogFlavour::Perfmon);
        assert!(!loaded.metrics.is_empty());
    }

    #[test]
    fn unknown_uarch_is_reported_not_panicked() {
        let metadata = synthetic_x86();
        let config = LoaderConfig::default();
        let err = load("totally-unknown-uarch", &metadata, &config).unwrap_err();
        assert!(matches!(err, MetricsError::CatalogFileNotFound { .. }));
    }

    #[test]
    fn loads_embedded_arm_catalog_end_to_end() {
        let metadata = synthetic_arm();
        let config = LoaderConfig::default();
        let loaded =
            load("neoverse-n1", &metadata, &config).expect("synthetic ARM catalog should load");
        assert_eq!(loaded.flavour, CatalogFlavour::ArmComponent);
        assert_eq!(loaded.metrics.len(), 3);
        assert!(loaded
            .metrics
            .iter()
            .any(|m| m.name == "branch_mispredict_ratio"));
    }

    #[test]
    fn arm_uarch_alias_resolves_to_shared_subtree() {
        let metadata = synthetic_arm();
        let config = LoaderConfig::default();
        let loaded =
            load("neoverse-n2", &metadata, &config).expect("neoverse-n2 should alias to neoverse-n1");
        assert_eq!(loaded.flavour, CatalogFlavour::ArmComponent);
        assert!(!loaded.metrics.is_empty());
    }

    #[test]
    fn arm_cpuid_intrinsic_is_evaluated_against_current_cpuid() {
        let metadata = synthetic_arm();
        let config = LoaderConfig::default();
        let loaded = load("neoverse-n1", &metadata, &config).unwrap();
        let metric = loaded
            .metrics
            .iter()
            .find(|m| m.legacy_name == "is_neoverse_n1_r3_or_later")
            .expect("cpuid-gated metric should survive compilation");
        let value = crate::expr::eval(&metric.compiled.ast, &[], metadata.arm_current_cpuid);
        assert_eq!(value, 1.0);
    }

    #[test]
    fn fixed_tma_fallback_prefers_alternate_entry() {
        let mut metadata = synthetic_x86();
        metadata.capabilities.remove(Capabilities::FIXED_TMA);
        let config = LoaderConfig::default();
        let loaded = load("SPR", &metadata, &config).unwrap();
        let tma_metric = loaded
            .metrics
            .iter()
            .find(|m| m.legacy_name == "metric_cpu_utilization_tma")
            .expect("alternate TMA metric should resolve");
        assert!(
            tma_metric
                .compiled
                .variables
                .iter()
                .any(|v| v == "cpu-cycles:k"),
            "expected alternate-TMA expression to reference cpu-cycles:k, got {:?}",
            tma_metric.compiled.variables
        );
    }
}
