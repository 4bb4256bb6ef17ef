//! Serde structs mirroring the catalog file formats described in
//! SPEC_FULL.md §6. These are intentionally dumb data-carriers: all the
//! interesting resolution logic lives in [`crate::catalog::loader`].

use std::collections::BTreeMap;

use serde::Deserialize;

/// The top-level metrics-config file: names every subordinate catalog file
/// and the ordered list of metrics to report.
#[derive(Clone, Debug, Deserialize)]
pub struct MetricsConfig {
    #[serde(rename = "PerfmonMetricsFile")]
    pub perfmon_metrics_file: String,
    #[serde(rename = "PerfmonCoreEventsFile")]
    pub perfmon_core_events_file: String,
    #[serde(rename = "PerfmonUncoreEventsFile")]
    pub perfmon_uncore_events_file: String,
    #[serde(rename = "PerfmonRetireLatencyFile", default)]
    pub perfmon_retire_latency_file: Option<String>,
    #[serde(rename = "AlternateTMAMetricsFile", default)]
    pub alternate_tma_metrics_file: Option<String>,
    #[serde(rename = "PerfspectMetricsFile", default)]
    pub perfspect_metrics_file: Option<String>,
    #[serde(rename = "ReportMetrics")]
    pub report_metrics: Vec<ReportMetricEntry>,
}

/// One entry of `ReportMetrics`: which catalog to search and under what
/// legacy key.
#[derive(Clone, Debug, Deserialize)]
pub struct ReportMetricEntry {
    #[serde(rename = "MetricName")]
    pub metric_name: String,
    #[serde(rename = "LegacyName")]
    pub legacy_name: String,
    #[serde(rename = "Origin")]
    pub origin: String,
}

/// A perfmon-style (or perfspect/alternate-TMA) metrics file: free-form
/// header plus the metric entries themselves.
#[derive(Clone, Debug, Deserialize)]
pub struct PerfmonMetricsFile {
    #[serde(rename = "Header", default)]
    pub header: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "Metrics")]
    pub metrics: Vec<PerfmonMetricEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PerfmonMetricEntry {
    #[serde(rename = "MetricName")]
    pub metric_name: String,
    #[serde(rename = "LegacyName")]
    pub legacy_name: String,
    #[serde(rename = "BriefDescription", default)]
    pub brief_description: String,
    #[serde(rename = "Level", default)]
    pub level: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Events", default)]
    pub events: Vec<AliasEntry>,
    #[serde(rename = "Constants", default)]
    pub constants: Vec<AliasEntry>,
    #[serde(rename = "Formula")]
    pub formula: String,
    #[serde(rename = "Threshold", default)]
    pub threshold: Option<ThresholdEntry>,
}

/// An `Events` or `Constants` array entry: an alias used in the formula
/// text, mapped to its canonical name.
#[derive(Clone, Debug, Deserialize)]
pub struct AliasEntry {
    #[serde(rename = "Alias")]
    pub alias: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ThresholdEntry {
    #[serde(rename = "Formula")]
    pub formula: String,
    #[serde(rename = "ThresholdMetrics", default)]
    pub threshold_metrics: Vec<ThresholdMetricEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ThresholdMetricEntry {
    #[serde(rename = "Alias")]
    pub alias: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// The core-events catalog file.
#[derive(Clone, Debug, Deserialize)]
pub struct CoreEventsFile {
    #[serde(rename = "Events")]
    pub events: Vec<CoreEventEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CoreEventEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "RawEncoding")]
    pub raw_encoding: String,
    /// Either `"Fixed0"`..`"Fixed3"`, or a comma-separated list of eligible
    /// general-purpose slot indices (e.g. `"0,1,2,3"`).
    #[serde(rename = "Counter")]
    pub counter: String,
    #[serde(rename = "Modifier", default)]
    pub modifier: Option<String>,
}

/// The uncore-events catalog file.
#[derive(Clone, Debug, Deserialize)]
pub struct UncoreEventsFile {
    #[serde(rename = "Events")]
    pub events: Vec<UncoreEventEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UncoreEventEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "RawEncoding")]
    pub raw_encoding: String,
    #[serde(rename = "Unit")]
    pub unit: String,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
}

/// The retire-latency file: `{Platform:{...}, Data:{event -> {MIN,MAX,MEAN}}}`.
#[derive(Clone, Debug, Deserialize)]
pub struct RetireLatencyFile {
    #[serde(rename = "Platform", default)]
    pub platform: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "Data")]
    pub data: BTreeMap<String, RetireLatencyStats>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetireLatencyStats {
    #[serde(rename = "MIN")]
    pub min: f64,
    #[serde(rename = "MAX")]
    pub max: f64,
    #[serde(rename = "MEAN")]
    pub mean: f64,
}

/// An ARM "component" catalog: metric entries directly naming an
/// architected event or an expression over several, plus the sibling event
/// list that enumerates valid names.
#[derive(Clone, Debug, Deserialize)]
pub struct ArmComponentMetricsFile {
    #[serde(rename = "Metrics")]
    pub metrics: Vec<ArmComponentMetricEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArmComponentMetricEntry {
    /// Present on entries that are a direct pass-through of one architected
    /// event rather than a named, formula-defined metric. Mutually
    /// exclusive with `metric_name` in practice; [`ArmComponentMetricEntry::name`]
    /// picks whichever is present.
    #[serde(rename = "ArchStdEvent", default)]
    pub arch_std_event: Option<String>,
    #[serde(rename = "MetricName", default)]
    pub metric_name: Option<String>,
    #[serde(rename = "MetricExpr")]
    pub metric_expr: String,
    #[serde(rename = "BriefDescription", default)]
    pub brief_description: String,
    #[serde(rename = "MetricGroup", default)]
    pub metric_group: String,
    #[serde(rename = "ScaleUnit", default)]
    pub scale_unit: String,
}

impl ArmComponentMetricEntry {
    /// The name this entry is reported under: `MetricName` if present, else
    /// the bare architected event name from `ArchStdEvent`.
    pub fn name(&self) -> Option<&str> {
        self.metric_name.as_deref().or(self.arch_std_event.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArmComponentEventsFile {
    #[serde(rename = "Events")]
    pub events: Vec<CoreEventEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_config_parses_optional_fields() {
        let json = r#"{
            "PerfmonMetricsFile": "perfmon.metrics.json",
            "PerfmonCoreEventsFile": "core.events.json",
            "PerfmonUncoreEventsFile": "uncore.events.json",
            "ReportMetrics": [
                {"MetricName": "metric_CPI", "LegacyName": "metric_CPI", "Origin": "perfmon"}
            ]
        }"#;
        let config: MetricsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.report_metrics.len(), 1);
        assert!(config.perfmon_retire_latency_file.is_none());
    }

    #[test]
    fn arm_component_entry_falls_back_to_arch_std_event() {
        let json = r#"{"ArchStdEvent": "BR_MIS_PRED_RETIRED", "MetricExpr": "[BR_MIS_PRED_RETIRED]"}"#;
        let entry: ArmComponentMetricEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name(), Some("BR_MIS_PRED_RETIRED"));

        let json = r#"{"MetricName": "ipc", "MetricExpr": "[INST_RETIRED] / [CPU_CYCLES]"}"#;
        let entry: ArmComponentMetricEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name(), Some("ipc"));
    }
}
