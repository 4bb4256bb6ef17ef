//! The frame assembler (C6): turns the counter reader's line-delimited
//! JSON output into [`EventFrame`]s aligned against a packed schedule.
//!
//! [`assemble_frames`] is the entry point. For each distinct timestamp in
//! the input it buckets observations by [`crate::metadata::Scope`] and
//! [`Granularity`] (SPEC_FULL.md §4.6, "Bucketing"), aggregates duplicate
//! device-level observations, and checks the result against the packer's
//! [`GroupDefinition`] schedule slot by slot.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::group::GroupDefinition;
use crate::metadata::{Granularity, Metadata, Scope};

/// One JSON observation, exactly as the counter reader emits it: one
/// object per line, per SPEC_FULL.md §4.6 ("the counter reader must emit
/// one JSON object per line per observation").
#[derive(Clone, Debug, Deserialize)]
struct ObservationLine {
    interval: f64,
    #[serde(default)]
    cpu: Option<String>,
    #[serde(rename = "counter-value")]
    counter_value: String,
    event: String,
    #[serde(rename = "event-runtime", default)]
    event_runtime: f64,
    #[serde(rename = "pcnt-running", default = "default_running_percentage")]
    running_percentage: f64,
    #[serde(default)]
    cgroup: Option<String>,
}

fn default_running_percentage() -> f64 {
    100.0
}

/// A single observation from one collection round.
///
/// `value` is `f64::NAN` for an observation the counter reader marked
/// `<not counted>` or `<not supported>`, per SPEC_FULL.md §4.6; nothing
/// downstream treats NaN here as an error, it simply propagates (see
/// [`crate::expr::ast::eval`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Event name, already normalized (`cpu/topdown-retiring/` becomes
    /// `topdown-retiring`, any trailing modifier is kept as reported).
    pub event_name: String,
    /// The reported counter value, or NaN if uncollected.
    pub value: f64,
    /// The logical CPU this observation was tagged with, if the counter
    /// reader was run in per-CPU mode.
    pub cpu: Option<u32>,
    /// Wall-clock time this event was actually scheduled on a PMU, in the
    /// same units the counter reader reports (SPEC_FULL.md §3,
    /// "event-runtime").
    pub event_runtime: f64,
    /// `100 * event_runtime / interval_duration`; less than 100 means the
    /// event was time-multiplexed off the PMU for part of the interval.
    pub running_percentage: f64,
    /// The cgroup this observation was collected against, present only
    /// when the counter reader was run with [`Scope::Cgroup`].
    pub cgroup: Option<String>,
}

/// Which scope×granularity bucket an [`EventFrame`] belongs to.
///
/// See SPEC_FULL.md's glossary entries for "Scope" and "Granularity".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    /// One aggregate bucket for the whole collection round (system scope,
    /// or the single pass-through bucket for process scope).
    System,
    /// One bucket per socket (system scope only).
    Socket(u32),
    /// One bucket per logical CPU (system scope only).
    Cpu(u32),
    /// One bucket per distinct cgroup value, insertion-ordered
    /// (SPEC_FULL.md §3, "one bucket per distinct cgroup value").
    Cgroup(String),
}

/// One counter group's observations, in the same slot order as the
/// [`GroupDefinition`] it was aligned against.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct EventGroup {
    /// This group's position in the schedule it was aligned against.
    pub group_index: usize,
    /// The group's running-percentage, copied from its observations
    /// (SPEC_FULL.md §4.6 step 5: "copy running-percentage onto each
    /// EventGroup"). All observations scheduled together are multiplexed
    /// together, so they share one value; the first observation's is used.
    pub running_percentage: f64,
    pub observations: Vec<Observation>,
}

/// Every counter group's observations for one timestamp and one bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct EventFrame {
    /// The collection round's timestamp, exactly as the counter reader
    /// reported it (kept as text; nothing in this crate parses it as a
    /// duration beyond grouping by equality).
    pub timestamp: String,
    /// Which bucket this frame represents.
    pub bucket: BucketKey,
    /// Per-group observations, in schedule order.
    pub groups: Vec<EventGroup>,
}

/// A defect in the counter reader's output, or a mismatch between what it
/// reported and the schedule it was asked to collect (SPEC_FULL.md §7,
/// "Frame assembly errors").
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// A line didn't deserialize as a JSON observation.
    #[error("malformed counter-reader line {line:?}: {detail}")]
    MalformedLine { line: String, detail: String },
    /// A line's `counter-value` field was neither a recognized sentinel nor
    /// a valid float.
    #[error("unparseable value {raw:?} in line {line:?}")]
    UnparseableValue { line: String, raw: String },
    /// A bucket's observations didn't match the schedule's event names at
    /// the same slot, after the schedule and the bucket were both
    /// flattened in order (SPEC_FULL.md §3, "with unchanged event names").
    #[error(
        "schedule misalignment in group {group_index}, slot {slot_index}: expected {expected:?}, found {found:?}"
    )]
    AlignmentMismatch {
        group_index: usize,
        slot_index: usize,
        expected: String,
        found: String,
    },
    /// [`assemble_frames`] was called with no groups to align against.
    #[error("cannot assemble frames against an empty schedule")]
    EmptySchedule,
}

/// Strip the `cpu/.../ ` wrapper the counter reader puts around raw PMU
/// event specs (most visibly on topdown events, e.g.
/// `cpu/topdown-retiring/` -> `topdown-retiring`).
fn normalize_event_name(name: &str) -> String {
    let name = name.strip_prefix("cpu/").unwrap_or(name);
    name.strip_suffix('/').unwrap_or(name).to_string()
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "<not counted>" | "<not supported>" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

/// `"CPU3"` or a bare `"3"` both parse to CPU 3; the counter reader's JSON
/// output has used both forms across versions.
fn parse_cpu_field(raw: &str) -> Option<u32> {
    raw.strip_prefix("CPU").unwrap_or(raw).trim().parse::<u32>().ok()
}

/// Extract just the `interval` field from one JSON observation line, for
/// Stage B's timestamp-based batching ([`crate::pipeline`]). A line that
/// fails to parse here gets no timestamp; it still lands in the current
/// batch, and [`assemble_frames`] reports the real parse error once that
/// batch is flushed.
pub fn peek_timestamp(line: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Peek {
        interval: f64,
    }
    serde_json::from_str::<Peek>(line).ok().map(|p| format!("{:.9}", p.interval))
}

/// Parse one line-delimited JSON observation (SPEC_FULL.md §4.6, "the
/// counter reader must emit one JSON object per line per observation").
fn parse_line(line: &str) -> Result<(String, Observation), FrameError> {
    let parsed: ObservationLine = serde_json::from_str(line).map_err(|source| FrameError::MalformedLine {
        line: line.to_string(),
        detail: source.to_string(),
    })?;

    let value = parse_value(&parsed.counter_value).ok_or_else(|| FrameError::UnparseableValue {
        line: line.to_string(),
        raw: parsed.counter_value.clone(),
    })?;
    let cpu = parsed.cpu.as_deref().and_then(parse_cpu_field);
    let timestamp = format!("{:.9}", parsed.interval);

    Ok((
        timestamp,
        Observation {
            event_name: normalize_event_name(&parsed.event),
            value,
            cpu,
            event_runtime: parsed.event_runtime,
            running_percentage: parsed.running_percentage,
            cgroup: parsed.cgroup,
        },
    ))
}

/// Dedup-and-sum observations sharing an event name, first occurrence's
/// position giving the result order. Used both for per-CPU -> socket
/// accumulation and for collapsing an uncore event's per-device-instance
/// readings into one value (SPEC_FULL.md §4.6, steps 2 and 3): both are the
/// same operation, just applied to a different partition of the input.
///
/// The merged observation keeps the first occurrence's `cgroup`,
/// `event_runtime` and `running_percentage`: these are collection-round
/// properties shared by every instance being summed, not per-instance
/// quantities that should themselves be added.
fn aggregate_duplicates(observations: &[Observation]) -> Vec<Observation> {
    let mut result: Vec<Observation> = Vec::new();
    for obs in observations {
        if let Some(existing) = result.iter_mut().find(|o: &&mut Observation| o.event_name == obs.event_name) {
            existing.value = if existing.value.is_nan() || obs.value.is_nan() {
                f64::NAN
            } else {
                existing.value + obs.value
            };
        } else {
            result.push(Observation {
                event_name: obs.event_name.clone(),
                value: obs.value,
                cpu: None,
                event_runtime: obs.event_runtime,
                running_percentage: obs.running_percentage,
                cgroup: obs.cgroup.clone(),
            });
        }
    }
    result
}

/// Split one timestamp's observations into scope×granularity buckets
/// (SPEC_FULL.md §3, "Scope" and "Granularity"; §4.6, "Bucketing").
///
/// Process scope collapses everything into one pass-through bucket: a
/// fixed list of PIDs is collected as a single aggregate regardless of
/// `granularity`. Cgroup scope buckets by the `cgroup` tag on each
/// observation, one bucket per distinct value, insertion-ordered; a single
/// collection round can interleave several cgroups' lines, so only the
/// assembler (not the caller) can tell them apart. System scope defers to
/// `granularity`.
///
/// Observations with no CPU tag (uncore and "other" events, which the
/// counter reader reports once per collection round regardless of per-CPU
/// mode) are aggregated once and broadcast into every bucket at
/// [`Granularity::Socket`] and [`Granularity::Cpu`]: the packer's uncore
/// expansion (SPEC_FULL.md §4.4) is per-device, not per-socket, so there is
/// no finer home to assign them to.
fn bucket_observations(
    observations: Vec<Observation>,
    metadata: &Metadata,
    scope: &Scope,
    granularity: Granularity,
) -> Vec<(BucketKey, Vec<Observation>)> {
    match scope {
        Scope::Process(_) => {
            vec![(BucketKey::System, aggregate_duplicates(&observations))]
        }
        Scope::Cgroup(_) => {
            let mut by_cgroup: Vec<(String, Vec<Observation>)> = Vec::new();
            for obs in observations {
                let key = obs.cgroup.clone().unwrap_or_default();
                match by_cgroup.iter_mut().find(|(k, _)| k == &key) {
                    Some((_, bucket)) => bucket.push(obs),
                    None => by_cgroup.push((key, vec![obs])),
                }
            }
            by_cgroup
                .into_iter()
                .map(|(cgroup, obs)| (BucketKey::Cgroup(cgroup), aggregate_duplicates(&obs)))
                .collect()
        }
        Scope::System => bucket_by_granularity(observations, metadata, granularity),
    }
}

fn bucket_by_granularity(
    observations: Vec<Observation>,
    metadata: &Metadata,
    granularity: Granularity,
) -> Vec<(BucketKey, Vec<Observation>)> {
    let (tagged, untagged): (Vec<Observation>, Vec<Observation>) =
        observations.into_iter().partition(|o| o.cpu.is_some());

    match granularity {
        Granularity::System => {
            let mut all = tagged;
            all.extend(untagged);
            vec![(BucketKey::System, aggregate_duplicates(&all))]
        }
        Granularity::Socket => {
            let broadcast = aggregate_duplicates(&untagged);
            let mut by_socket: BTreeMap<u32, Vec<Observation>> = BTreeMap::new();
            for obs in tagged {
                if let Some(socket) = obs.cpu.and_then(|cpu| metadata.socket_of(cpu)) {
                    by_socket.entry(socket).or_default().push(obs);
                }
            }
            by_socket
                .into_iter()
                .map(|(socket, obs)| {
                    let mut merged = aggregate_duplicates(&obs);
                    merged.extend(broadcast.clone());
                    (BucketKey::Socket(socket), merged)
                })
                .collect()
        }
        Granularity::Cpu => {
            let broadcast = aggregate_duplicates(&untagged);
            let mut by_cpu: BTreeMap<u32, Vec<Observation>> = BTreeMap::new();
            for obs in tagged {
                if let Some(cpu) = obs.cpu {
                    by_cpu.entry(cpu).or_default().push(obs);
                }
            }
            by_cpu
                .into_iter()
                .map(|(cpu, mut obs)| {
                    obs.extend(broadcast.clone());
                    (BucketKey::Cpu(cpu), obs)
                })
                .collect()
        }
    }
}

/// Check one bucket's observations against the schedule, slot by slot, and
/// split them back into per-group [`EventGroup`]s.
///
/// This compares event names directly rather than counting transitions,
/// which is operationally equivalent when the bucket holds exactly the
/// schedule's event count in schedule order, and additionally catches a
/// same-length, same-transition-count mismatch a pure transition count
/// would miss (SPEC_FULL.md §8's alignment-failure boundary behavior).
fn align_observations(
    observations: &[Observation],
    schedule: &[GroupDefinition],
) -> Result<Vec<EventGroup>, FrameError> {
    let mut cursor = 0;
    let mut groups = Vec::with_capacity(schedule.len());
    for (group_index, def) in schedule.iter().enumerate() {
        let mut group_observations = Vec::with_capacity(def.events.len());
        for (slot_index, (_, expected_name)) in def.events.iter().enumerate() {
            let actual = observations.get(cursor).ok_or_else(|| FrameError::AlignmentMismatch {
                group_index,
                slot_index,
                expected: expected_name.clone(),
                found: "<missing>".to_string(),
            })?;
            if &actual.event_name != expected_name {
                return Err(FrameError::AlignmentMismatch {
                    group_index,
                    slot_index,
                    expected: expected_name.clone(),
                    found: actual.event_name.clone(),
                });
            }
            group_observations.push(actual.clone());
            cursor += 1;
        }
        let running_percentage = group_observations.first().map(|o| o.running_percentage).unwrap_or(100.0);
        groups.push(EventGroup {
            group_index,
            running_percentage,
            observations: group_observations,
        });
    }
    Ok(groups)
}

/// Parse `output` and assemble one [`EventFrame`] per distinct timestamp
/// and bucket, validating each against `schedule`.
pub fn assemble_frames(
    output: &str,
    metadata: &Metadata,
    schedule: &[GroupDefinition],
    scope: &Scope,
    granularity: Granularity,
) -> Result<Vec<EventFrame>, FrameError> {
    if schedule.is_empty() {
        return Err(FrameError::EmptySchedule);
    }

    let mut by_timestamp: Vec<(String, Vec<Observation>)> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (timestamp, observation) = parse_line(line)?;
        match by_timestamp.iter_mut().find(|(t, _)| t == &timestamp) {
            Some((_, bucket)) => bucket.push(observation),
            None => by_timestamp.push((timestamp, vec![observation])),
        }
    }

    let mut frames = Vec::new();
    for (timestamp, observations) in by_timestamp {
        for (bucket, bucket_observations) in bucket_observations(observations, metadata, scope, granularity) {
            let groups = align_observations(&bucket_observations, schedule)?;
            frames.push(EventFrame {
                timestamp: timestamp.clone(),
                bucket,
                groups,
            });
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::synthetic_x86;

    fn def(events: &[(&str, &str)]) -> GroupDefinition {
        GroupDefinition {
            events: events
                .iter()
                .map(|(enc, name)| (enc.to_string(), name.to_string()))
                .collect(),
        }
    }

    fn line(interval: &str, event: &str, value: &str) -> String {
        format!(r#"{{"interval": {interval}, "counter-value": "{value}", "event": "{event}"}}"#)
    }

    fn cpu_line(interval: &str, cpu: &str, event: &str, value: &str) -> String {
        format!(r#"{{"interval": {interval}, "cpu": "{cpu}", "counter-value": "{value}", "event": "{event}"}}"#)
    }

    fn cgroup_line(interval: &str, cgroup: &str, event: &str, value: &str) -> String {
        format!(r#"{{"interval": {interval}, "cgroup": "{cgroup}", "counter-value": "{value}", "event": "{event}"}}"#)
    }

    #[test]
    fn not_counted_and_not_supported_become_nan() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "A")])];
        let output = line("1.000000000", "A", "<not counted>");
        let frames =
            assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::System).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].groups[0].observations[0].value.is_nan());
    }

    #[test]
    fn topdown_event_name_is_normalized() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "topdown-retiring")])];
        let output = line("1.000000000", "cpu/topdown-retiring/", "50");
        let frames =
            assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::System).unwrap();
        assert_eq!(frames[0].groups[0].observations[0].event_name, "topdown-retiring");
    }

    #[test]
    fn uncore_device_instances_are_summed_into_one_observation() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "CHA_CLOCKTICKS")])];
        let output = [
            line("1.000000000", "CHA_CLOCKTICKS", "10"),
            line("1.000000000", "CHA_CLOCKTICKS", "20"),
            line("1.000000000", "CHA_CLOCKTICKS", "30"),
            line("1.000000000", "CHA_CLOCKTICKS", "40"),
        ]
        .join("\n");
        let frames =
            assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::System).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].groups[0].observations[0].value, 100.0);
    }

    #[test]
    fn socket_granularity_sums_sibling_cpus_on_the_same_socket() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "INST_RETIRED.ANY")])];
        // cpus 0 and 1 share socket 0 in synthetic_x86's topology.
        let output = [
            cpu_line("1.000000000", "CPU0", "INST_RETIRED.ANY", "100"),
            cpu_line("1.000000000", "CPU1", "INST_RETIRED.ANY", "200"),
        ]
        .join("\n");
        let frames =
            assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::Socket).unwrap();
        let socket0 = frames
            .iter()
            .find(|f| f.bucket == BucketKey::Socket(0))
            .expect("socket 0 bucket present");
        assert_eq!(socket0.groups[0].observations[0].value, 300.0);
    }

    #[test]
    fn cgroup_scope_buckets_by_distinct_cgroup_value() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "A")])];
        let output = [
            cgroup_line("1.000000000", "/sys/fs/cgroup/a", "A", "10"),
            cgroup_line("1.000000000", "/sys/fs/cgroup/b", "A", "20"),
        ]
        .join("\n");
        let scope = Scope::Cgroup(vec!["/sys/fs/cgroup/a".to_string(), "/sys/fs/cgroup/b".to_string()]);
        let frames = assemble_frames(&output, &metadata, &schedule, &scope, Granularity::System).unwrap();
        assert_eq!(frames.len(), 2);
        let a = frames
            .iter()
            .find(|f| f.bucket == BucketKey::Cgroup("/sys/fs/cgroup/a".to_string()))
            .expect("cgroup a bucket present");
        assert_eq!(a.groups[0].observations[0].value, 10.0);
        let b = frames
            .iter()
            .find(|f| f.bucket == BucketKey::Cgroup("/sys/fs/cgroup/b".to_string()))
            .expect("cgroup b bucket present");
        assert_eq!(b.groups[0].observations[0].value, 20.0);
    }

    #[test]
    fn process_scope_collapses_into_a_single_pass_through_bucket() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "A")])];
        let output = cpu_line("1.000000000", "CPU0", "A", "5");
        let scope = Scope::Process(vec![1234]);
        let frames = assemble_frames(&output, &metadata, &schedule, &scope, Granularity::Cpu).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bucket, BucketKey::System);
        assert_eq!(frames[0].groups[0].observations[0].value, 5.0);
    }

    #[test]
    fn event_group_carries_group_index_and_running_percentage() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e1", "A")]), def(&[("e2", "B")])];
        let output = [
            r#"{"interval": 1.000000000, "counter-value": "1", "event": "A", "pcnt-running": 50.0}"#.to_string(),
            r#"{"interval": 1.000000000, "counter-value": "2", "event": "B", "pcnt-running": 100.0}"#.to_string(),
        ]
        .join("\n");
        let frames =
            assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::System).unwrap();
        assert_eq!(frames[0].groups[0].group_index, 0);
        assert_eq!(frames[0].groups[0].running_percentage, 50.0);
        assert_eq!(frames[0].groups[1].group_index, 1);
        assert_eq!(frames[0].groups[1].running_percentage, 100.0);
    }

    #[test]
    fn mismatched_event_name_at_a_slot_is_an_alignment_error() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e1", "A"), ("e2", "B"), ("e3", "C")])];
        let output = [line("1.000000000", "A", "1"), line("1.000000000", "B", "2"), line("1.000000000", "D", "3")]
            .join("\n");
        let err = assemble_frames(&output, &metadata, &schedule, &Scope::System, Granularity::System).unwrap_err();
        assert!(matches!(err, FrameError::AlignmentMismatch { group_index: 0, slot_index: 2, .. }));
    }

    #[test]
    fn empty_schedule_is_rejected_outright() {
        let metadata = synthetic_x86();
        let output = line("1.0", "A", "1");
        let err = assemble_frames(&output, &metadata, &[], &Scope::System, Granularity::System).unwrap_err();
        assert!(matches!(err, FrameError::EmptySchedule));
    }

    #[test]
    fn malformed_line_is_reported_not_panicked() {
        let metadata = synthetic_x86();
        let schedule = vec![def(&[("e", "A")])];
        let err =
            assemble_frames("garbage\n", &metadata, &schedule, &Scope::System, Granularity::System).unwrap_err();
        assert!(matches!(err, FrameError::MalformedLine { .. }));
    }
}
