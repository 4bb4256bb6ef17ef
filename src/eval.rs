//! The metric evaluator (C7): resolves a compiled metric's variables
//! against an assembled frame and walks its expression tree.
//!
//! The one thing worth optimizing here is the variable lookup: a frame's
//! groups are a flat list of small per-group observation lists, and a
//! naive implementation would scan every group for every variable of every
//! metric, every frame. [`evaluate_frame`] instead remembers, in
//! [`crate::catalog::MetricDefinition::group_index_cache`], which group
//! index satisfied a metric's variables last time, and tries that group
//! first. The cache is a single `AtomicIsize`, shared across however many
//! concurrent bucket tasks are evaluating this metric
//! ([`crate::pipeline`]'s Stage C); a stale or racing write only costs a
//! wasted linear scan; it is fixed back up immediately by the code path
//! below.

use std::sync::atomic::Ordering;

use crate::catalog::MetricDefinition;
use crate::frame::{BucketKey, EventFrame};
use crate::metadata::Metadata;

/// One metric's evaluated value for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFrame {
    pub metric_name: String,
    pub timestamp: String,
    pub bucket: BucketKey,
    /// The evaluated formula value. NaN if any referenced event was
    /// uncollected or unresolvable (SPEC_FULL.md §4.3, NaN propagation).
    pub value: f64,
    /// The evaluated threshold expression, if the metric's catalog entry
    /// had one.
    pub threshold: Option<f64>,
}

/// Find `name`'s value anywhere in `frame`, scanning every group.
fn find_anywhere(frame: &EventFrame, name: &str) -> Option<f64> {
    frame
        .groups
        .iter()
        .flat_map(|g| g.observations.iter())
        .find(|o| o.event_name == name)
        .map(|o| o.value)
}

/// Try to resolve every one of `variables` from a single group, the fast
/// path's group index first.
fn resolve_within_group(frame: &EventFrame, group_index: usize, variables: &[String]) -> Option<Vec<f64>> {
    let group = frame.groups.get(group_index)?;
    let mut values = Vec::with_capacity(variables.len());
    for var in variables {
        let value = group.observations.iter().find(|o| &o.event_name == var)?.value;
        values.push(value);
    }
    Some(values)
}

/// Resolve `variables` against `frame`, trying the cached group index
/// first, then falling back to a search over every group for one that
/// holds all of them, then (if no single group does) resolving each
/// variable independently, missing ones becoming NaN.
///
/// Returns the resolved values and, if a single group satisfied every
/// variable, that group's index (to refresh the cache with).
fn resolve_variables(
    metric: &MetricDefinition,
    frame: &EventFrame,
) -> (Vec<f64>, Option<usize>) {
    let variables = metric.referenced_events();
    let cached = metric.group_index_cache.load(Ordering::Relaxed);
    if cached >= 0 {
        if let Some(values) = resolve_within_group(frame, cached as usize, variables) {
            return (values, Some(cached as usize));
        }
    }

    for (group_index, _) in frame.groups.iter().enumerate() {
        if let Some(values) = resolve_within_group(frame, group_index, variables) {
            let _ = metric.group_index_cache.compare_exchange(
                cached,
                group_index as isize,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            return (values, Some(group_index));
        }
    }

    let values = variables
        .iter()
        .map(|var| find_anywhere(frame, var).unwrap_or(f64::NAN))
        .collect();
    (values, None)
}

/// Evaluate one metric's formula (and threshold, if any) against one
/// assembled frame.
pub fn evaluate_frame(metric: &MetricDefinition, frame: &EventFrame, metadata: &Metadata) -> MetricFrame {
    let (values, _group_index) = resolve_variables(metric, frame);
    let value = crate::expr::eval(&metric.compiled.ast, &values, metadata.arm_current_cpuid);

    let threshold = metric.threshold.as_ref().map(|compiled| {
        let threshold_values: Vec<f64> = compiled
            .variables
            .iter()
            .map(|var| find_anywhere(frame, var).unwrap_or(f64::NAN))
            .collect();
        crate::expr::eval(&compiled.ast, &threshold_values, metadata.arm_current_cpuid)
    });

    MetricFrame {
        metric_name: metric.name.clone(),
        timestamp: frame.timestamp.clone(),
        bucket: frame.bucket,
        value,
        threshold,
    }
}

/// Evaluate every metric in `metrics` against one frame.
pub fn evaluate_all(metrics: &[MetricDefinition], frame: &EventFrame, metadata: &Metadata) -> Vec<MetricFrame> {
    metrics.iter().map(|m| evaluate_frame(m, frame, metadata)).collect()
}
