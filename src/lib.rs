//! Catalog-driven PMU metrics: load, compile, pack, and evaluate.
//!
//! This crate turns a catalog of hardware performance-monitoring (PMU)
//! metric formulas into two things:
//!
//! - a minimal set of counter-group schedules that the `perf stat` tool (or
//!   an equivalent counter reader) can execute, and
//! - a real-time pipeline that parses that tool's output, reconstitutes
//!   per-timestamp counter values, and evaluates each metric's arithmetic
//!   expression into a stream of [`eval::MetricFrame`]s.
//!
//! The crate is organized the way the catalog flows through it:
//!
//! - [`metadata`] describes the microarchitecture being measured.
//! - [`catalog`] loads the on-disk (or embedded) catalog files.
//! - [`events`] holds typed registries for core, uncore, and "other" events
//!   and decides whether a given event can be collected on this platform.
//! - [`expr`] rewrites and compiles a catalog formula string into an
//!   evaluable expression tree.
//! - [`group`] bin-packs the events a compiled metric needs into counter
//!   groups that respect the platform's hardware constraints.
//! - [`frame`] parses the counter reader's line-delimited output into
//!   [`frame::EventFrame`]s.
//! - [`eval`] evaluates each metric's compiled expression against an
//!   `EventFrame` to produce a [`eval::MetricFrame`].
//! - [`pipeline`] wires `frame` and `eval` together into a cancellable,
//!   three-stage asynchronous pipeline.
//!
//! Spawning the counter-reading process, discovering the microarchitecture
//! from CPUID, and rendering output are all out of scope for this crate;
//! see the trait boundaries in [`pipeline`] and the [`metadata::Metadata`]
//! type for where those collaborators plug in.

pub mod catalog;
pub mod error;
pub mod eval;
pub mod events;
pub mod expr;
pub mod frame;
pub mod group;
pub mod metadata;
pub mod pipeline;

pub use error::MetricsError;
pub use metadata::Metadata;
