//! The catalog subsystem (C1 + C2): resolves a microarchitecture tag to an
//! embedded event/metric catalog and compiles every reportable metric.
//!
//! [`loader::load`] is the entry point; its [`loader::LoadedCatalog`] output
//! feeds the group packer (C4) and, later, the metric evaluator (C7).

pub mod loader;
pub mod metric;
pub mod resource;
pub mod schema;

pub use loader::{load, CatalogFlavour, LoaderConfig, LoadedCatalog};
pub use metric::MetricDefinition;
