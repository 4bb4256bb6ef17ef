//! Crate-wide error types.
//!
//! Fatal phases (catalog loading, formula compilation) return `Result<_,
//! MetricsError>`. Non-fatal conditions — an unsupported event, a dropped
//! report-metric entry, a NaN observation — are never represented as
//! errors; they are logged with [`log::warn!`] and the offending item is
//! dropped, per the policy in SPEC_FULL.md §7.

use std::path::PathBuf;

use thiserror::Error;

use crate::expr::CompileError;

/// Top-level error type for the catalog-loading and formula-compilation
/// phases.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// An embedded or override catalog file could not be found.
    #[error("catalog file not found: {path}")]
    CatalogFileNotFound {
        /// Logical path that was looked up in the resource tree.
        path: String,
    },

    /// A catalog file on the override filesystem path could not be read.
    #[error("could not read catalog file {path}: {source}")]
    CatalogIo {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A catalog file's contents did not parse as the expected JSON schema.
    #[error("malformed catalog file {path}: {source}")]
    CatalogJson {
        /// Path (or logical resource-tree path) of the offending file.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A `ReportMetrics` entry named an origin other than `perfmon` or
    /// `perfspect`.
    #[error("unknown report-metric origin {origin:?} for legacy name {legacy_name}")]
    UnknownOrigin {
        /// The offending origin string.
        origin: String,
        /// The `LegacyName` of the report-metric entry.
        legacy_name: String,
    },

    /// A metric's formula failed to compile.
    #[error("formula compile error in metric {metric_name}: {source}")]
    Compile {
        /// The metric's user-facing name.
        metric_name: String,
        /// The underlying compiler error.
        #[source]
        source: CompileError,
    },
}
