//! Read-only virtual filesystem over the embedded catalog bundle.
//!
//! Catalog JSON ships inside the binary via [`include_dir::include_dir!`]
//! (the same pattern this corpus uses for bundling static resource trees).
//! [`ResourceTree`] is the thin facade the loader actually talks to: it
//! normalises logical paths and turns a missing/garbled file into a
//! [`crate::MetricsError`] instead of an `Option`/`panic`.

use include_dir::{include_dir, Dir};

use crate::error::MetricsError;

/// The embedded catalog bundle, keyed `<family>/<uarch>/<file>`.
static CATALOG: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/src/catalog/resources");

/// A read-only view over the embedded catalog bundle, or (for the override
/// path named in [`crate::catalog::loader::LoaderConfig`]) the real
/// filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceTree;

impl ResourceTree {
    /// Read a logical path (e.g. `"x86/spr/metrics.config.json"`) from the
    /// embedded bundle.
    pub fn read_to_string(&self, logical_path: &str) -> Result<String, MetricsError> {
        let file = CATALOG
            .get_file(logical_path)
            .ok_or_else(|| MetricsError::CatalogFileNotFound {
                path: logical_path.to_string(),
            })?;
        file.contents_utf8()
            .map(str::to_string)
            .ok_or_else(|| MetricsError::CatalogFileNotFound {
                path: logical_path.to_string(),
            })
    }

    /// Whether a logical path names a directory in the embedded bundle.
    pub fn has_dir(&self, logical_path: &str) -> bool {
        CATALOG.get_dir(logical_path).is_some()
    }

    /// Parse a logical path's contents as JSON.
    pub fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        logical_path: &str,
    ) -> Result<T, MetricsError> {
        let text = self.read_to_string(logical_path)?;
        serde_json::from_str(&text).map_err(|source| MetricsError::CatalogJson {
            path: logical_path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_x86_metrics_config_is_present() {
        let tree = ResourceTree;
        let text = tree
            .read_to_string("x86/spr/metrics.config.json")
            .expect("embedded resource should be present");
        assert!(text.contains("ReportMetrics"));
    }

    #[test]
    fn embedded_arm_component_catalog_is_present() {
        let tree = ResourceTree;
        let text = tree
            .read_to_string("arm/neoverse-n1/component.metrics.json")
            .expect("embedded ARM resource should be present");
        assert!(text.contains("MetricExpr"));
    }

    #[test]
    fn missing_path_is_reported_not_panicked() {
        let tree = ResourceTree;
        let err = tree.read_to_string("x86/spr/does-not-exist.json").unwrap_err();
        assert!(matches!(err, MetricsError::CatalogFileNotFound { .. }));
    }
}
