//! Shared Prometheus registry handle
//!
//! Whoever builds the executor owns the registry and passes it down; clones
//! share the same underlying metric set.

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::fmt;
use std::sync::Arc;

use super::MetricsError;

/// Cloneable handle to a Prometheus registry
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose metric names are all rendered as `prefix_<name>`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Registry::with_prefix(prefix))),
        }
    }

    /// The shared registry, for registering metric families
    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        Arc::clone(&self.inner)
    }

    /// Render every registered metric in the OpenMetrics text format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut out = String::new();
        encode(&mut out, &self.inner.read())
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;
        Ok(out)
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::metrics::counter::Counter;

    #[test]
    fn empty_registry_encodes() {
        let out = MetricsRegistry::new().encode().unwrap();
        assert!(out.contains("# EOF"));
    }

    #[test]
    fn clones_see_the_same_metrics() {
        let original = MetricsRegistry::with_prefix("sales_kpi");
        let copy = original.clone();
        assert!(Arc::ptr_eq(&original.registry(), &copy.registry()));

        let counter: Counter = Counter::default();
        original
            .registry()
            .write()
            .register("ticks", "Tick counter", counter.clone());
        counter.inc();

        assert!(copy.encode().unwrap().contains("sales_kpi_ticks_total 1"));
    }
}
