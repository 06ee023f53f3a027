//! Pipeline health registry

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineHealth {
    Starting,
    Running,
    /// Stopped by a fatal error; other pipelines keep running
    Halted { reason: String },
    Stopped,
}

impl PipelineHealth {
    pub fn is_halted(&self) -> bool {
        matches!(self, PipelineHealth::Halted { .. })
    }
}

impl fmt::Display for PipelineHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineHealth::Starting => f.write_str("starting"),
            PipelineHealth::Running => f.write_str("running"),
            PipelineHealth::Halted { reason } => write!(f, "halted: {}", reason),
            PipelineHealth::Stopped => f.write_str("stopped"),
        }
    }
}

/// Shared map of pipeline id to health
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<BTreeMap<String, PipelineHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pipeline: &str, health: PipelineHealth) {
        self.inner.write().insert(pipeline.to_string(), health);
    }

    pub fn get(&self, pipeline: &str) -> Option<PipelineHealth> {
        self.inner.read().get(pipeline).cloned()
    }

    /// Every pipeline's health, sorted by id
    pub fn snapshot(&self) -> BTreeMap<String, PipelineHealth> {
        self.inner.read().clone()
    }

    pub fn any_halted(&self) -> bool {
        self.inner.read().values().any(PipelineHealth::is_halted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_shared() {
        let registry = HealthRegistry::new();
        let observer = registry.clone();

        registry.set("a", PipelineHealth::Running);
        registry.set(
            "b",
            PipelineHealth::Halted {
                reason: "disk full".to_string(),
            },
        );

        assert_eq!(observer.get("a"), Some(PipelineHealth::Running));
        assert!(observer.any_halted());
        assert_eq!(observer.snapshot().len(), 2);
        assert_eq!(observer.get("b").unwrap().to_string(), "halted: disk full");
    }
}
