//! Configuration management for the sales KPI engine
//!
//! Settings are layered: an optional YAML file, then environment variables
//! prefixed with `SALES_KPI_`. Nested keys are separated by `__`, so
//! `SALES_KPI_SOURCE__KIND=file` sets `source.kind`.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use processor::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub const ENV_PREFIX: &str = "SALES_KPI_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete application configuration
///
/// Engine settings live at the top level of the file; logging settings
/// under `observability`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, then validate it
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(config_path)
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider chain, without extraction
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.observability.validate()
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "observability.log_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use processor::config::{SinkConfig, SourceKind};
    use processor::core::GroupBy;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.engine.specs.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.engine.source.kind, SourceKind::Memory);
            assert_eq!(config.engine.specs[0].id, "time_wise_kpi");
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sales-kpi.yaml",
                r#"
source:
  kind: file
  path: events.jsonl
stop_at_source_end: true
observability:
  log_format: json
specs:
  - id: by_country
    window_size_ms: 30000
    group_by: country
    metrics: [total_volume_of_sales, OPM]
    sink: { kind: json_directory, path: out/by_country }
"#,
            )?;

            let config =
                AppConfig::load(Some(Path::new("sales-kpi.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.engine.source.kind, SourceKind::File);
            assert!(config.engine.stop_at_source_end);
            assert_eq!(config.observability.log_format, LogFormat::Json);
            assert_eq!(config.engine.specs.len(), 1);

            let spec = &config.engine.specs[0];
            assert_eq!(spec.window_size_ms, 30_000);
            assert_eq!(spec.allowed_lateness_ms, 60_000);
            assert_eq!(spec.group_by, GroupBy::Country);
            assert_eq!(
                spec.sink,
                SinkConfig::JsonDirectory {
                    path: PathBuf::from("out/by_country")
                }
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("sales-kpi.yaml", "channel_capacity: 64\n")?;
            jail.set_env("SALES_KPI_CHANNEL_CAPACITY", "16");
            jail.set_env("SALES_KPI_OBSERVABILITY__LOG_LEVEL", "debug");

            let config =
                AppConfig::load(Some(Path::new("sales-kpi.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.engine.channel_capacity, 16);
            assert_eq!(config.observability.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sales-kpi.yaml",
                r#"
specs:
  - id: broken
    window_size_ms: 0
    metrics: [OPM]
    sink: { kind: console }
"#,
            )?;

            let err = AppConfig::load(Some(Path::new("sales-kpi.yaml"))).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)));
            Ok(())
        });
    }

    #[test]
    fn test_observability_validation() {
        let mut config = AppConfig::default();
        config.observability.log_level = " ".to_string();
        assert!(config.validate().is_err());
    }
}
