//! Configuration management for the pipeline process.
//!
//! This module handles loading and validation of the pipeline configuration
//! from TOML files. The `[shutdown]` table is handed straight to the
//! coordinator.

use serde::{Deserialize, Serialize};
use stagedown::ShutdownSettings;
use std::path::PathBuf;
use tracing::info;

fn default_channel_capacity() -> usize {
    64
}

fn default_producer_interval_ms() -> u64 {
    100
}

fn default_stages() -> Vec<String> {
    vec![
        "source".to_string(),
        "parse".to_string(),
        "enrich".to_string(),
        "sink".to_string(),
    ]
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Shutdown coordinator settings
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    /// Pipeline layout settings
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Pipeline layout.
///
/// The first stage produces items, every later stage consumes the output of
/// the one before it. Stages shut down in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Stage names, upstream first
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Capacity of the channel feeding each stage
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Delay between two items emitted by the source stage, in milliseconds
    #[serde(default = "default_producer_interval_ms")]
    pub producer_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            channel_capacity: default_channel_capacity(),
            producer_interval_ms: default_producer_interval_ms(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written to
    /// the path and the defaults are returned.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        self.shutdown.validate().map_err(|e| e.to_string())?;

        if self.pipeline.stages.len() < 2 {
            return Err("pipeline.stages needs at least a source and a sink".to_string());
        }

        if let Some(empty) = self.pipeline.stages.iter().position(|s| s.trim().is_empty()) {
            return Err(format!("pipeline.stages[{empty}] has an empty name"));
        }

        if self.pipeline.channel_capacity == 0 {
            return Err("pipeline.channel_capacity must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.shutdown.force_kill_window_ms, 5000);
        assert_eq!(config.shutdown.force_exit_code, 1);
        assert_eq!(config.pipeline.stages, vec!["source", "parse", "enrich", "sink"]);
        assert_eq!(config.pipeline.channel_capacity, 64);
        assert_eq!(config.pipeline.producer_interval_ms, 100);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config.pipeline.stages.len(), 4);
        assert!(path.exists());

        // The written file loads back to the same settings
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.shutdown, config.shutdown);
        assert_eq!(reloaded.pipeline.stages, config.pipeline.stages);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[shutdown]
force_kill_window_ms = 1500
force_exit_code = 3

[pipeline]
stages = ["ingest", "sink"]
channel_capacity = 8

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        assert_eq!(config.shutdown.force_kill_window_ms, 1500);
        assert_eq!(config.shutdown.force_exit_code, 3);
        assert_eq!(config.pipeline.stages, vec!["ingest", "sink"]);
        assert_eq!(config.pipeline.channel_capacity, 8);
        assert_eq!(config.pipeline.producer_interval_ms, 100);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[pipeline\nstages = ").await.unwrap();

        let result = AppConfig::load_from_file(&temp_file.path().to_path_buf()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();

        config.pipeline.stages = vec!["only".to_string()];
        assert!(config.validate().is_err());

        config.pipeline.stages = vec!["source".to_string(), " ".to_string()];
        assert!(config.validate().is_err());

        config.pipeline.stages = vec!["source".to_string(), "sink".to_string()];
        config.pipeline.channel_capacity = 0;
        assert!(config.validate().is_err());

        config.pipeline.channel_capacity = 1;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "warn".to_string();
        config.shutdown.force_kill_window_ms = 0;
        assert!(config.validate().is_err());

        config.shutdown.force_kill_window_ms = 10;
        assert!(config.validate().is_ok());
    }
}
