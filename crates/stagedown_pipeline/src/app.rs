//! Main application logic and lifecycle management.
//!
//! The `Application` loads configuration, builds the pipeline stages, and
//! hands control to the shutdown coordinator until the process is asked to
//! stop.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, pipeline};
use stagedown::{Coordinator, ShutdownOutcome, ShutdownReport};
use tracing::{error, info};

/// Main application struct.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Some(window_ms) = args.force_kill_window_ms {
            config.shutdown.force_kill_window_ms = window_ms;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Builds the pipeline and blocks until shutdown has drained every stage.
    pub async fn run(self) -> Result<ShutdownReport, Box<dyn std::error::Error>> {
        let coordinator = Coordinator::from_settings(&self.config.shutdown)?;
        self.run_with(coordinator).await
    }

    /// Runs against a caller-built coordinator.
    pub async fn run_with(
        self,
        mut coordinator: Coordinator,
    ) -> Result<ShutdownReport, Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let stats = pipeline::build(&self.config.pipeline, &mut coordinator)?;

        info!("✅ Pipeline is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        match coordinator.wait_and_shutdown().await {
            ShutdownOutcome::Drained(report) => {
                info!("📊 Final Statistics:");
                info!("  - Items produced: {}", stats.produced());
                info!("  - Items delivered: {}", stats.delivered());
                info!("  - Items dropped: {}", stats.dropped());
                for target in &report.targets {
                    info!(
                        "  - Stage {}: {} closers, {} channels, drained in {:?}",
                        target.name,
                        target.released.closers_closed,
                        target.released.channels_closed,
                        target.elapsed
                    );
                }
                info!("✅ Pipeline shutdown complete in {:?}", report.elapsed);
                Ok(report)
            }
            ShutdownOutcome::ForceKilled { stalled_target, .. } => {
                let stage = stalled_target.unwrap_or_else(|| "<none>".to_string());
                error!("❌ Forced exit while draining stage {}", stage);
                Err(format!("shutdown timed out while draining stage {stage}").into())
            }
        }
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🧵 Stages: {}", self.config.pipeline.stages.join(" → "));
        info!("  📦 Channel capacity: {}", self.config.pipeline.channel_capacity);
        info!(
            "  ⏱️ Force-kill window: {:?}",
            self.config.shutdown.force_kill_window()
        );
    }
}
