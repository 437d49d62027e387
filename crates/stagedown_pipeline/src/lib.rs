//! # Stagedown Pipeline - Main Entry Point
//!
//! A small multi-stage pipeline process wired to the `stagedown` shutdown
//! coordinator. Each configured stage is one shutdown target; on SIGINT or
//! SIGTERM the stages are stopped upstream first, each one finishing its
//! buffered input before the next is closed.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! stagedown-pipeline
//!
//! # Specify custom configuration
//! stagedown-pipeline --config production.toml
//!
//! # Tighter shutdown budget, JSON logs
//! stagedown-pipeline --force-kill-window-ms 2000 --json-logs
//! ```
//!
//! ## Configuration
//!
//! The process loads configuration from a TOML file (default:
//! `pipeline.toml`). If the file doesn't exist, a default configuration will
//! be created.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod pipeline;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, PipelineSettings};
pub use pipeline::{Item, PipelineStats};

/// Runs the pipeline process.
///
/// 1. Command-line argument parsing
/// 2. Configuration loading and logging initialization
/// 3. Pipeline start and staged shutdown
///
/// # Exit Codes
///
/// * **0**: Every stage drained after a termination signal
/// * **1**: Error during startup or configuration
/// * **force exit code** (default 1): shutdown window elapsed
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let level = args.log_level.clone().unwrap_or(config.logging.level.clone());
    let logging = LoggingSettings {
        level,
        ..config.logging
    };
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
