//! Shutdown configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ShutdownError;

pub(crate) const MIN_FORCE_EXIT_CODE: i32 = 1;
pub(crate) const MAX_FORCE_EXIT_CODE: i32 = 255;

fn default_force_kill_window_ms() -> u64 {
    5000
}

fn default_force_exit_code() -> i32 {
    1
}

/// Tunables for the [`Coordinator`](crate::Coordinator).
///
/// Deserializes from a `[shutdown]` table; missing fields fall back to a
/// five second window and exit status 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSettings {
    /// Time allowed for the whole kill sequence, in milliseconds
    #[serde(default = "default_force_kill_window_ms")]
    pub force_kill_window_ms: u64,
    /// Status passed to the exit hook when the window elapses
    #[serde(default = "default_force_exit_code")]
    pub force_exit_code: i32,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            force_kill_window_ms: default_force_kill_window_ms(),
            force_exit_code: default_force_exit_code(),
        }
    }
}

impl ShutdownSettings {
    /// The configured window as a `Duration`.
    pub fn force_kill_window(&self) -> Duration {
        Duration::from_millis(self.force_kill_window_ms)
    }

    /// Checks the settings for values the coordinator cannot honor.
    pub fn validate(&self) -> Result<(), ShutdownError> {
        if self.force_kill_window_ms == 0 {
            return Err(ShutdownError::InvalidSettings(
                "force_kill_window_ms must be greater than 0".to_string(),
            ));
        }

        // A forced exit must be distinguishable from a clean one
        if !(MIN_FORCE_EXIT_CODE..=MAX_FORCE_EXIT_CODE).contains(&self.force_exit_code) {
            return Err(ShutdownError::InvalidSettings(format!(
                "force_exit_code must be between 1 and 255, got {}",
                self.force_exit_code
            )));
        }

        Ok(())
    }
}
