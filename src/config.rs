use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine settings. Timing fields are what the reconciler schedules by;
/// the defaults match the original widget's cadence and can be tuned
/// without touching the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Reconciler tick granularity. Correctness does not depend on the
    /// exact rate; it only bounds progress smoothness.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Full poll budget window: time between unforced polls.
    #[serde(default = "default_poll_window_ms")]
    pub poll_window_ms: u64,
    /// How long after a user action polls stay forced while the action
    /// is unacknowledged.
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
    /// A fresh poll position within this distance of the local one is
    /// ignored to avoid visible jumps from network jitter.
    #[serde(default = "default_reconcile_threshold_ms")]
    pub reconcile_threshold_ms: u64,
    /// Poll eagerly once the extrapolated position gets this close to
    /// the end of the track, to catch the advance promptly.
    #[serde(default = "default_track_end_margin_ms")]
    pub track_end_margin_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost:5173".to_string()
}

fn default_tick_ms() -> u64 {
    50
}

fn default_poll_window_ms() -> u64 {
    2_000
}

fn default_settle_window_ms() -> u64 {
    1_500
}

fn default_reconcile_threshold_ms() -> u64 {
    1_000
}

fn default_track_end_margin_ms() -> u64 {
    1_500
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            tick_ms: default_tick_ms(),
            poll_window_ms: default_poll_window_ms(),
            settle_window_ms: default_settle_window_ms(),
            reconcile_threshold_ms: default_reconcile_threshold_ms(),
            track_end_margin_ms: default_track_end_margin_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn config_dir() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".nowbar"))
    }

    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> AppResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Err(AppError::Config(
                "Config file not found. Please run setup.".into(),
            ));
        }
        let content = std::fs::read_to_string(&path)?;
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self) -> AppResult<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        let path = Self::config_path()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"client_id":"abc"}"#).unwrap();
        assert_eq!(settings.client_id, "abc");
        assert_eq!(settings.tick_ms, 50);
        assert_eq!(settings.poll_window_ms, 2_000);
        assert_eq!(settings.settle_window_ms, 1_500);
        assert_eq!(settings.reconcile_threshold_ms, 1_000);
    }
}
