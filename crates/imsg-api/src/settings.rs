//! Runtime settings read from an optional JSON file.
//!
//! Every key has a default, so a missing or partial file still yields a
//! complete configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Seconds between live-channel polls.
    pub websocket_poll_interval: f64,

    /// Max rows pushed per live-channel batch.
    pub websocket_batch_limit: u32,

    /// Idle poll cycles before a keepalive ping.
    pub websocket_ping_cycles: u32,

    /// Successful sends allowed per window.
    pub send_rate_limit: usize,

    pub send_rate_window_secs: u64,

    /// Upper bound on one `osascript` invocation.
    pub send_timeout_secs: u64,

    /// Overrides `~/Library/Messages/chat.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            websocket_poll_interval: 1.0,
            websocket_batch_limit: 100,
            websocket_ping_cycles: 30,
            send_rate_limit: 10,
            send_rate_window_secs: 60,
            send_timeout_secs: 30,
            db_path: None,
        }
    }
}

impl Settings {
    /// Read `path`, falling back to defaults (with a warning) when the file
    /// is missing or invalid. Unknown keys are ignored.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Cannot read config {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("Invalid config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Replace out-of-range values with their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.websocket_poll_interval.is_finite() || self.websocket_poll_interval <= 0.0 {
            warn!(
                "websocket_poll_interval must be positive, got {}",
                self.websocket_poll_interval
            );
            self.websocket_poll_interval = defaults.websocket_poll_interval;
        }
        if self.websocket_batch_limit == 0 {
            self.websocket_batch_limit = defaults.websocket_batch_limit;
        }
        if self.websocket_ping_cycles == 0 {
            self.websocket_ping_cycles = defaults.websocket_ping_cycles;
        }
        if self.send_rate_window_secs == 0 {
            self.send_rate_window_secs = defaults.send_rate_window_secs;
        }
        if self.send_timeout_secs == 0 {
            self.send_timeout_secs = defaults.send_timeout_secs;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.websocket_poll_interval)
    }

    pub fn send_rate_window(&self) -> Duration {
        Duration::from_secs(self.send_rate_window_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}
