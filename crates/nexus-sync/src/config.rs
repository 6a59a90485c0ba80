use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// PollIntervals
// ---------------------------------------------------------------------------

/// Per-resource polling cadence, in seconds.
///
/// The run list is deliberately fast: pipeline stages can transition in
/// under a second, and the timeline view tracks them live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollIntervals {
    #[serde(default = "default_services_secs")]
    pub services_secs: u64,
    #[serde(default = "default_activity_secs")]
    pub activity_secs: u64,
    #[serde(default = "default_runs_secs")]
    pub runs_secs: u64,
    #[serde(default = "default_messages_secs")]
    pub messages_secs: u64,
}

fn default_services_secs() -> u64 {
    30
}

fn default_activity_secs() -> u64 {
    15
}

fn default_runs_secs() -> u64 {
    2
}

fn default_messages_secs() -> u64 {
    30
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            services_secs: default_services_secs(),
            activity_secs: default_activity_secs(),
            runs_secs: default_runs_secs(),
            messages_secs: default_messages_secs(),
        }
    }
}

impl PollIntervals {
    pub fn services(&self) -> Duration {
        Duration::from_secs(self.services_secs)
    }

    pub fn activity(&self) -> Duration {
        Duration::from_secs(self.activity_secs)
    }

    pub fn runs(&self) -> Duration {
        Duration::from_secs(self.runs_secs)
    }

    pub fn messages(&self) -> Duration {
        Duration::from_secs(self.messages_secs)
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Configuration surface consumed by the synchronization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL for REST calls, e.g. `http://localhost:8000`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL for the push channel, e.g. `ws://localhost:8000`.
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
    #[serde(default)]
    pub poll: PollIntervals,
    /// Retained pulses in the live event buffer.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Retained derived notifications.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Wait after a confirmed write before re-polling, so the backend has
    /// time to reflect the change.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// How long an unconfirmed optimistic patch may shadow the
    /// authoritative snapshot before it is rolled back.
    #[serde(default = "default_pending_max_age_secs")]
    pub pending_max_age_secs: u64,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_ws_base() -> String {
    "ws://localhost:8000".to_string()
}

fn default_event_capacity() -> usize {
    100
}

fn default_notification_capacity() -> usize {
    20
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_pending_max_age_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ws_base: default_ws_base(),
            poll: PollIntervals::default(),
            event_capacity: default_event_capacity(),
            notification_capacity: default_notification_capacity(),
            settle_delay_ms: default_settle_delay_ms(),
            pending_max_age_secs: default_pending_max_age_secs(),
        }
    }
}

impl SyncConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn pending_max_age(&self) -> Duration {
        Duration::from_secs(self.pending_max_age_secs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: SyncConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadences() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.poll.services(), Duration::from_secs(30));
        assert_eq!(cfg.poll.activity(), Duration::from_secs(15));
        assert_eq!(cfg.poll.runs(), Duration::from_secs(2));
        assert_eq!(cfg.poll.messages(), Duration::from_secs(30));
        assert_eq!(cfg.event_capacity, 100);
        assert_eq!(cfg.notification_capacity, 20);
        assert_eq!(cfg.settle_delay(), Duration::from_millis(500));
        assert_eq!(cfg.pending_max_age(), Duration::from_secs(30));
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = SyncConfig {
            api_base: "http://nexus.internal:9000".into(),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: SyncConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "api_base: http://10.0.0.5:8000\npoll:\n  runs_secs: 5\n";
        let cfg: SyncConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.api_base, "http://10.0.0.5:8000");
        assert_eq!(cfg.ws_base, "ws://localhost:8000");
        assert_eq!(cfg.poll.runs_secs, 5);
        assert_eq!(cfg.poll.services_secs, 30);
    }

    #[test]
    fn load_and_save_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sync.yaml");
        let cfg = SyncConfig::default();
        cfg.save(&path).unwrap();
        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }
}
