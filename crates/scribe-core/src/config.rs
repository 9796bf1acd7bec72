use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSyncConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_stop_check_interval_ms")]
    pub stop_check_interval_ms: u64,
    #[serde(default = "default_retain_manifest_while_reconnecting")]
    pub retain_manifest_while_reconnecting: bool,
}

impl Default for RuntimeSyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            stop_check_interval_ms: default_stop_check_interval_ms(),
            retain_manifest_while_reconnecting: default_retain_manifest_while_reconnecting(),
        }
    }
}

impl RuntimeSyncConfig {
    pub fn normalized_poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn normalized_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(100))
    }

    pub fn normalized_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(100))
    }

    pub fn normalized_stop_check_interval(&self) -> Duration {
        Duration::from_millis(self.stop_check_interval_ms.max(1))
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_fetch_timeout_ms() -> u64 {
    3_000
}

fn default_stop_check_interval_ms() -> u64 {
    25
}

fn default_retain_manifest_while_reconnecting() -> bool {
    true
}
