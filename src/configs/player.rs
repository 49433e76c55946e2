use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Delay before retrying after a failed stream or player error.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl PlaybackConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    5000
}
