use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_TIMEOUT_SECS: &str = "CIPHER_WORKER_TIMEOUT_SECS";
pub const ENV_REPORT_ERRORS: &str = "CIPHER_WORKER_REPORT_ERRORS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long the host waits for a response before giving up.
    #[serde(default = "default_timeout_secs")]
    pub response_timeout_secs: u64,
    /// Post an `errorResponse` when a request fails instead of staying silent.
    #[serde(default)]
    pub report_errors: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: default_timeout_secs(),
            report_errors: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl WorkerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            config.response_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_TIMEOUT_SECS}={raw:?}: {e}"))?;
        }
        if let Ok(raw) = std::env::var(ENV_REPORT_ERRORS) {
            config.report_errors = parse_flag(&raw)
                .ok_or_else(|| anyhow::anyhow!("{ENV_REPORT_ERRORS}={raw:?}: expected a boolean"))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.response_timeout_secs == 0 {
            anyhow::bail!("response timeout must be at least one second");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel capacity must be at least 1");
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
