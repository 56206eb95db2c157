//! Transport configuration, loadable from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for queues, workers, and outbound connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of each per-replica outbound queue.
    pub send_buffer_size: usize,
    /// A worker whose queue stays empty this long shuts down.
    pub idle_timeout_ms: u64,
    /// Capacity of the snapshot status notification channel.
    pub snapshot_status_buffer: usize,
    /// Messages buffered between a worker and its gRPC request body.
    pub stream_buffer_size: usize,
    /// Dial timeout for outbound connections.
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: 100,
            idle_timeout_ms: 60_000,
            snapshot_status_buffer: 1,
            stream_buffer_size: 8,
            connect_timeout_ms: 5_000,
        }
    }
}

impl TransportConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: TransportConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero capacities and timeouts.
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("send_buffer_size", self.send_buffer_size as u64),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("snapshot_status_buffer", self.snapshot_status_buffer as u64),
            ("stream_buffer_size", self.stream_buffer_size as u64),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self
    }
}
