//! Public tunnel configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Settings for the external forwarding agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Publish the server through the agent; when false only the local
    /// address is printed
    pub enabled: bool,

    /// Agent executable, looked up on `PATH` unless it contains a `/`
    pub agent: String,

    /// Terminal width given to the agent. The agent only prints its status
    /// screen when it believes it is attached to a terminal.
    pub window_cols: u16,

    /// Terminal height given to the agent
    pub window_rows: u16,

    /// How long to wait for the agent to report its public address
    /// (0 = wait until canceled)
    #[serde(with = "duration_secs")]
    pub startup_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            agent: "ngrok".to_string(),
            window_cols: 100,
            window_rows: 100,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

impl TunnelConfig {
    /// The startup deadline, if any
    pub fn startup_deadline(&self) -> Option<Duration> {
        if self.startup_timeout.is_zero() {
            None
        } else {
            Some(self.startup_timeout)
        }
    }
}
