//! Top-level gmash configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::tunnel::TunnelConfig;

/// Configuration for one gmash server run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmashConfig {
    /// Address the SSH listener binds to. An empty port (`"0.0.0.0:"`)
    /// lets the OS pick one.
    pub bind_address: String,

    /// Shell started for every `pty-req`
    pub shell: String,

    /// Where the server's host key is kept
    pub host_key_path: PathBuf,

    /// Length of the generated session password
    pub password_length: usize,

    /// Public tunnel settings
    pub tunnel: TunnelConfig,
}

impl Default for GmashConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:".to_string(),
            shell: std::env::var("SHELL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "/bin/bash".to_string()),
            host_key_path: super::default_config_dir().join("key"),
            password_length: 16,
            tunnel: TunnelConfig::default(),
        }
    }
}
