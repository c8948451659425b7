//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// File name of the trusted CA public key inside `system_config_dir`
pub const CA_KEY_FILE: &str = "ca.pub";

/// Configuration for the jsshd daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshdConfig {
    /// Address to bind the SSH server to
    pub bind_address: String,

    /// Path to the host key file
    pub host_key_path: PathBuf,

    /// Directory holding system-wide trust material (`ca.pub`)
    pub system_config_dir: PathBuf,

    /// Authorized keys path, relative to each user's home directory
    pub authorized_keys_file: PathBuf,

    /// Directory for per-session event and transcript logs.
    /// When unset, audit output is discarded.
    pub log_dir: Option<PathBuf>,

    /// Version label embedded in the protocol banner
    pub version: String,

    /// Allow local and remote TCP port forwarding
    pub enable_port_forwarding: bool,

    /// Accept the static password table
    pub password_auth: bool,

    /// Number of output chunks buffered ahead of the transcript writer
    pub relay_capacity: usize,

    /// Delay applied by the transport before reporting an auth rejection
    #[serde(with = "duration_secs")]
    pub auth_rejection_time: Duration,
}

impl Default for SshdConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            bind_address: "127.0.0.1:2224".to_string(),
            host_key_path: config_dir.join("host_key"),
            system_config_dir: PathBuf::from("/etc/jsshd"),
            authorized_keys_file: PathBuf::from(".jssh/authorized_keys"),
            log_dir: None,
            version: "1.1".to_string(),
            enable_port_forwarding: false,
            password_auth: true,
            relay_capacity: 64,
            auth_rejection_time: Duration::from_secs(1),
        }
    }
}

impl SshdConfig {
    /// Path of the trusted certificate authority key
    pub fn ca_key_path(&self) -> PathBuf {
        self.system_config_dir.join(CA_KEY_FILE)
    }

    /// Identification string sent in the protocol banner
    pub fn server_id(&self) -> String {
        format!("SSH-2.0-{}_{}", self.version, std::env::consts::OS)
    }
}
