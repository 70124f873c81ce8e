use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Socket-level timeouts shared by every connection of a pool
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Upper bound on waiting for one reply, in milliseconds (0 disables)
    #[serde(default)]
    pub request_timeout_in_ms: u64,

    /// Upper bound on the whole replica-set discovery and authentication
    /// phase of a fresh socket, in milliseconds (0 disables)
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_in_ms: u64,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: 0,
            discovery_timeout_in_ms: default_discovery_timeout(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::config("connect timeout must be > 0"));
        }
        if self.discovery_timeout_in_ms != 0 && self.discovery_timeout_in_ms < self.connect_timeout_in_ms {
            return Err(Error::config(format!(
                "discovery timeout {}ms must not be shorter than connect timeout {}ms",
                self.discovery_timeout_in_ms, self.connect_timeout_in_ms
            )));
        }
        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_discovery_timeout() -> u64 {
    10_000
}
fn default_tcp_nodelay() -> bool {
    true
}
