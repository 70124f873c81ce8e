use std::sync::Arc;
use std::time::Duration;

use super::Client;
use crate::ConnectionPool;
use crate::Connector;
use crate::DriverConfig;
use crate::HostAddr;
use crate::PoolConfig;
use crate::Result;
use crate::TcpConnector;

/// Assembles a [`Client`] over a freshly created pool
pub struct ClientBuilder {
    config: DriverConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    /// Builder for a standalone server
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            config: DriverConfig {
                pool: PoolConfig::direct(host, port, "test"),
                ..Default::default()
            },
            connector: None,
        }
    }

    /// Builder for replica set `name` reached through `seeds`
    pub fn replica_set(
        name: impl Into<String>,
        seeds: Vec<HostAddr>,
    ) -> Self {
        Self {
            config: DriverConfig {
                pool: PoolConfig::replica_set(name, seeds, "test"),
                ..Default::default()
            },
            connector: None,
        }
    }

    /// Database used by commands and collections (default: `test`)
    pub fn dbname(
        mut self,
        dbname: impl Into<String>,
    ) -> Self {
        self.config.pool.dbname = dbname.into();
        self
    }

    pub fn credentials(
        mut self,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Self {
        self.config.pool.db_user = Some(user.into());
        self.config.pool.db_pass = Some(pass.into());
        self
    }

    pub fn max_connections(
        mut self,
        max: usize,
    ) -> Self {
        self.config.pool.max_connections = max;
        self
    }

    pub fn max_cached(
        mut self,
        max: usize,
    ) -> Self {
        self.config.pool.max_cached = max;
        self
    }

    pub fn max_usage(
        mut self,
        max: u64,
    ) -> Self {
        self.config.pool.max_usage = max;
        self
    }

    /// Only settle on secondaries during replica-set discovery
    pub fn secondary_only(
        mut self,
        enable: bool,
    ) -> Self {
        self.config.pool.secondary_only = enable;
        self
    }

    /// Set connection timeout (default: 1s)
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.network.connect_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Set reply timeout (default: none)
    pub fn request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.network.request_timeout_in_ms = timeout.as_millis() as u64;
        self
    }

    /// Completely replaces the configuration collected so far
    pub fn set_config(
        mut self,
        config: DriverConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Dials through `connector` instead of TCP
    pub fn connector(
        mut self,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.connector = Some(connector);
        self
    }

    /// # Errors
    /// - [`crate::Error::Config`] if the collected configuration is invalid
    pub fn build(self) -> Result<Client> {
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TcpConnector::new(&self.config.network)),
        };
        let pool = ConnectionPool::with_connector(self.config.pool, self.config.network, connector)?;
        Ok(Client::new(pool))
    }
}
