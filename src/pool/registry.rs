use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::info;

use super::ConnectionPool;
use crate::Connector;
use crate::DriverConfig;
use crate::Error;
use crate::Result;
use crate::TcpConnector;

/// Named pools shared by every client of an application.
///
/// Construct one registry per application context and pass it around;
/// pools are created on first reference and live as long as the registry.
/// Closing a pool only closes its idle connections, the entry stays.
pub struct PoolRegistry {
    pools: DashMap<String, ConnectionPool>,
    /// Overrides the TCP connector for every pool created here
    connector: Option<Arc<dyn Connector>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            connector: None,
        }
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            pools: DashMap::new(),
            connector: Some(connector),
        }
    }

    /// Returns pool `pool_id`, creating it from `config` on first use.
    /// Later calls ignore `config`.
    ///
    /// # Errors
    /// - [`Error::Config`] if the pool has to be created and `config` is
    ///   invalid
    pub fn get_or_create(
        &self,
        pool_id: &str,
        config: &DriverConfig,
    ) -> Result<ConnectionPool> {
        match self.pools.entry(pool_id.to_string()) {
            Entry::Occupied(entry) => {
                debug!(pool_id, "reusing existing pool, ignoring supplied config");
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let connector: Arc<dyn Connector> = match &self.connector {
                    Some(connector) => connector.clone(),
                    None => Arc::new(TcpConnector::new(&config.network)),
                };
                let pool = ConnectionPool::with_connector(config.pool.clone(), config.network.clone(), connector)?;
                info!(pool_id, "created connection pool");
                Ok(entry.insert(pool).clone())
            }
        }
    }

    pub fn get(
        &self,
        pool_id: &str,
    ) -> Option<ConnectionPool> {
        self.pools.get(pool_id).map(|entry| entry.value().clone())
    }

    /// Closes the idle connections of `pool_id`.
    ///
    /// # Errors
    /// - [`Error::Programming`] if no such pool was ever created
    pub fn close(
        &self,
        pool_id: &str,
    ) -> Result<()> {
        let pool = self
            .get(pool_id)
            .ok_or_else(|| Error::Programming(format!("pool {pool_id:?} does not exist")))?;
        pool.close_all();
        Ok(())
    }

    /// Closes the idle connections of every pool
    pub fn close_all(&self) {
        for entry in self.pools.iter() {
            debug!(pool_id = %entry.key(), "closing pool");
            entry.value().close_all();
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
