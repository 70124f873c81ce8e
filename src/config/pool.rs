use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_PORT;
use crate::Error;
use crate::HostAddr;
use crate::Result;

/// Construction parameters of a [`ConnectionPool`](crate::ConnectionPool).
///
/// Either a single `host`/`port` or a `replica_set` with its seed list is
/// targeted. Every limit uses `0` for "unlimited".
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Standalone server; `localhost` when neither this nor `replica_set`
    /// is given
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub replica_set: Option<ReplicaSetConfig>,

    #[serde(default)]
    pub db_user: Option<String>,

    #[serde(default)]
    pub db_pass: Option<String>,

    /// Reopen a dead socket on the next send instead of failing
    #[serde(default = "default_autoreconnect")]
    pub autoreconnect: bool,

    /// Connections created up front and kept idle
    #[serde(default)]
    pub min_cached: usize,

    /// Idle connections kept for reuse
    #[serde(default)]
    pub max_cached: usize,

    /// Checked-out plus idle connections
    #[serde(default)]
    pub max_connections: usize,

    /// Requests served by one connection before it is retired
    #[serde(default)]
    pub max_usage: u64,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// Allow reads from secondaries
    #[serde(default)]
    pub slave_okay: bool,

    /// Discovery only settles on a secondary
    #[serde(default)]
    pub secondary_only: bool,
}

/// Replica set name and the seed hosts discovery starts from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicaSetConfig {
    pub name: String,
    pub seeds: Vec<HostAddr>,
}

/// Where a connection points, derived from [`PoolConfig`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Topology {
    Direct(HostAddr),
    ReplicaSet {
        name: String,
        seeds: Vec<HostAddr>,
        secondary_only: bool,
    },
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            replica_set: None,
            db_user: None,
            db_pass: None,
            autoreconnect: default_autoreconnect(),
            min_cached: 0,
            max_cached: 0,
            max_connections: 0,
            max_usage: 0,
            dbname: default_dbname(),
            slave_okay: false,
            secondary_only: false,
        }
    }
}

impl PoolConfig {
    /// Standalone server at `host:port`
    pub fn direct(
        host: impl Into<String>,
        port: u16,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            port,
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    /// Replica set `name` reached through `seeds`
    pub fn replica_set(
        name: impl Into<String>,
        seeds: Vec<HostAddr>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            replica_set: Some(ReplicaSetConfig {
                name: name.into(),
                seeds,
            }),
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_some() && self.replica_set.is_some() {
            return Err(Error::config("host/port and replica_set are mutually exclusive"));
        }
        if let Some(rs) = &self.replica_set {
            if rs.name.is_empty() {
                return Err(Error::config("replica set name must not be empty"));
            }
            if rs.seeds.is_empty() {
                return Err(Error::config(format!(
                    "replica set {} needs at least one seed host",
                    rs.name
                )));
            }
        } else if self.secondary_only {
            return Err(Error::config("secondary_only requires a replica set"));
        }
        if self.db_user.is_some() != self.db_pass.is_some() {
            return Err(Error::config("db_user and db_pass must be given together"));
        }
        if self.max_cached > 0 && self.min_cached > self.max_cached {
            return Err(Error::config(format!(
                "min_cached {} exceeds max_cached {}",
                self.min_cached, self.max_cached
            )));
        }
        if self.max_connections > 0 && self.min_cached > self.max_connections {
            return Err(Error::config(format!(
                "min_cached {} exceeds max_connections {}",
                self.min_cached, self.max_connections
            )));
        }
        if self.dbname.is_empty() {
            return Err(Error::config("dbname must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn topology(&self) -> Topology {
        match &self.replica_set {
            Some(rs) => Topology::ReplicaSet {
                name: rs.name.clone(),
                seeds: rs.seeds.clone(),
                secondary_only: self.secondary_only,
            },
            None => Topology::Direct(HostAddr::new(
                self.host.clone().unwrap_or_else(|| "localhost".to_string()),
                self.port,
            )),
        }
    }

    pub(crate) fn credentials(&self) -> Option<(String, String)> {
        match (&self.db_user, &self.db_pass) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        }
    }

    /// Reads may go to a secondary
    pub(crate) fn reads_from_secondary(&self) -> bool {
        self.slave_okay || self.secondary_only
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_autoreconnect() -> bool {
    true
}
fn default_dbname() -> String {
    "test".to_string()
}
