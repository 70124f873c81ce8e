//! Database-level entry point.
//!
//! A [`Client`] binds a [`ConnectionPool`] to its database name; it runs
//! commands itself and hands out a [`Cursor`] per collection for CRUD.
//!
//! ```ignore
//! let client = ClientBuilder::new("localhost", 27017)
//!     .dbname("shop")
//!     .max_connections(8)
//!     .build()?;
//! let items = client.collection("items")?;
//! items.insert_one(doc! { "_id": 1 }, WriteConcern::acknowledged()).await?;
//! ```
mod builder;
mod cursor;
mod options;

pub use builder::*;
pub use cursor::*;
pub use options::*;


use bson::Document;
use tracing::debug;

use crate::wire;
use crate::wire::error_code;
use crate::wire::is_ok;
use crate::wire::query_flags;
use crate::wire::string;
use crate::ConnectionPool;
use crate::DriverConfig;
use crate::Error;
use crate::PoolRegistry;
use crate::ProtocolError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Client {
    pool: ConnectionPool,
    dbname: String,
}

impl Client {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            dbname: pool.config().dbname.clone(),
            pool,
        }
    }

    /// Client over the registry's pool `pool_id`, created from `config` if
    /// it does not exist yet
    pub fn from_registry(
        registry: &PoolRegistry,
        pool_id: &str,
        config: &DriverConfig,
    ) -> Result<Self> {
        registry.get_or_create(pool_id, config).map(Self::new)
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) fn reads_from_secondary(&self) -> bool {
        self.pool.config().reads_from_secondary()
    }

    /// # Errors
    /// - [`Error::Data`] if `name` is not a valid collection name
    pub fn collection(
        &self,
        name: &str,
    ) -> Result<Cursor> {
        Cursor::new(self.clone(), name)
    }

    /// Runs `command` against `<dbname>.$cmd` and returns its reply.
    ///
    /// # Errors
    /// - [`Error::Command`] if `options.check` is set, the reply is not ok
    ///   and its `errmsg` is not allowed
    /// - [`crate::QueryError`] and transport errors from the connection
    pub async fn command(
        &self,
        command: Document,
        options: CommandOptions,
    ) -> Result<Document> {
        let flags = if self.reads_from_secondary() {
            query_flags::SLAVE_OK
        } else {
            0
        };
        let message = wire::command(&self.dbname, &command, flags)?;

        let mut conn = self.pool.acquire()?;
        let reply = conn
            .send(message)
            .await?
            .and_then(|reply| reply.into_first())
            .ok_or(ProtocolError::MissingField("command reply"))?;
        drop(conn);

        if !options.check || is_ok(&reply) {
            return Ok(reply);
        }
        let message = string(&reply, "errmsg").unwrap_or_else(|| "command failed".to_string());
        if options.allowable_errors.contains(&message) {
            debug!(errmsg = %message, "command error allowed");
            return Ok(reply);
        }
        Err(Error::Command {
            code: error_code(&reply),
            message,
        })
    }
}
