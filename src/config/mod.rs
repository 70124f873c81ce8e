//! Configuration management for the driver.
//!
//! Settings are merged from several sources, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. The file named by the `ASYNCMONGO_CONFIG` environment variable
//! 3. Override files passed to [`DriverConfig::with_override_config`]
//! 4. Environment variables (`ASYNCMONGO__POOL__MAX_CONNECTIONS=8`)
//!

mod network;
mod pool;
pub use network::*;
pub use pool::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const CONFIG_PATH_ENV: &str = "ASYNCMONGO_CONFIG";
const ENV_PREFIX: &str = "ASYNCMONGO";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DriverConfig {
    /// Pool sizing, target hosts and credentials
    #[serde(default)]
    pub pool: PoolConfig,
    /// Socket timeouts
    #[serde(default)]
    pub network: NetworkConfig,
}

impl DriverConfig {
    /// Loads defaults, then the `ASYNCMONGO_CONFIG` file if set, then
    /// `ASYNCMONGO__*` environment variables.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }
        let config: Self = builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Layers `path` over the current values. Environment variables still
    /// win.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.network.validate()?;
        Ok(())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true)
    }
}
