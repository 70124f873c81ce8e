//! Asynchronous driver for the MongoDB legacy wire protocol.
//!
//! Layers, leaves first:
//! - [`wire`]: message builders and reply parsing
//! - [`Stream`]/[`Connector`]: the socket capability, [`TcpConnector`] by
//!   default
//! - [`Connection`]: one socket, its handshake jobs and a single in-flight
//!   request
//! - [`ConnectionPool`]/[`PoolRegistry`]: bounded, shared connection caches
//! - [`Client`]/[`Cursor`]: database commands and collection CRUD

mod client;
mod config;
mod connection;
mod constants;
mod errors;
mod network;
mod pool;
pub mod utils;
pub mod wire;

pub use client::*;
pub use config::*;
pub use connection::Connection;
pub use constants::DEFAULT_PORT;
pub use errors::*;
pub use network::*;
pub use pool::*;
pub use utils::net::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
