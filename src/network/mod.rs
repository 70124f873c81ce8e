//! This module is the socket abstraction layer the driver runs on.
//!
//! A [`Connection`](crate::Connection) never touches a socket type directly:
//! it holds an `Arc<dyn Connector>` chosen at construction time and talks to
//! the [`Stream`] it returns. The default implementation is
//! [`TcpConnector`], backed by tokio; tests inject an in-memory server.
//!
//! Every method here is a suspension point: connect, write and read are the
//! only places a caller's task is parked.
mod tcp;

pub use tcp::*;


// Trait definition of the current module
// -----------------------------------------------------------------------------

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::HostAddr;
use crate::Result;

/// Non-blocking byte stream over one socket
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Stream: Send {
    /// Writes the whole buffer.
    ///
    /// # Errors
    /// - [`crate::InterfaceError::ConnectionClosed`] if the peer went away
    /// - [`crate::InterfaceError::Io`] for other socket failures
    async fn write_all(
        &mut self,
        buf: &[u8],
    ) -> Result<()>;

    /// Reads exactly `n` bytes, parking until they arrive.
    ///
    /// # Errors
    /// - [`crate::InterfaceError::ConnectionClosed`] on EOF before `n` bytes
    /// - [`crate::InterfaceError::Io`] for other socket failures
    async fn read_exact(
        &mut self,
        n: usize,
    ) -> Result<Vec<u8>>;

    /// Whether the peer closed the socket, checked without waiting.
    ///
    /// Only asked while no request is outstanding, so any readable state
    /// (EOF, an error or stray bytes) means the socket is unusable.
    fn peer_closed(&mut self) -> bool;

    /// Closes the socket. Further reads and writes fail.
    fn close(&mut self);
}

/// Opens [`Stream`]s to database hosts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// # Errors
    /// - [`crate::InterfaceError::ConnectTimeout`] if the connect timed out
    /// - [`crate::InterfaceError::Io`] if the host refused the connection
    async fn connect(
        &self,
        addr: &HostAddr,
    ) -> Result<Box<dyn Stream>>;
}
