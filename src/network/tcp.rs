use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;

use super::Connector;
use super::Stream;
use crate::HostAddr;
use crate::InterfaceError;
use crate::NetworkConfig;
use crate::Result;

/// Tokio TCP implementation of [`Connector`]
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    tcp_nodelay: bool,
}

impl TcpConnector {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_in_ms),
            tcp_nodelay: config.tcp_nodelay,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(&NetworkConfig::default())
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        addr: &HostAddr,
    ) -> Result<Box<dyn Stream>> {
        debug!(host = %addr.host, port = addr.port, "opening socket");
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await
        .map_err(|_| InterfaceError::ConnectTimeout {
            address: addr.to_string(),
            duration: self.connect_timeout,
        })??;
        stream.set_nodelay(self.tcp_nodelay)?;

        Ok(Box::new(TcpSocket {
            inner: Some(stream),
            peer: addr.clone(),
        }))
    }
}

/// A connected socket; `inner` is dropped on close
pub(crate) struct TcpSocket {
    inner: Option<TcpStream>,
    peer: HostAddr,
}

fn map_io(e: std::io::Error) -> InterfaceError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => InterfaceError::ConnectionClosed,
        _ => InterfaceError::Io(e),
    }
}

#[async_trait]
impl Stream for TcpSocket {
    async fn write_all(
        &mut self,
        buf: &[u8],
    ) -> Result<()> {
        let stream = self.inner.as_mut().ok_or(InterfaceError::ConnectionClosed)?;
        trace!(peer = %self.peer, len = buf.len(), "write");
        stream.write_all(buf).await.map_err(map_io)?;
        Ok(())
    }

    async fn read_exact(
        &mut self,
        n: usize,
    ) -> Result<Vec<u8>> {
        let stream = self.inner.as_mut().ok_or(InterfaceError::ConnectionClosed)?;
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).await.map_err(map_io)?;
        trace!(peer = %self.peer, len = n, "read");
        Ok(buf)
    }

    fn peer_closed(&mut self) -> bool {
        let Some(stream) = self.inner.as_ref() else {
            return true;
        };
        let mut probe = [0u8; 1];
        match stream.peek(&mut probe).now_or_never() {
            None => false,
            Some(Ok(0)) => {
                debug!(peer = %self.peer, "peer closed the socket");
                true
            }
            Some(Ok(_)) => {
                debug!(peer = %self.peer, "unsolicited bytes on idle socket");
                true
            }
            Some(Err(e)) => {
                debug!(peer = %self.peer, error = %e, "idle socket failed");
                true
            }
        }
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(peer = %self.peer, "socket closed");
        }
    }
}
