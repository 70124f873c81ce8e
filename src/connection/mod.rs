//! One socket to one database host plus the jobs that run on it.
//!
//! A [`Connection`] owns a single [`Stream`] and a [`Pipeline`] of jobs.
//! Opening a socket queues the handshake jobs (replica-set discovery, then
//! authentication when credentials are configured); the pipeline always
//! hands those out before any caller message, so the first bytes written to
//! a fresh socket never belong to the caller.
//!
//! At most one request is outstanding per connection. A second `send` while
//! the first is still parked on the socket (possible only if the first
//! future was dropped) is rejected with [`Error::Programming`].
mod authorize;
mod discover;
mod job;

pub(crate) use authorize::*;
pub(crate) use discover::*;
pub(crate) use job::*;

#[cfg(test)]
mod authorize_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::Topology;
use crate::constants::MSG_HEADER_LEN;
use crate::wire::Message;
use crate::wire::MessageHeader;
use crate::wire::Reply;
use crate::Connector;
use crate::Error;
use crate::HostAddr;
use crate::InterfaceError;
use crate::NetworkConfig;
use crate::PoolConfig;
use crate::ProtocolError;
use crate::Result;
use crate::Stream;

pub struct Connection {
    id: u64,
    topology: Topology,
    credentials: Option<(String, String)>,
    dbname: String,
    autoreconnect: bool,
    connector: Arc<dyn Connector>,

    stream: Option<Box<dyn Stream>>,
    host: Option<HostAddr>,
    pipeline: Pipeline,
    /// Request id awaiting its reply
    in_flight: Option<i32>,
    alive: bool,
    connected_once: bool,
    usage_count: u64,

    request_timeout: Option<Duration>,
    handshake_timeout: Option<Duration>,
    /// Primary found by the last discovery round, tried first next time
    last_primary: Option<HostAddr>,
}

impl std::fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("alive", &self.alive)
            .field("in_flight", &self.in_flight)
            .field("usage_count", &self.usage_count)
            .finish()
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Connection {
    /// Creates an unconnected connection; the socket is opened by
    /// [`connect`](Self::connect) or lazily by the first [`send`](Self::send).
    pub fn new(
        id: u64,
        pool: &PoolConfig,
        network: &NetworkConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            id,
            topology: pool.topology(),
            credentials: pool.credentials(),
            dbname: pool.dbname.clone(),
            autoreconnect: pool.autoreconnect,
            connector,
            stream: None,
            host: None,
            pipeline: Pipeline::default(),
            in_flight: None,
            alive: false,
            connected_once: false,
            usage_count: 0,
            request_timeout: millis(network.request_timeout_in_ms),
            handshake_timeout: millis(network.discovery_timeout_in_ms),
            last_primary: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Host the socket is (or was last) connected to
    pub fn host(&self) -> Option<&HostAddr> {
        self.host.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Completed request/response cycles since the last connect
    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// No request left dangling and the socket is not known to be dead;
    /// only such connections go back to a pool's idle cache
    pub fn is_reusable(&self) -> bool {
        self.in_flight.is_none() && (self.alive || !self.connected_once)
    }

    /// (Re)opens the socket and runs the handshake.
    ///
    /// # Errors
    /// - [`InterfaceError`] if no socket could be opened
    /// - [`crate::ReplicaSetConnectionError`] if discovery found no usable
    ///   member
    /// - [`Error::Authentication`] if the credentials were rejected
    pub async fn connect(&mut self) -> Result<()> {
        self.close();
        self.start_connect().await?;
        self.drain().await.map(|_| ())
    }

    /// Sends `message` and waits for its reply, if it expects one.
    ///
    /// A dead connection, including one whose idle socket the peer closed,
    /// is reopened first when `autoreconnect` is set (or when it was never
    /// connected).
    ///
    /// # Errors
    /// - [`Error::Programming`] if a request is already in flight
    /// - [`InterfaceError::NotConnected`] if the socket is dead and
    ///   autoreconnect is off
    /// - any handshake error from a reconnect
    /// - reply errors from [`Reply::check`]
    pub async fn send(
        &mut self,
        message: Message,
    ) -> Result<Option<Reply>> {
        if let Some(request_id) = self.in_flight {
            return Err(Error::Programming(format!(
                "connection {} is still waiting for the reply to request {request_id}",
                self.id
            )));
        }

        self.detect_peer_close();
        self.pipeline.push(Job::UserMessage(UserMessage::new(message)));
        if !self.alive {
            if !self.autoreconnect && self.connected_once {
                self.pipeline.clear();
                return Err(InterfaceError::NotConnected.into());
            }
            debug!(connection = self.id, "reconnecting before send");
            if let Err(e) = self.start_connect().await {
                self.close();
                return Err(e);
            }
        }
        self.drain().await
    }

    /// Writes a message nobody answers, such as kill-cursors.
    ///
    /// # Errors
    /// - [`Error::Programming`] if `message` expects a reply
    /// - the transport errors of [`send`](Self::send)
    pub async fn send_unacknowledged(
        &mut self,
        message: Message,
    ) -> Result<()> {
        if message.expects_reply {
            return Err(Error::Programming(format!(
                "{:?} request {} expects a reply",
                message.op_code, message.request_id
            )));
        }
        self.send(message).await.map(|_| ())
    }

    /// Closes the socket. Pending jobs are dropped and an in-flight request
    /// is forgotten.
    pub fn close(&mut self) {
        self.close_stream();
        self.in_flight = None;
        let dropped = self.pipeline.clear();
        if dropped > 0 {
            debug!(connection = self.id, dropped, "discarded pending jobs");
        }
        self.alive = false;
    }

    /// Marks the connection dead if the peer closed its idle socket
    pub(crate) fn detect_peer_close(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let closed = self.stream.as_mut().is_some_and(|stream| stream.peer_closed());
        if closed {
            debug!(connection = self.id, host = ?self.host, "socket closed by peer");
            self.close();
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }

    /// Opens the socket for a direct topology and queues the handshake
    async fn start_connect(&mut self) -> Result<()> {
        self.close_stream();
        self.in_flight = None;
        self.usage_count = 0;
        self.connected_once = true;

        match &self.topology {
            Topology::Direct(addr) => {
                let addr = addr.clone();
                self.open_socket(&addr).await?;
            }
            Topology::ReplicaSet {
                name,
                seeds,
                secondary_only,
            } => {
                let job = DiscoverReplicaSet::new(name.clone(), seeds, *secondary_only, self.last_primary.clone());
                self.pipeline.push(Job::DiscoverReplicaSet(job));
            }
        }
        if let Some((user, pass)) = &self.credentials {
            self.pipeline
                .push(Job::Authorize(Authorize::new(user.clone(), pass.clone(), self.dbname.clone())));
        }
        self.alive = true;
        Ok(())
    }

    /// Runs queued jobs until the pipeline is empty and returns the last
    /// caller reply
    async fn drain(&mut self) -> Result<Option<Reply>> {
        let deadline = self.handshake_timeout.map(|t| Instant::now() + t);
        let mut last_reply = None;

        while let Some(mut job) = self.pipeline.pop() {
            let handshake = job.is_handshake();
            trace!(connection = self.id, job = job.name(), "running job");

            let outcome = match (handshake, deadline) {
                (true, Some(deadline)) => match timeout_at(deadline, self.run_job(&mut job)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(job.timeout_error(self.handshake_timeout.unwrap_or_default())),
                },
                _ => self.run_job(&mut job).await,
            };

            match outcome {
                Ok(reply) => {
                    if let Job::DiscoverReplicaSet(discover) = &job {
                        self.last_primary = discover.primary().cloned();
                    }
                    if !handshake {
                        if reply.is_some() {
                            self.usage_count += 1;
                        }
                        last_reply = reply;
                    }
                }
                Err(e) => {
                    if handshake || e.closes_connection() {
                        warn!(connection = self.id, job = job.name(), error = %e, "closing connection");
                        self.close();
                    } else {
                        // Errors that keep the socket were read from a reply
                        self.usage_count += 1;
                    }
                    return Err(e);
                }
            }
        }
        Ok(last_reply)
    }

    async fn run_job(
        &mut self,
        job: &mut Job,
    ) -> Result<Option<Reply>> {
        let mut input = JobInput::Start;
        loop {
            input = match job.step(input)? {
                NextAction::Connect(addr) => match self.open_socket(&addr).await {
                    Ok(()) => JobInput::Connected,
                    Err(e) => JobInput::Failed(e),
                },
                NextAction::Send(message) => match self.exchange(&message).await {
                    Ok(Some(reply)) => JobInput::Reply(reply),
                    Ok(None) => JobInput::Written,
                    Err(e) => JobInput::Failed(e),
                },
                NextAction::Done(reply) => return Ok(reply),
            };
        }
    }

    async fn open_socket(
        &mut self,
        addr: &HostAddr,
    ) -> Result<()> {
        self.close_stream();
        self.in_flight = None;
        let stream = self.connector.connect(addr).await?;
        debug!(connection = self.id, host = %addr, "socket open");
        self.stream = Some(stream);
        self.host = Some(addr.clone());
        Ok(())
    }

    /// Writes `message` and, when it expects one, reads and checks the reply
    async fn exchange(
        &mut self,
        message: &Message,
    ) -> Result<Option<Reply>> {
        let stream = self.stream.as_mut().ok_or(InterfaceError::NotConnected)?;
        self.in_flight = Some(message.request_id);
        trace!(
            connection = self.id,
            request_id = message.request_id,
            op = ?message.op_code,
            len = message.len(),
            "write"
        );
        stream.write_all(&message.payload).await?;
        if !message.expects_reply {
            self.in_flight = None;
            return Ok(None);
        }

        let reply = match self.request_timeout {
            Some(limit) => timeout(limit, self.read_reply(message.request_id))
                .await
                .map_err(|_| InterfaceError::RequestTimeout(limit))??,
            None => self.read_reply(message.request_id).await?,
        };
        self.in_flight = None;
        reply.check().map(Some)
    }

    /// Reads the 16-byte header, then the rest of the reply
    async fn read_reply(
        &mut self,
        request_id: i32,
    ) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or(InterfaceError::NotConnected)?;
        let head = stream.read_exact(MSG_HEADER_LEN).await?;
        let header = MessageHeader::parse(&head)?;
        let body = stream.read_exact(header.reply_body_len()?).await?;
        if header.response_to != request_id {
            return Err(ProtocolError::ResponseToMismatch {
                expected: request_id,
                received: header.response_to,
            }
            .into());
        }
        Reply::parse(header, &body)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close_stream();
    }
}
