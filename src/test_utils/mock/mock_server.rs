use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use bytes::BytesMut;
use parking_lot::Mutex;

use crate::test_utils::decode_requests;
use crate::test_utils::encode_reply;
use crate::test_utils::DecodedRequest;
use crate::Connector;
use crate::HostAddr;
use crate::InterfaceError;
use crate::Result;
use crate::Stream;

/// What the mock does with one decoded request
pub(crate) enum MockResponse {
    /// Answer with these documents
    Reply(Vec<Document>),
    /// Answer with explicit reply flags and cursor id
    ReplyWith {
        flags: i32,
        cursor_id: i64,
        documents: Vec<Document>,
    },
    /// Stay silent (fire-and-forget messages)
    NoReply,
    /// Close the socket
    Hangup,
    /// Answer with these documents, then close the socket while it idles
    ReplyThenHangup(Vec<Document>),
}

type Handler = dyn Fn(&HostAddr, &DecodedRequest) -> MockResponse + Send + Sync;

#[derive(Default)]
struct ServerState {
    requests: Vec<(HostAddr, DecodedRequest)>,
    connects: Vec<HostAddr>,
    unreachable: HashSet<HostAddr>,
    connect_delay: Option<Duration>,
}

#[derive(Clone)]
pub(crate) struct MockServer {
    state: Arc<Mutex<ServerState>>,
    handler: Arc<Handler>,
}

impl MockServer {
    pub(crate) fn new(handler: impl Fn(&HostAddr, &DecodedRequest) -> MockResponse + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub(crate) fn set_unreachable(
        &self,
        addr: &HostAddr,
    ) {
        self.state.lock().unreachable.insert(addr.clone());
    }

    /// Makes every connect take `delay` before it completes
    pub(crate) fn set_connect_delay(
        &self,
        delay: Duration,
    ) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Every request received, in arrival order
    pub(crate) fn requests(&self) -> Vec<(HostAddr, DecodedRequest)> {
        self.state.lock().requests.clone()
    }

    pub(crate) fn requests_to(
        &self,
        addr: &HostAddr,
    ) -> Vec<DecodedRequest> {
        self.requests()
            .into_iter()
            .filter(|(host, _)| host == addr)
            .map(|(_, req)| req)
            .collect()
    }

    /// Successful connects, in order
    pub(crate) fn connects(&self) -> Vec<HostAddr> {
        self.state.lock().connects.clone()
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(
        &self,
        addr: &HostAddr,
    ) -> Result<Box<dyn Stream>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.unreachable.contains(addr) {
            return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, addr.to_string()).into());
        }
        state.connects.push(addr.clone());
        Ok(Box::new(MockSocket {
            addr: addr.clone(),
            server: self.clone(),
            inbox: BytesMut::new(),
            closed: false,
        }))
    }
}

struct MockSocket {
    addr: HostAddr,
    server: MockServer,
    inbox: BytesMut,
    closed: bool,
}

#[async_trait]
impl Stream for MockSocket {
    async fn write_all(
        &mut self,
        buf: &[u8],
    ) -> Result<()> {
        if self.closed {
            return Err(InterfaceError::ConnectionClosed.into());
        }
        for req in decode_requests(buf) {
            self.server
                .state
                .lock()
                .requests
                .push((self.addr.clone(), req.clone()));
            match (self.server.handler)(&self.addr, &req) {
                MockResponse::Reply(documents) => {
                    self.inbox
                        .extend_from_slice(&encode_reply(req.request_id, 0, 0, &documents));
                }
                MockResponse::ReplyWith {
                    flags,
                    cursor_id,
                    documents,
                } => {
                    self.inbox.extend_from_slice(&encode_reply(
                        req.request_id,
                        flags,
                        cursor_id,
                        &documents,
                    ));
                }
                MockResponse::ReplyThenHangup(documents) => {
                    self.inbox
                        .extend_from_slice(&encode_reply(req.request_id, 0, 0, &documents));
                    self.closed = true;
                    break;
                }
                MockResponse::NoReply => {}
                MockResponse::Hangup => {
                    self.closed = true;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn read_exact(
        &mut self,
        n: usize,
    ) -> Result<Vec<u8>> {
        if self.inbox.len() >= n {
            return Ok(self.inbox.split_to(n).to_vec());
        }
        if self.closed {
            return Err(InterfaceError::ConnectionClosed.into());
        }
        // A silent server never answers
        std::future::pending().await
    }

    fn peer_closed(&mut self) -> bool {
        self.closed && self.inbox.is_empty()
    }

    fn close(&mut self) {
        self.closed = true;
        self.inbox.clear();
    }
}

/// `ismaster` answer of `me` in a healthy set where `primary` is elected
pub(crate) fn ismaster_reply(
    set_name: &str,
    members: &[HostAddr],
    primary: &HostAddr,
    me: &HostAddr,
) -> Document {
    let hosts: Vec<String> = members.iter().map(HostAddr::to_string).collect();
    bson::doc! {
        "ismaster": me == primary,
        "secondary": me != primary,
        "setName": set_name,
        "hosts": hosts,
        "primary": primary.to_string(),
        "me": me.to_string(),
        "ok": 1.0,
    }
}

/// Replica set `rs0` whose members answer `ismaster` truthfully and every
/// other request with `{ok: 1}`
pub(crate) fn replica_set_server(
    members: Vec<HostAddr>,
    primary: HostAddr,
) -> MockServer {
    MockServer::new(move |addr, req| match req.command_name() {
        Some("ismaster") => MockResponse::Reply(vec![ismaster_reply("rs0", &members, &primary, addr)]),
        _ => MockResponse::Reply(vec![bson::doc! { "ok": 1.0 }]),
    })
}
