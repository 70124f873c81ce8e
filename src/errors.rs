//! Driver Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: transport failures
//! (`InterfaceError`), handshake failures (authentication, replica-set
//! discovery), server-reported failures (integrity, query, command) and
//! caller misuse (programming, data).

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or connection level failures
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// Nonce/key handshake rejected or interrupted
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server-reported write failure, surfaced from the getlasterror document
    #[error("Write failed: {message} (code: {code:?})")]
    Integrity { message: String, code: Option<i32> },

    /// Invalid collection or namespace name
    #[error("Invalid data: {0}")]
    Data(String),

    /// API misuse such as reusing a busy connection
    #[error("Programming error: {0}")]
    Programming(String),

    /// Pool exhausted
    #[error("Too many connections (max: {max})")]
    TooManyConnections { max: usize },

    /// Query rejected by the server
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Database command replied with `ok != 1`
    #[error("Command failed: {message} (code: {code:?})")]
    Command { message: String, code: Option<i32> },

    /// Malformed or unexpected server response
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    /// The socket was closed while a request was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection is dead and autoreconnect is disabled
    #[error("Connection is not alive")]
    NotConnected,

    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect to {address} timed out after {duration:?}")]
    ConnectTimeout { address: String, duration: Duration },

    #[error("No response within {0:?}")]
    RequestTimeout(Duration),

    /// The server no longer knows the cursor referenced by a get-more
    #[error("Cursor {cursor_id} not found")]
    CursorNotFound { cursor_id: i64 },

    #[error(transparent)]
    ReplicaSet(#[from] ReplicaSetConnectionError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaSetConnectionError {
    /// Every known host refused or failed the connect
    #[error("No reachable host, tried: {tried:?}")]
    NoReachableHost { tried: Vec<String> },

    #[error("Replica set name mismatch (expected: {expected}, received: {received:?})")]
    NameMismatch {
        expected: String,
        received: Option<String>,
    },

    #[error("Replica set discovery did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The node answering is no longer primary
    #[error("Not master: {0}")]
    NotMaster(String),

    #[error("Query failed: {message} (code: {code:?})")]
    Failed { message: String, code: Option<i32> },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message length {0} out of bounds")]
    InvalidLength(i32),

    #[error("Unexpected opcode {0} in response")]
    UnexpectedOpCode(i32),

    #[error("Response to request {received}, expected {expected}")]
    ResponseToMismatch { expected: i32, received: i32 },

    #[error("Reply announced {announced} documents but carried {decoded}")]
    DocumentCountMismatch { announced: i32, decoded: usize },

    #[error("Document decode failed: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("Document encode failed: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("Missing field `{0}` in server response")]
    MissingField(&'static str),

    #[error("Handshake received unexpected input in state {0}")]
    UnexpectedState(&'static str),
}

impl Error {
    /// Transport-level failure, including replica-set connection errors
    pub fn is_interface(&self) -> bool {
        matches!(self, Error::Interface(_))
    }

    /// Server error code carried by integrity, query or command failures
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Integrity { code, .. } | Error::Command { code, .. } => *code,
            Error::Query(QueryError::Failed { code, .. }) => *code,
            _ => None,
        }
    }

    /// The socket that produced this error must not be reused
    pub(crate) fn closes_connection(&self) -> bool {
        match self {
            Error::Interface(InterfaceError::CursorNotFound { .. }) => false,
            Error::Interface(_) | Error::Protocol(_) | Error::Authentication(_) => true,
            Error::Query(QueryError::NotMaster(_)) => true,
            _ => false,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(ConfigError::Message(msg.into()))
    }
}

// ============== Conversion Implementations ============== //
impl From<ReplicaSetConnectionError> for Error {
    fn from(e: ReplicaSetConnectionError) -> Self {
        Error::Interface(InterfaceError::ReplicaSet(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Interface(InterfaceError::Io(e))
    }
}

impl From<bson::de::Error> for Error {
    fn from(e: bson::de::Error) -> Self {
        Error::Protocol(ProtocolError::Decode(e))
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        Error::Protocol(ProtocolError::Encode(e))
    }
}
