// -
// Wire protocol

/// Standard message header: length, requestId, responseTo, opCode
pub(crate) const MSG_HEADER_LEN: usize = 16;

/// OP_REPLY fields following the message header:
/// responseFlags, cursorId, startingFrom, numberReturned
pub(crate) const REPLY_FIELDS_LEN: usize = 20;

/// Upper bound accepted for a single reply
pub(crate) const MAX_MESSAGE_SIZE: i32 = 48 * 1024 * 1024;

/// Reply flag bits
pub(crate) const REPLY_CURSOR_NOT_FOUND: i32 = 1;
pub(crate) const REPLY_QUERY_FAILURE: i32 = 1 << 1;

/// Server codes meaning "this node is not primary"
pub(crate) const NOT_MASTER_CODES: [i32; 6] = [10054, 10056, 10058, 10107, 13435, 13436];

// -
// Namespaces

pub(crate) const ADMIN_DB: &str = "admin";
pub(crate) const CMD_COLLECTION: &str = "$cmd";

// -
// Defaults

pub const DEFAULT_PORT: u16 = 27017;
