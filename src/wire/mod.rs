//! Legacy wire protocol codec.
//!
//! Pure functions that build request messages (insert, update, delete,
//! query, get-more, kill-cursors) and parse `OP_REPLY` responses. Every
//! message is framed by a 16-byte little-endian header:
//!
//! ```text
//! +--------------+-------------+--------------+-----------+-----------------+
//! | length (i32) | requestId   | responseTo   | opCode    | body ...        |
//! +--------------+-------------+--------------+-----------+-----------------+
//! ```
//!
//! Documents are encoded and decoded by the [`bson`] crate; this module only
//! looks at the handful of protocol fields it needs.

mod fields;
mod message;
mod reply;

pub(crate) use fields::*;
pub use message::*;
pub use reply::*;

#[cfg(test)]
mod wire_test;

use bytes::Buf;
use bytes::BufMut;

use crate::constants::MAX_MESSAGE_SIZE;
use crate::constants::MSG_HEADER_LEN;
use crate::constants::REPLY_FIELDS_LEN;
use crate::ProtocolError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl TryFrom<i32> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::Reply),
            2001 => Ok(OpCode::Update),
            2002 => Ok(OpCode::Insert),
            2004 => Ok(OpCode::Query),
            2005 => Ok(OpCode::GetMore),
            2006 => Ok(OpCode::Delete),
            2007 => Ok(OpCode::KillCursors),
            other => Err(ProtocolError::UnexpectedOpCode(other)),
        }
    }
}

/// Standard message header shared by requests and replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message size, header included
    pub message_length: i32,
    pub request_id: i32,
    /// Request id this message answers (0 for requests)
    pub response_to: i32,
    pub op_code: i32,
}

impl MessageHeader {
    /// Decodes the first 16 bytes of `buf`
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < MSG_HEADER_LEN {
            return Err(ProtocolError::InvalidLength(buf.len() as i32).into());
        }
        Ok(Self {
            message_length: buf.get_i32_le(),
            request_id: buf.get_i32_le(),
            response_to: buf.get_i32_le(),
            op_code: buf.get_i32_le(),
        })
    }

    pub(crate) fn write(
        &self,
        buf: &mut impl BufMut,
    ) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code);
    }

    /// Number of bytes that follow the header for a reply
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidLength`] if the announced length cannot hold
    ///   the reply fields or exceeds the maximum message size
    /// - [`ProtocolError::UnexpectedOpCode`] if this is not an `OP_REPLY`
    pub fn reply_body_len(&self) -> Result<usize> {
        if self.op_code != OpCode::Reply as i32 {
            return Err(ProtocolError::UnexpectedOpCode(self.op_code).into());
        }
        let min = (MSG_HEADER_LEN + REPLY_FIELDS_LEN) as i32;
        if self.message_length < min || self.message_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::InvalidLength(self.message_length).into());
        }
        Ok(self.message_length as usize - MSG_HEADER_LEN)
    }
}
