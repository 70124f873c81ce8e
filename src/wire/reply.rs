use bson::Document;
use bytes::Buf;

use super::error_code;
use super::is_not_master;
use super::string;
use super::MessageHeader;
use crate::constants::MSG_HEADER_LEN;
use crate::constants::REPLY_CURSOR_NOT_FOUND;
use crate::constants::REPLY_FIELDS_LEN;
use crate::constants::REPLY_QUERY_FAILURE;
use crate::Error;
use crate::InterfaceError;
use crate::ProtocolError;
use crate::QueryError;
use crate::Result;

/// Decoded `OP_REPLY`
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub header: MessageHeader,
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
    pub documents: Vec<Document>,
}

impl Reply {
    /// Decodes the bytes following the message header.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidLength`] if `body` is shorter than the reply
    ///   fields
    /// - [`ProtocolError::Decode`] if a document is malformed
    /// - [`ProtocolError::DocumentCountMismatch`] if `numberReturned`
    ///   disagrees with the decoded documents
    pub fn parse(
        header: MessageHeader,
        mut body: &[u8],
    ) -> Result<Self> {
        if body.len() < REPLY_FIELDS_LEN {
            return Err(ProtocolError::InvalidLength(header.message_length).into());
        }
        let response_flags = body.get_i32_le();
        let cursor_id = body.get_i64_le();
        let starting_from = body.get_i32_le();
        let number_returned = body.get_i32_le();

        let mut documents = Vec::with_capacity(number_returned.max(0) as usize);
        while !body.is_empty() {
            documents.push(Document::from_reader(&mut body)?);
        }
        if number_returned < 0 || number_returned as usize != documents.len() {
            return Err(ProtocolError::DocumentCountMismatch {
                announced: number_returned,
                decoded: documents.len(),
            }
            .into());
        }

        Ok(Self {
            header,
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    /// Turns the reply flags into errors.
    ///
    /// # Errors
    /// - [`InterfaceError::CursorNotFound`] when the cursor-not-found bit is
    ///   set
    /// - [`QueryError::NotMaster`] / [`QueryError::Failed`] when the
    ///   query-failure bit is set; the message comes from `$err`
    pub fn check(self) -> Result<Self> {
        if self.response_flags & REPLY_CURSOR_NOT_FOUND != 0 {
            return Err(InterfaceError::CursorNotFound {
                cursor_id: self.cursor_id,
            }
            .into());
        }
        if self.response_flags & REPLY_QUERY_FAILURE != 0 {
            let (message, code) = match self.documents.first() {
                Some(doc) => (
                    string(doc, "$err").unwrap_or_else(|| "unknown query failure".to_string()),
                    error_code(doc),
                ),
                None => ("query failure without error document".to_string(), None),
            };
            if is_not_master(&message, code) {
                return Err(QueryError::NotMaster(message).into());
            }
            return Err(QueryError::Failed { message, code }.into());
        }
        Ok(self)
    }

    /// First document, for command-style replies
    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    pub fn into_first(self) -> Option<Document> {
        self.documents.into_iter().next()
    }
}

/// Parses a complete reply, header included, as read off the socket.
pub fn parse_response(bytes: &[u8]) -> Result<Reply> {
    let header = MessageHeader::parse(bytes)?;
    let body_len = header.reply_body_len()?;
    let body = &bytes[MSG_HEADER_LEN..];
    if body.len() != body_len {
        return Err(Error::Protocol(ProtocolError::InvalidLength(header.message_length)));
    }
    Reply::parse(header, body)?.check()
}
