use bson::Document;
use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;

use crate::wire::MessageHeader;
use crate::wire::OpCode;
use crate::wire::Reply;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Encodes an `OP_REPLY` answering `response_to`
pub(crate) fn encode_reply(
    response_to: i32,
    response_flags: i32,
    cursor_id: i64,
    documents: &[Document],
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(response_flags);
    body.put_i64_le(cursor_id);
    body.put_i32_le(0);
    body.put_i32_le(documents.len() as i32);
    for doc in documents {
        doc.to_writer((&mut body).writer()).unwrap();
    }

    let mut buf = BytesMut::new();
    MessageHeader {
        message_length: (16 + body.len()) as i32,
        request_id: 1,
        response_to,
        op_code: OpCode::Reply as i32,
    }
    .write(&mut buf);
    buf.put_slice(&body);
    buf.to_vec()
}

/// Reply object as a job receives it, already past the socket
pub(crate) fn reply_with(documents: Vec<Document>) -> Reply {
    Reply {
        header: MessageHeader {
            message_length: 0,
            request_id: 1,
            response_to: 0,
            op_code: OpCode::Reply as i32,
        },
        response_flags: 0,
        cursor_id: 0,
        starting_from: 0,
        number_returned: documents.len() as i32,
        documents,
    }
}

/// A request as the server sees it
#[derive(Debug, Clone)]
pub(crate) struct DecodedRequest {
    pub request_id: i32,
    pub op_code: OpCode,
    /// Flags word for insert/query, the op-specific flags for update/delete
    pub flags: i32,
    pub namespace: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub documents: Vec<Document>,
    pub cursor_ids: Vec<i64>,
}

impl DecodedRequest {
    /// First key of a command query, e.g. `getnonce`
    pub fn command_name(&self) -> Option<&str> {
        if self.op_code != OpCode::Query || !self.namespace.ends_with(".$cmd") {
            return None;
        }
        self.documents.first()?.keys().next().map(String::as_str)
    }
}

fn get_cstring(buf: &mut &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap();
    let s = String::from_utf8(buf[..end].to_vec()).unwrap();
    buf.advance(end + 1);
    s
}

fn get_documents(buf: &mut &[u8]) -> Vec<Document> {
    let mut docs = Vec::new();
    while !buf.is_empty() {
        docs.push(Document::from_reader(&mut *buf).unwrap());
    }
    docs
}

/// Splits a write into its messages and decodes each one
pub(crate) fn decode_requests(mut bytes: &[u8]) -> Vec<DecodedRequest> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let header = MessageHeader::parse(bytes).unwrap();
        let len = header.message_length as usize;
        let mut body = &bytes[16..len];
        bytes = &bytes[len..];

        let op_code = OpCode::try_from(header.op_code).unwrap();
        let mut req = DecodedRequest {
            request_id: header.request_id,
            op_code,
            flags: 0,
            namespace: String::new(),
            number_to_skip: 0,
            number_to_return: 0,
            documents: vec![],
            cursor_ids: vec![],
        };
        match op_code {
            OpCode::Insert => {
                req.flags = body.get_i32_le();
                req.namespace = get_cstring(&mut body);
                req.documents = get_documents(&mut body);
            }
            OpCode::Update | OpCode::Delete => {
                body.get_i32_le();
                req.namespace = get_cstring(&mut body);
                req.flags = body.get_i32_le();
                req.documents = get_documents(&mut body);
            }
            OpCode::Query => {
                req.flags = body.get_i32_le();
                req.namespace = get_cstring(&mut body);
                req.number_to_skip = body.get_i32_le();
                req.number_to_return = body.get_i32_le();
                req.documents = get_documents(&mut body);
            }
            OpCode::GetMore => {
                body.get_i32_le();
                req.namespace = get_cstring(&mut body);
                req.number_to_return = body.get_i32_le();
                req.cursor_ids = vec![body.get_i64_le()];
            }
            OpCode::KillCursors => {
                body.get_i32_le();
                let n = body.get_i32_le();
                req.cursor_ids = (0..n).map(|_| body.get_i64_le()).collect();
            }
            OpCode::Reply => panic!("client sent OP_REPLY"),
        }
        out.push(req);
    }
    out
}
