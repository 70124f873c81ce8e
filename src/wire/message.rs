use bson::doc;
use bson::Document;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use rand::Rng;

use super::MessageHeader;
use super::OpCode;
use crate::constants::CMD_COLLECTION;
use crate::Result;

/// `OP_QUERY` option bits
pub mod query_flags {
    pub const TAILABLE: i32 = 1 << 1;
    pub const SLAVE_OK: i32 = 1 << 2;
    pub const NO_CURSOR_TIMEOUT: i32 = 1 << 4;
    pub const AWAIT_DATA: i32 = 1 << 5;
}

const UPDATE_UPSERT: i32 = 1;
const UPDATE_MULTI: i32 = 1 << 1;
const DELETE_SINGLE_REMOVE: i32 = 1;
const INSERT_CONTINUE_ON_ERROR: i32 = 1;

/// One or two encoded wire messages ready to be written to a socket.
///
/// Acknowledged writes carry the write itself followed by a `getlasterror`
/// query; `request_id` then names the query, whose reply is the result of
/// the whole operation.
#[derive(Debug, Clone)]
pub struct Message {
    pub request_id: i32,
    pub op_code: OpCode,
    pub payload: Bytes,
    pub expects_reply: bool,
}

impl Message {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Random positive request id
pub(crate) fn next_request_id() -> i32 {
    rand::thread_rng().gen_range(1..i32::MAX)
}

fn next_request_id_except(taken: i32) -> i32 {
    loop {
        let id = next_request_id();
        if id != taken {
            return id;
        }
    }
}

/// Incremental writer for a single framed message; the length prefix is
/// patched in [`finish`](MessageBuilder::finish).
struct MessageBuilder {
    buf: BytesMut,
}

impl MessageBuilder {
    fn new(
        op_code: OpCode,
        request_id: i32,
    ) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        MessageHeader {
            message_length: 0,
            request_id,
            response_to: 0,
            op_code: op_code as i32,
        }
        .write(&mut buf);
        Self { buf }
    }

    fn put_i32(
        &mut self,
        v: i32,
    ) -> &mut Self {
        self.buf.put_i32_le(v);
        self
    }

    fn put_i64(
        &mut self,
        v: i64,
    ) -> &mut Self {
        self.buf.put_i64_le(v);
        self
    }

    fn put_cstring(
        &mut self,
        s: &str,
    ) -> &mut Self {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
        self
    }

    fn put_document(
        &mut self,
        document: &Document,
    ) -> Result<&mut Self> {
        document.to_writer((&mut self.buf).writer())?;
        Ok(self)
    }

    fn put_slice(
        &mut self,
        bytes: &[u8],
    ) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    fn finish(mut self) -> BytesMut {
        let len = self.buf.len() as i32;
        self.buf[..4].copy_from_slice(&len.to_le_bytes());
        self.buf
    }
}

/// Frames `body` behind a header and the leading int32 every request opcode
/// carries (flags, or a reserved zero).
///
/// The returned buffer is `body.len() + 20` bytes long.
pub fn frame(
    op_code: OpCode,
    request_id: i32,
    leading: i32,
    body: &[u8],
) -> Bytes {
    let mut builder = MessageBuilder::new(op_code, request_id);
    builder.put_i32(leading).put_slice(body);
    builder.finish().freeze()
}

/// Database part of `db.collection`
pub(crate) fn database_of(full_collection_name: &str) -> &str {
    full_collection_name
        .split_once('.')
        .map(|(db, _)| db)
        .unwrap_or(full_collection_name)
}

/// Appends `getlasterror` to an encoded write when it is acknowledged.
///
/// `safe` carries the write-concern options (`w`, `wtimeout`, `j`,
/// `fsync`); `None` leaves the write unacknowledged.
fn with_last_error(
    op_code: OpCode,
    write_request_id: i32,
    write: BytesMut,
    full_collection_name: &str,
    safe: Option<&Document>,
) -> Result<Message> {
    let Some(options) = safe else {
        return Ok(Message {
            request_id: write_request_id,
            op_code,
            payload: write.freeze(),
            expects_reply: false,
        });
    };

    let mut command = doc! { "getlasterror": 1 };
    for (k, v) in options {
        command.insert(k.clone(), v.clone());
    }
    let namespace = format!("{}.{}", database_of(full_collection_name), CMD_COLLECTION);
    let ack_request_id = next_request_id_except(write_request_id);
    let ack = encode_query(ack_request_id, 0, &namespace, 0, -1, &command, None)?;

    let mut payload = write;
    payload.unsplit(ack);
    Ok(Message {
        request_id: ack_request_id,
        op_code,
        payload: payload.freeze(),
        expects_reply: true,
    })
}

/// `OP_INSERT` for one or more documents
pub fn insert(
    full_collection_name: &str,
    documents: &[Document],
    continue_on_error: bool,
    safe: Option<&Document>,
) -> Result<Message> {
    let request_id = next_request_id();
    let flags = if continue_on_error {
        INSERT_CONTINUE_ON_ERROR
    } else {
        0
    };
    let mut builder = MessageBuilder::new(OpCode::Insert, request_id);
    builder.put_i32(flags).put_cstring(full_collection_name);
    for document in documents {
        builder.put_document(document)?;
    }
    with_last_error(
        OpCode::Insert,
        request_id,
        builder.finish(),
        full_collection_name,
        safe,
    )
}

/// `OP_UPDATE`
pub fn update(
    full_collection_name: &str,
    upsert: bool,
    multi: bool,
    selector: &Document,
    document: &Document,
    safe: Option<&Document>,
) -> Result<Message> {
    let request_id = next_request_id();
    let mut flags = 0;
    if upsert {
        flags |= UPDATE_UPSERT;
    }
    if multi {
        flags |= UPDATE_MULTI;
    }
    let mut builder = MessageBuilder::new(OpCode::Update, request_id);
    builder.put_i32(0).put_cstring(full_collection_name).put_i32(flags);
    builder.put_document(selector)?.put_document(document)?;
    with_last_error(
        OpCode::Update,
        request_id,
        builder.finish(),
        full_collection_name,
        safe,
    )
}

/// `OP_DELETE`
pub fn delete(
    full_collection_name: &str,
    selector: &Document,
    single_remove: bool,
    safe: Option<&Document>,
) -> Result<Message> {
    let request_id = next_request_id();
    let flags = if single_remove { DELETE_SINGLE_REMOVE } else { 0 };
    let mut builder = MessageBuilder::new(OpCode::Delete, request_id);
    builder.put_i32(0).put_cstring(full_collection_name).put_i32(flags);
    builder.put_document(selector)?;
    with_last_error(
        OpCode::Delete,
        request_id,
        builder.finish(),
        full_collection_name,
        safe,
    )
}

fn encode_query(
    request_id: i32,
    options: i32,
    full_collection_name: &str,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
    field_selector: Option<&Document>,
) -> Result<BytesMut> {
    let mut builder = MessageBuilder::new(OpCode::Query, request_id);
    builder
        .put_i32(options)
        .put_cstring(full_collection_name)
        .put_i32(number_to_skip)
        .put_i32(number_to_return);
    builder.put_document(query)?;
    if let Some(fields) = field_selector {
        builder.put_document(fields)?;
    }
    Ok(builder.finish())
}

/// `OP_QUERY`; `options` is a combination of [`query_flags`]
pub fn query(
    options: i32,
    full_collection_name: &str,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
    field_selector: Option<&Document>,
) -> Result<Message> {
    let request_id = next_request_id();
    let payload = encode_query(
        request_id,
        options,
        full_collection_name,
        number_to_skip,
        number_to_return,
        query,
        field_selector,
    )?;
    Ok(Message {
        request_id,
        op_code: OpCode::Query,
        payload: payload.freeze(),
        expects_reply: true,
    })
}

/// `OP_GET_MORE`
pub fn get_more(
    full_collection_name: &str,
    number_to_return: i32,
    cursor_id: i64,
) -> Message {
    let request_id = next_request_id();
    let mut builder = MessageBuilder::new(OpCode::GetMore, request_id);
    builder
        .put_i32(0)
        .put_cstring(full_collection_name)
        .put_i32(number_to_return)
        .put_i64(cursor_id);
    Message {
        request_id,
        op_code: OpCode::GetMore,
        payload: builder.finish().freeze(),
        expects_reply: true,
    }
}

/// `OP_KILL_CURSORS`; the server never answers it
pub fn kill_cursors(cursor_ids: &[i64]) -> Message {
    let request_id = next_request_id();
    let mut builder = MessageBuilder::new(OpCode::KillCursors, request_id);
    builder.put_i32(0).put_i32(cursor_ids.len() as i32);
    for id in cursor_ids {
        builder.put_i64(*id);
    }
    Message {
        request_id,
        op_code: OpCode::KillCursors,
        payload: builder.finish().freeze(),
        expects_reply: false,
    }
}

/// `{cmd}` against `<db>.$cmd`, returning a single document
pub(crate) fn command(
    database: &str,
    command: &Document,
    options: i32,
) -> Result<Message> {
    let namespace = format!("{database}.{CMD_COLLECTION}");
    query(options, &namespace, 0, -1, command, None)
}
