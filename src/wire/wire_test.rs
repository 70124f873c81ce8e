use bson::doc;
use bson::Document;

use super::*;
use crate::constants::REPLY_CURSOR_NOT_FOUND;
use crate::constants::REPLY_QUERY_FAILURE;
use crate::test_utils::decode_requests;
use crate::test_utils::encode_reply;
use crate::Error;
use crate::InterfaceError;
use crate::ProtocolError;
use crate::QueryError;

fn header_of(bytes: &[u8]) -> MessageHeader {
    MessageHeader::parse(bytes).unwrap()
}

#[test]
fn test_frame_header_matches_payload() {
    let ops = [
        OpCode::Update,
        OpCode::Insert,
        OpCode::Query,
        OpCode::GetMore,
        OpCode::Delete,
        OpCode::KillCursors,
    ];
    for (i, op) in ops.into_iter().enumerate() {
        let body = vec![0xabu8; i * 7];
        let bytes = frame(op, 99, 0, &body);
        let header = header_of(&bytes);

        assert_eq!(bytes.len(), body.len() + 20);
        assert_eq!(header.message_length as usize, body.len() + 20);
        assert_eq!(OpCode::try_from(header.op_code).unwrap(), op);
        assert_eq!(header.request_id, 99);
        assert_eq!(header.response_to, 0);
    }
}

#[test]
fn test_unknown_opcode() {
    assert!(matches!(
        OpCode::try_from(2010),
        Err(ProtocolError::UnexpectedOpCode(2010))
    ));
}

#[test]
fn test_header_too_short() {
    assert!(MessageHeader::parse(&[0u8; 15]).is_err());
}

#[test]
fn test_document_survives_insert_encoding() {
    let document = doc! {
        "_id": 1,
        "name": "alice",
        "tags": ["a", "b"],
        "nested": { "x": 1.5, "y": bson::Bson::Null },
    };
    let message = insert("test.people", &[document.clone()], false, None).unwrap();
    let requests = decode_requests(&message.payload);

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].namespace, "test.people");
    assert_eq!(requests[0].documents, vec![document]);
}

#[test]
fn test_unacknowledged_insert_is_single_message() {
    let message = insert("test.people", &[doc! { "_id": 1 }, doc! { "_id": 2 }], true, None).unwrap();

    assert!(!message.expects_reply);
    assert_eq!(message.len() as i32, header_of(&message.payload).message_length);
    let requests = decode_requests(&message.payload);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].op_code, OpCode::Insert);
    assert_eq!(requests[0].flags, 1);
    assert_eq!(requests[0].documents.len(), 2);
}

#[test]
fn test_acknowledged_write_appends_getlasterror_with_own_id() {
    let safe = doc! { "w": 2, "wtimeout": 500 };
    let message = update(
        "shop.items",
        true,
        true,
        &doc! { "sku": "x" },
        &doc! { "$set": { "qty": 1 } },
        Some(&safe),
    )
    .unwrap();

    assert!(message.expects_reply);
    let requests = decode_requests(&message.payload);
    assert_eq!(requests.len(), 2);

    let (write, ack) = (&requests[0], &requests[1]);
    assert_eq!(write.op_code, OpCode::Update);
    assert_eq!(write.flags, 3);
    assert_eq!(ack.op_code, OpCode::Query);
    assert_eq!(ack.namespace, "shop.$cmd");
    assert_eq!(ack.number_to_return, -1);
    assert_eq!(ack.documents[0], doc! { "getlasterror": 1, "w": 2, "wtimeout": 500 });

    assert_ne!(write.request_id, ack.request_id);
    assert_eq!(message.request_id, ack.request_id);
}

#[test]
fn test_delete_flags() {
    let message = delete("shop.items", &doc! { "sku": "x" }, true, None).unwrap();
    let requests = decode_requests(&message.payload);
    assert_eq!(requests[0].op_code, OpCode::Delete);
    assert_eq!(requests[0].flags, 1);
    assert_eq!(requests[0].documents, vec![doc! { "sku": "x" }]);
}

#[test]
fn test_query_with_field_selector() {
    let message = query(
        query_flags::SLAVE_OK | query_flags::TAILABLE,
        "shop.items",
        5,
        10,
        &doc! { "qty": { "$gt": 1 } },
        Some(&doc! { "sku": 1 }),
    )
    .unwrap();
    let req = &decode_requests(&message.payload)[0];

    assert_eq!(req.flags, 6);
    assert_eq!(req.number_to_skip, 5);
    assert_eq!(req.number_to_return, 10);
    assert_eq!(req.documents.len(), 2);
}

#[test]
fn test_get_more_and_kill_cursors() {
    let more = get_more("shop.items", 20, 0x1122_3344_5566);
    let req = &decode_requests(&more.payload)[0];
    assert!(more.expects_reply);
    assert_eq!(req.cursor_ids, vec![0x1122_3344_5566]);
    assert_eq!(req.number_to_return, 20);

    let kill = kill_cursors(&[7, 8]);
    assert!(!kill.expects_reply);
    assert_eq!(decode_requests(&kill.payload)[0].cursor_ids, vec![7, 8]);
}

#[test]
fn test_database_of() {
    assert_eq!(database_of("shop.items.archive"), "shop");
    assert_eq!(database_of("shop"), "shop");
}

#[test]
fn test_parse_response_documents() {
    let docs = vec![doc! { "a": 1 }, doc! { "b": "two" }];
    let reply = parse_response(&encode_reply(17, 0, 99, &docs)).unwrap();

    assert_eq!(reply.header.response_to, 17);
    assert_eq!(reply.cursor_id, 99);
    assert_eq!(reply.number_returned, 2);
    assert_eq!(reply.documents, docs);
    assert_eq!(reply.into_first(), Some(doc! { "a": 1 }));
}

#[test]
fn test_parse_response_count_mismatch() {
    let mut bytes = encode_reply(1, 0, 0, &[doc! { "a": 1 }]);
    // numberReturned follows flags (4), cursorId (8) and startingFrom (4)
    bytes[16 + 16..16 + 20].copy_from_slice(&3i32.to_le_bytes());

    let e = parse_response(&bytes).unwrap_err();
    assert!(matches!(
        e,
        Error::Protocol(ProtocolError::DocumentCountMismatch { announced: 3, decoded: 1 })
    ));
}

#[test]
fn test_parse_response_length_bounds() {
    let mut bytes = encode_reply(1, 0, 0, &[]);
    bytes[..4].copy_from_slice(&20i32.to_le_bytes());
    assert!(matches!(
        parse_response(&bytes),
        Err(Error::Protocol(ProtocolError::InvalidLength(20)))
    ));

    let header = MessageHeader {
        message_length: 64 * 1024 * 1024,
        request_id: 1,
        response_to: 1,
        op_code: OpCode::Reply as i32,
    };
    assert!(header.reply_body_len().is_err());

    let request = MessageHeader {
        op_code: OpCode::Query as i32,
        message_length: 100,
        ..header
    };
    assert!(matches!(
        request.reply_body_len(),
        Err(Error::Protocol(ProtocolError::UnexpectedOpCode(2004)))
    ));
}

#[test]
fn test_cursor_not_found_flag() {
    let bytes = encode_reply(1, REPLY_CURSOR_NOT_FOUND, 55, &[]);
    assert!(matches!(
        parse_response(&bytes),
        Err(Error::Interface(InterfaceError::CursorNotFound { cursor_id: 55 }))
    ));
}

#[test]
fn test_query_failure_flag() {
    let failed: Vec<Document> = vec![doc! { "$err": "bad hint", "code": 17007 }];
    let e = parse_response(&encode_reply(1, REPLY_QUERY_FAILURE, 0, &failed)).unwrap_err();
    assert!(matches!(e, Error::Query(QueryError::Failed { code: Some(17007), .. })));

    let by_code = vec![doc! { "$err": "node is recovering", "code": 13436 }];
    let e = parse_response(&encode_reply(1, REPLY_QUERY_FAILURE, 0, &by_code)).unwrap_err();
    assert!(matches!(e, Error::Query(QueryError::NotMaster(_))));

    let by_message = vec![doc! { "$err": "not master" }];
    let e = parse_response(&encode_reply(1, REPLY_QUERY_FAILURE, 0, &by_message)).unwrap_err();
    assert!(matches!(e, Error::Query(QueryError::NotMaster(_))));
}

#[test]
fn test_protocol_field_helpers() {
    let reply = doc! { "ok": 1, "code": 11000.0, "ismaster": true, "err": bson::Bson::Null, "n": 2i64 };
    assert!(is_ok(&reply));
    assert_eq!(error_code(&reply), Some(11000));
    assert!(flag(&reply, "ismaster"));
    assert!(!flag(&reply, "secondary"));
    assert_eq!(string(&reply, "err"), None);
    assert_eq!(numeric(&reply, "n"), Some(2.0));
    assert!(!is_ok(&doc! { "ok": 0.0 }));
}
