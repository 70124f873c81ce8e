use bson::doc;

use super::AuthorizeState;
use crate::connection::Authorize;
use crate::connection::JobInput;
use crate::connection::NextAction;
use crate::test_utils::decode_requests;
use crate::test_utils::reply_with;
use crate::test_utils::DecodedRequest;
use crate::wire::Message;
use crate::Error;
use crate::InterfaceError;

fn sent(action: NextAction) -> (Message, DecodedRequest) {
    match action {
        NextAction::Send(message) => {
            let mut requests = decode_requests(&message.payload);
            assert_eq!(requests.len(), 1);
            (message, requests.remove(0))
        }
        other => panic!("expected Send, got {other:?}"),
    }
}

fn authorize_until_finish() -> Authorize {
    let mut job = Authorize::new("user", "pass", "test");
    job.step(JobInput::Start).unwrap();
    job.step(JobInput::Reply(reply_with(vec![doc! { "nonce": "2375531c32080ae8", "ok": 1.0 }])))
        .unwrap();
    assert_eq!(job.state(), AuthorizeState::Finish);
    job
}

#[test]
fn test_authorize_sends_getnonce_then_key() {
    let mut job = Authorize::new("user", "pass", "test");

    let (message, req) = sent(job.step(JobInput::Start).unwrap());
    assert!(message.expects_reply);
    assert_eq!(req.namespace, "test.$cmd");
    assert_eq!(req.number_to_return, -1);
    assert_eq!(req.command_name(), Some("getnonce"));
    assert_eq!(job.state(), AuthorizeState::Nonce);

    let nonce_reply = reply_with(vec![doc! { "nonce": "2375531c32080ae8", "ok": 1.0 }]);
    let (_, req) = sent(job.step(JobInput::Reply(nonce_reply)).unwrap());
    assert_eq!(req.command_name(), Some("authenticate"));
    let command = &req.documents[0];
    assert_eq!(command.get_str("user").unwrap(), "user");
    assert_eq!(command.get_str("nonce").unwrap(), "2375531c32080ae8");
    assert_eq!(command.get_str("key").unwrap(), "137fdfaac137d05cb01423ccd39679b1");
    assert_eq!(job.state(), AuthorizeState::Finish);

    let done = job.step(JobInput::Reply(reply_with(vec![doc! { "ok": 1 }]))).unwrap();
    assert!(matches!(done, NextAction::Done(None)));
    assert_eq!(job.state(), AuthorizeState::Done);
}

#[test]
fn test_authorize_missing_nonce() {
    let mut job = Authorize::new("user", "pass", "test");
    job.step(JobInput::Start).unwrap();

    let e = job
        .step(JobInput::Reply(reply_with(vec![doc! { "ok": 1.0 }])))
        .unwrap_err();
    assert!(matches!(e, Error::Authentication(_)));
}

#[test]
fn test_authorize_rejected_carries_server_message() {
    let mut job = authorize_until_finish();

    let e = job
        .step(JobInput::Reply(reply_with(vec![doc! { "ok": 0.0, "errmsg": "auth fails" }])))
        .unwrap_err();
    match e {
        Error::Authentication(message) => assert_eq!(message, "auth fails"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_authorize_requires_exactly_one_result() {
    let mut job = authorize_until_finish();

    let e = job
        .step(JobInput::Reply(reply_with(vec![doc! { "ok": 1 }, doc! { "ok": 1 }])))
        .unwrap_err();
    assert!(matches!(e, Error::Authentication(_)));
}

#[test]
fn test_authorize_transport_failure_is_authentication_error() {
    let mut job = Authorize::new("user", "pass", "test");
    job.step(JobInput::Start).unwrap();

    let e = job
        .step(JobInput::Failed(InterfaceError::ConnectionClosed.into()))
        .unwrap_err();
    assert!(matches!(e, Error::Authentication(_)));
}

#[test]
fn test_authorize_rejects_out_of_order_input() {
    let mut job = Authorize::new("user", "pass", "test");

    let e = job.step(JobInput::Connected).unwrap_err();
    assert!(matches!(e, Error::Protocol(_)));
}
