// Unit tests for wire message helpers

use crate::proto::asp_request::Payload;
use crate::proto::{AspCancelRequest, AspPingRequest, AspRequest, AspResponse, asp_response};

use common::SecretKey;

use prost::Message;

/// **VALUE**: Verifies that every request carries the key it was built with.
///
/// **WHY THIS MATTERS**: The server authenticates each request on its own. A constructor that
/// forgot the key would make every call fail authentication.
///
/// **BUG THIS CATCHES**: Would catch sending the redacted `Display` form instead of the key.
#[test]
fn given_secret_key_when_request_built_then_carries_raw_key_and_kind() {
    // GIVEN: A key
    let key = SecretKey::generate();

    // WHEN: Building a cancel request
    let request = AspRequest::new(
        &key,
        Payload::Cancel(AspCancelRequest {
            job_id: "job-1".to_string(),
        }),
    );

    // THEN: Key and kind are set
    assert!(key.matches(&request.secret_key));
    assert_eq!(request.kind(), "cancel");
}

/// **VALUE**: Verifies that a ping response decodes into the alive payload.
///
/// **BUG THIS CATCHES**: Would catch colliding oneof tags between the ping and job payloads,
/// which makes a job response decode as a ping.
#[test]
fn given_encoded_alive_response_when_decoded_then_yields_alive_payload() {
    // GIVEN: An encoded alive(true) response
    let bytes = AspResponse::alive(true).encode_to_vec();

    // WHEN: Decoding
    let decoded = AspResponse::decode(bytes.as_slice()).unwrap();

    // THEN: Alive payload with true
    match decoded.payload {
        Some(asp_response::Payload::Alive(ping)) => assert!(ping.alive),
        other => panic!("Expected alive payload, got {other:?}"),
    }
}

/// **VALUE**: Verifies that a request without payload is reported as `empty`.
///
/// **BUG THIS CATCHES**: Would catch decoding junk into a default Ping that bypasses validation.
#[test]
fn given_request_without_payload_when_kind_checked_then_reports_empty() {
    let request = AspRequest {
        secret_key: String::new(),
        payload: None,
    };
    assert_eq!(request.kind(), "empty");

    let ping = AspRequest::new(&SecretKey::generate(), Payload::Ping(AspPingRequest {}));
    assert_eq!(ping.kind(), "ping");
}
