use crate::helpers::{FakeEngine, create_simple_adoc_file, launch_embedded};

use asp_core::client::AspClient;
use asp_core::config::ClientSettings;
use asp_core::launcher::ServerLauncher;

use common::SecretKey;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// **VALUE**: Verifies that calls against a port nobody listens on resolve to typed failures.
///
/// **WHY THIS MATTERS**: Callers use `is_server_alive` to decide whether to launch. A panic or
/// a hang here would break the startup path of every client.
///
/// **BUG THIS CATCHES**: Would catch transport errors escaping as panics, or a ping that waits
/// far longer than its configured timeout.
#[tokio::test]
async fn given_no_server_when_client_calls_then_false_and_transport_failure() {
    // GIVEN: A client pointed at a closed port with short timeouts
    let settings = ClientSettings {
        connect_timeout_ms: 500,
        ping_timeout_ms: 500,
        ..Default::default()
    };
    let client = AspClient::new(SecretKey::generate())
        .with_settings(settings)
        .with_port(4469);
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());

    // WHEN: Pinging and converting
    let started = Instant::now();
    let alive = client.is_server_alive(None).await;
    let response = client.convert_file(&source, &HashMap::new(), None).await;

    // THEN: false, and a failed response naming the transport
    assert!(!alive);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(response.failed());
    assert!(
        response
            .error_message()
            .unwrap_or_default()
            .contains("Transport failure"),
        "Got: {:?}",
        response.error_message()
    );
}

/// **VALUE**: Verifies that canceling an unknown job is acknowledged as a no-op.
///
/// **BUG THIS CATCHES**: Would catch Cancel for a finished job being reported as a failure, or
/// canceling some unrelated job instead.
#[tokio::test]
async fn given_unknown_job_when_cancel_job_called_then_acknowledged_without_effect() {
    // GIVEN: A running server with no active jobs
    let (mut launcher, _key, client) = launch_embedded(4466, Arc::new(FakeEngine::default())).await;

    // WHEN: Canceling a job that never existed
    let ack = client.cancel_job("no-such-job").await;

    // THEN: Not failed, no path, no message
    assert!(!ack.failed());
    assert!(ack.result_file_path().is_none());
    assert!(ack.error_message().is_none());
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that an authenticated Stop request shuts the server down.
///
/// **WHY THIS MATTERS**: The external launcher stops its child with exactly this request.
///
/// **BUG THIS CATCHES**: Would catch Stop being acknowledged but never acted on.
#[tokio::test]
async fn given_authenticated_client_when_stop_server_called_then_server_stops_listening() {
    // GIVEN: A running server
    let (mut launcher, _key, client) = launch_embedded(4467, Arc::new(FakeEngine::default())).await;

    // WHEN: The client sends Stop
    let ack = client.stop_server().await;

    // THEN: Acknowledged, and the server stops answering
    assert!(!ack.failed(), "Got: {:?}", ack.error_message());
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.is_server_alive(None).await && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!client.is_server_alive(None).await);

    // AND: The launcher's own stop is still safe
    launcher.stop_server().await;
}
