use crate::helpers::{
    FailingEngine, FakeEngine, SlowEngine, StubbornEngine, create_simple_adoc_file,
    launch_embedded, launch_embedded_with_config,
};

use asp_core::client::{AspClient, DefaultProgressMonitor, ProgressMonitor};
use asp_core::config::AspConfig;
use asp_core::error::launch::LaunchError;
use asp_core::launcher::{EmbeddedServerLauncher, LauncherState, ServerLauncher};
use asp_core::proto::{AspJobResponse, AspResponse, asp_response};

use common::SecretKey;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn backend(name: &str) -> HashMap<String, String> {
    HashMap::from([("backend".to_string(), name.to_string())])
}

/// **VALUE**: Verifies that liveness with the correct key is stable over many calls.
///
/// **WHY THIS MATTERS**: Every call opens and closes a connection. A leaked socket, task or
/// job registry entry per call would show up as failures long before 1000 calls.
///
/// **BUG THIS CATCHES**: Would catch per-connection resource leaks and any state that makes
/// the second ping behave differently from the first.
#[tokio::test]
async fn given_launched_server_when_pinged_1000_times_then_always_alive() {
    // GIVEN: A running embedded server
    let (mut launcher, _key, client) = launch_embedded(4451, Arc::new(FakeEngine::default())).await;

    // WHEN/THEN: 1000 consecutive pings all succeed
    for i in 0..1000 {
        assert!(client.is_server_alive(None).await, "Ping {i} should succeed");
    }

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a wrong key is refused for every request kind and never reaches
/// the engine.
///
/// **WHY THIS MATTERS**: The key is the only authorization on a server that runs arbitrary
/// conversions of local files. Any leak here lets another local user drive the engine.
///
/// **BUG THIS CATCHES**: Would catch checking the key only for Convert, or running the engine
/// before checking it.
#[tokio::test]
async fn given_wrong_secret_key_when_calling_server_then_rejected_without_engine_call() {
    // GIVEN: A running server and a client holding a different key
    let engine = Arc::new(FakeEngine::default());
    let (mut launcher, _key, client) = launch_embedded(4452, engine.clone()).await;
    let impostor = AspClient::new(SecretKey::generate()).with_port(4452);
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());

    // WHEN: The impostor pings and converts
    let alive = impostor.is_server_alive(None).await;
    let response = impostor.convert_file(&source, &HashMap::new(), None).await;

    // THEN: Ping is false, convert fails with an auth error, engine untouched
    assert!(!alive, "Wrong key must not report alive");
    assert!(response.failed());
    assert!(
        response
            .error_message()
            .unwrap_or_default()
            .contains("Authentication failed"),
        "Got: {:?}",
        response.error_message()
    );
    assert_eq!(engine.calls(), 0, "Engine must not run for a rejected request");

    // AND: A Stop with the wrong key does not stop the server
    let stop = impostor.stop_server().await;
    assert!(stop.failed());
    assert!(client.is_server_alive(None).await, "Server should still be alive");

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a second server on an occupied port fails with a bind conflict and
/// leaves the first one untouched.
///
/// **WHY THIS MATTERS**: Silently "succeeding" against the already listening server would hand
/// the caller a key that server does not know, and every later call would fail authentication.
///
/// **BUG THIS CATCHES**: Would catch treating AddrInUse as success, losing the io::Error cause,
/// or tearing down the first server while cleaning up the second.
#[tokio::test]
async fn given_port_in_use_when_second_server_launched_then_port_in_use_error() {
    // GIVEN: A server already on the port
    let (mut first, _key, first_client) =
        launch_embedded(4453, Arc::new(FakeEngine::default())).await;

    // WHEN: A second launcher targets the same port
    let mut second = EmbeddedServerLauncher::new().with_engine(Arc::new(FakeEngine::default()));
    let result = second.launch(4453).await;

    // THEN: PortInUse carrying the AddrInUse cause
    match result {
        Err(LaunchError::PortInUse { port, source, .. }) => {
            assert_eq!(port, 4453);
            assert_eq!(source.kind(), ErrorKind::AddrInUse);
        }
        other => panic!("Expected PortInUse, got {other:?}"),
    }
    assert_eq!(second.state(), LauncherState::Stopped);
    assert!(second.port().is_none());

    // AND: The first server keeps working
    assert!(first_client.is_server_alive(None).await);
    assert_eq!(first.state(), LauncherState::Listening);

    first.stop_server().await;
}

/// **VALUE**: Verifies that launching twice on the same launcher is refused.
///
/// **BUG THIS CATCHES**: Would catch a second `launch` replacing the handle and orphaning the
/// first server with a key nobody holds.
#[tokio::test]
async fn given_listening_launcher_when_launched_again_then_already_launched_error() {
    // GIVEN: A listening launcher
    let (mut launcher, _key, client) = launch_embedded(4454, Arc::new(FakeEngine::default())).await;

    // WHEN: Launching again
    let result = launcher.launch(4454).await;

    // THEN: AlreadyLaunched, and the original server is still up
    assert!(matches!(result, Err(LaunchError::AlreadyLaunched { .. })));
    assert_eq!(launcher.state(), LauncherState::Listening);
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies the happy path of an HTML conversion with a monitor attached.
///
/// **BUG THIS CATCHES**: Would catch a result path not pointing at the written file, or the
/// monitor never reaching 100 on success.
#[tokio::test]
async fn given_valid_source_when_converted_to_html_then_returns_existing_html_file() {
    // GIVEN: A running server and a source file
    let (mut launcher, _key, client) = launch_embedded(4455, Arc::new(FakeEngine::default())).await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());
    let monitor = DefaultProgressMonitor::new();

    // WHEN: Converting with backend=html
    let response = client
        .convert_file(&source, &backend("html"), Some(&monitor))
        .await;

    // THEN: Success with an existing .html artifact
    assert!(!response.failed(), "Got: {:?}", response.error_message());
    let path = response.result_file_path().expect("result path");
    assert!(path.exists(), "{} should exist", path.display());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("html"));
    assert!(response.error_message().is_none());
    assert_eq!(monitor.progress(), 100);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that `backend=pdf` yields a PDF artifact.
///
/// **BUG THIS CATCHES**: Would catch options being dropped between client and engine.
#[tokio::test]
async fn given_pdf_backend_when_converted_then_returns_pdf_file() {
    // GIVEN: A running server and a source file
    let (mut launcher, _key, client) = launch_embedded(4456, Arc::new(FakeEngine::default())).await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());

    // WHEN: Converting with backend=pdf
    let response = client.convert_file(&source, &backend("pdf"), None).await;

    // THEN: A .pdf file is returned
    assert!(!response.failed(), "Got: {:?}", response.error_message());
    let path = response.result_file_path().expect("result path");
    assert!(path.exists());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that canceling through the monitor ends a long conversion promptly.
///
/// **WHY THIS MATTERS**: Cancel is the user's only way out of a conversion that would otherwise
/// take seconds or minutes. The call must return soon after cancel, not when the engine ends.
///
/// **BUG THIS CATCHES**: Would catch a client that only checks the monitor before sending, a
/// server that ignores Cancel, or a cancel that kills the whole server.
#[tokio::test]
async fn given_running_conversion_when_monitor_canceled_then_returns_canceled_promptly() {
    // GIVEN: A server whose engine takes 5 seconds
    let (mut launcher, _key, client) = launch_embedded(
        4457,
        Arc::new(SlowEngine {
            duration: Duration::from_secs(5),
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());
    let monitor = DefaultProgressMonitor::new();

    // WHEN: The monitor is canceled 500ms into the call
    let canceller = monitor.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.set_canceled(true);
    });
    let started = Instant::now();
    let response = client
        .convert_file(&source, &HashMap::new(), Some(&monitor))
        .await;
    let elapsed = started.elapsed();

    // THEN: A failed, canceled response arrives well before the engine would finish
    assert!(response.failed());
    assert!(
        response.error_message().unwrap_or_default().contains("canceled"),
        "Got: {:?}",
        response.error_message()
    );
    assert!(response.is_canceled());
    assert!(response.result_file_path().is_none());
    assert!(elapsed < Duration::from_secs(3), "Cancel took {elapsed:?}");

    // AND: The server survives and the job is gone shortly after
    assert!(client.is_server_alive(None).await);
    let handle = launcher.handle().expect("server handle");
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.active_jobs().await > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.active_jobs().await, 0);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that engine errors reach the client as the error message.
///
/// **BUG THIS CATCHES**: Would catch replacing the engine's message with a generic one, which
/// leaves users without the reason their document failed.
#[tokio::test]
async fn given_failing_engine_when_converted_then_error_message_is_propagated() {
    // GIVEN: A server whose engine always fails
    let (mut launcher, _key, client) = launch_embedded(
        4458,
        Arc::new(FailingEngine {
            message: "unknown macro: chart::data[]",
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());

    // WHEN: Converting
    let response = client.convert_file(&source, &HashMap::new(), None).await;

    // THEN: Failed with the engine's message, no path
    assert!(response.failed());
    assert!(response.result_file_path().is_none());
    assert!(
        response
            .error_message()
            .unwrap_or_default()
            .contains("unknown macro: chart::data[]")
    );
    assert!(!response.is_canceled());

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that stop is idempotent, frees the port and allows a relaunch.
///
/// **WHY THIS MATTERS**: Callers stop servers from cleanup paths that may run more than once.
/// A stop that leaves the socket bound makes the next launch fail with PortInUse.
///
/// **BUG THIS CATCHES**: Would catch panicking on a second stop, a listener kept alive by a
/// lingering task, or a launcher stuck in `Stopped`.
#[tokio::test]
async fn given_launched_server_when_stopped_twice_then_port_freed_and_relaunchable() {
    // GIVEN: A launcher that was never started
    let mut idle = EmbeddedServerLauncher::new();

    // WHEN: Stopping it
    idle.stop_server().await;

    // THEN: No error and still NotStarted
    assert_eq!(idle.state(), LauncherState::NotStarted);

    // GIVEN: A running server
    let (mut launcher, old_key, client) =
        launch_embedded(4459, Arc::new(FakeEngine::default())).await;

    // WHEN: Stopping twice
    launcher.stop_server().await;
    launcher.stop_server().await;

    // THEN: Stopped, unreachable and the port can be bound again
    assert_eq!(launcher.state(), LauncherState::Stopped);
    assert!(!client.is_server_alive(None).await);
    let probe = TcpListener::bind(("127.0.0.1", 4459)).await;
    assert!(probe.is_ok(), "Port should be free after stop: {probe:?}");
    drop(probe);

    // AND: The same launcher can start again with a fresh key
    let new_key = launcher.launch(4459).await.expect("relaunch");
    assert_eq!(launcher.state(), LauncherState::Listening);
    assert_ne!(new_key, old_key, "Relaunch must generate a new key");
    launcher.stop_server().await;
}

/// **VALUE**: Verifies the timed launch variant.
///
/// **BUG THIS CATCHES**: Would catch the timed variant returning before the server answers.
#[tokio::test]
async fn given_timeout_when_launch_with_timeout_called_then_server_alive_on_return() {
    // GIVEN: A fresh launcher
    let mut launcher = EmbeddedServerLauncher::new().with_engine(Arc::new(FakeEngine::default()));

    // WHEN: Launching with a 5 second budget
    let key = launcher.launch_with_timeout(4461, 5).await.expect("launch");

    // THEN: The server answers immediately
    let client = AspClient::new(key).with_port(4461);
    assert!(client.is_server_alive(None).await);
    assert_eq!(launcher.port(), Some(4461));

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a Cancel without a job id cancels the latest in-flight job.
///
/// **WHY THIS MATTERS**: A second process that only knows the key (not the job id) must still
/// be able to stop a runaway conversion.
///
/// **BUG THIS CATCHES**: Would catch an empty id being looked up literally and ignored.
#[tokio::test]
async fn given_in_flight_job_when_cancel_without_id_then_job_fails_as_canceled() {
    // GIVEN: A slow conversion running on one connection
    let (mut launcher, _key, client) = launch_embedded(
        4462,
        Arc::new(SlowEngine {
            duration: Duration::from_secs(5),
        }),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());
    let converting_client = client.clone();
    let conversion = tokio::spawn(async move {
        converting_client
            .convert_file(&source, &HashMap::new(), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    // WHEN: Another connection cancels without naming the job
    let ack = client.cancel_job("").await;

    // THEN: The ack names the job and the conversion ends canceled
    assert!(!ack.failed());
    assert!(ack.job_id().is_some(), "Ack should name the canceled job");
    let response = tokio::time::timeout(Duration::from_secs(3), conversion)
        .await
        .expect("conversion should end after cancel")
        .unwrap();
    assert!(response.is_canceled(), "Got: {:?}", response.error_message());

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that an engine ignoring cancellation is abandoned after the grace period.
///
/// **BUG THIS CATCHES**: Would catch the dispatcher waiting on the blocking worker forever,
/// which ties the client's connection to an engine that never checks its flag.
#[tokio::test]
async fn given_engine_ignoring_cancel_when_grace_elapses_then_canceled_response_sent() {
    // GIVEN: A server with a 200ms grace period and an engine that ignores cancel
    let mut config = AspConfig::default();
    config.server.cancel_grace_period_ms = 200;
    let (mut launcher, _key, client) = launch_embedded_with_config(
        4463,
        Arc::new(StubbornEngine {
            duration: Duration::from_secs(4),
        }),
        config,
    )
    .await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());
    let converting_client = client.clone();
    let conversion = tokio::spawn(async move {
        converting_client
            .convert_file(&source, &HashMap::new(), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    // WHEN: Canceling the job
    let started = Instant::now();
    client.cancel_job("").await;

    // THEN: The conversion call returns canceled long before the engine finishes
    let response = tokio::time::timeout(Duration::from_secs(2), conversion)
        .await
        .expect("dispatcher should abandon the worker")
        .unwrap();
    assert!(response.is_canceled(), "Got: {:?}", response.error_message());
    assert!(started.elapsed() < Duration::from_secs(2));

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a monitor canceled before the call short-circuits.
///
/// **BUG THIS CATCHES**: Would catch starting a conversion the caller already abandoned.
#[tokio::test]
async fn given_precanceled_monitor_when_convert_called_then_engine_never_runs() {
    // GIVEN: A server and an already canceled monitor
    let engine = Arc::new(FakeEngine::default());
    let (mut launcher, _key, client) = launch_embedded(4464, engine.clone()).await;
    let dir = TempDir::new().unwrap();
    let source = create_simple_adoc_file(dir.path());
    let monitor = DefaultProgressMonitor::new();
    monitor.set_canceled(true);

    // WHEN: Converting and pinging with it
    let response = client
        .convert_file(&source, &HashMap::new(), Some(&monitor))
        .await;
    let alive = client.is_server_alive(Some(&monitor)).await;

    // THEN: Canceled response, false liveness, engine untouched
    assert!(response.is_canceled());
    assert!(!alive);
    assert_eq!(engine.calls(), 0);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that an undecodable frame gets a failed response rather than a dropped
/// connection or a crash.
///
/// **BUG THIS CATCHES**: Would catch a decode error taking down the accept loop.
#[tokio::test]
async fn given_garbage_frame_when_sent_then_server_answers_invalid_request() {
    // GIVEN: A running server and a raw WebSocket connection
    let (mut launcher, _key, client) = launch_embedded(4465, Arc::new(FakeEngine::default())).await;
    let (mut ws, _) = connect_async("ws://127.0.0.1:4465")
        .await
        .expect("Failed to connect");

    // WHEN: Sending bytes that are not a valid request
    ws.send(Message::Binary(vec![0xff, 0xff, 0xff, 0x0f].into()))
        .await
        .expect("Failed to send");
    let frame = ws.next().await.expect("response frame").expect("read ok");

    // THEN: A failed job response explaining the request was invalid
    let response = AspResponse::decode(&frame.into_data()[..]).expect("decodable response");
    match response.payload {
        Some(asp_response::Payload::Job(AspJobResponse {
            failed,
            error_message,
            ..
        })) => {
            assert!(failed);
            assert!(error_message.unwrap_or_default().contains("Invalid request"));
        }
        other => panic!("Expected job response, got {other:?}"),
    }

    // AND: The server keeps serving
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a connection which never sends anything is closed once the request
/// read deadline passes.
///
/// **WHY THIS MATTERS**: Every accepted connection owns a task and a file descriptor. Without
/// a deadline any local process can pin them indefinitely by opening sockets and going quiet.
///
/// **BUG THIS CATCHES**: Would catch awaiting the WebSocket handshake or the request frame
/// without a timeout.
#[tokio::test]
async fn given_idle_connection_when_read_deadline_passes_then_server_closes_it() {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    // GIVEN: A server with a short request read deadline
    let mut config = AspConfig::default();
    config.server.request_read_timeout_ms = 300;
    let (mut launcher, _key, client) =
        launch_embedded_with_config(4460, Arc::new(FakeEngine::default()), config).await;

    // WHEN: A raw TCP connection is opened and left silent
    let mut idle = TcpStream::connect("127.0.0.1:4460")
        .await
        .expect("Failed to connect");
    let mut buffer = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), idle.read(&mut buffer))
        .await
        .expect("Server kept the idle connection open past its deadline");

    // THEN: The server hung up without sending anything
    assert_eq!(read.expect("read ok"), 0);

    // AND: The server keeps serving other clients
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}
