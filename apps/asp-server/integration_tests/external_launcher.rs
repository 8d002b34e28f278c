//! External-process launcher tests against the real `asp-server` binary.
//!
//! Serialized: each test spawns a child process and binds a fixed port.

use asp_core::client::{AspClient, DefaultProgressMonitor};
use asp_core::config::AspConfig;
use asp_core::engine::{CancellationFlag, ConversionEngine, ConversionRequest};
use asp_core::error::engine::EngineError;
use asp_core::error::launch::LaunchError;
use asp_core::launcher::{
    EmbeddedServerLauncher, ExternalProcessServerLauncher, LauncherState, ServerLauncher,
};

use common::SecretKey;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::TempDir;

const SERVER_BINARY: &str = env!("CARGO_BIN_EXE_asp-server");

fn external_launcher() -> ExternalProcessServerLauncher {
    ExternalProcessServerLauncher::new(SERVER_BINARY)
}

/// Launch through the shared contract, then check liveness and stop.
async fn launch_ping_and_stop<L: ServerLauncher>(launcher: &mut L, port: u16) -> SecretKey {
    let key = launcher.launch(port).await.expect("launch should succeed");
    assert_eq!(launcher.state(), LauncherState::Listening);

    let client = AspClient::new(key.clone()).with_port(port);
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
    assert_eq!(launcher.state(), LauncherState::Stopped);
    assert!(!client.is_server_alive(None).await);
    key
}

#[derive(Debug)]
struct NeverCalledEngine;

impl ConversionEngine for NeverCalledEngine {
    fn convert(
        &self,
        _request: &ConversionRequest,
        _cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        Err(EngineError::failed("not used in these tests"))
    }
}

/// **VALUE**: Verifies the full external lifecycle: spawn, key announcement, 1000 pings, stop.
///
/// **WHY THIS MATTERS**: This is the path production callers use. The key only exists inside
/// the child until it announces it, so any break in the announcement contract makes every
/// launch time out.
///
/// **BUG THIS CATCHES**: Would catch the binary printing logs to stdout ahead of the key,
/// the key line format drifting from the parser, or per-connection leaks in the child.
#[tokio::test]
#[serial]
async fn given_server_binary_when_launched_then_alive_for_1000_pings_and_stops() {
    // GIVEN: An external launcher for the built binary
    let mut launcher = external_launcher();

    // WHEN: Launching on a fixed port
    let key = launcher.launch(4481).await.expect("launch should succeed");

    // THEN: The child answers 1000 consecutive pings with the returned key
    let client = AspClient::new(key).with_port(4481);
    for i in 0..1000 {
        assert!(client.is_server_alive(None).await, "Ping {i} should succeed");
    }
    assert!(launcher.pid().is_some());
    assert_eq!(launcher.port(), Some(4481));

    // AND: Stop shuts the child down and frees the port
    launcher.stop_server().await;
    assert!(!client.is_server_alive(None).await);
    let probe = tokio::net::TcpListener::bind(("127.0.0.1", 4481)).await;
    assert!(probe.is_ok(), "Port should be free after stop: {probe:?}");
}

/// **VALUE**: Verifies that a wrong key is refused by the child process too.
///
/// **BUG THIS CATCHES**: Would catch the binary starting its server without the key it
/// announced (e.g. generating a second key after printing the first).
#[tokio::test]
#[serial]
async fn given_external_server_when_wrong_key_used_then_rejected() {
    // GIVEN: A running external server
    let mut launcher = external_launcher();
    let key = launcher.launch(4482).await.expect("launch should succeed");

    // WHEN: Pinging with a different key and with the right key
    let impostor = AspClient::new(SecretKey::generate()).with_port(4482);
    let client = AspClient::new(key).with_port(4482);

    // THEN: Only the right key is accepted
    assert!(!impostor.is_server_alive(None).await);
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that an occupied port fails fast with PortInUse and spawns nothing.
///
/// **WHY THIS MATTERS**: Without the probe, the child would fail to bind and the launcher
/// would wait for the full startup timeout before reporting a generic error.
///
/// **BUG THIS CATCHES**: Would catch losing the AddrInUse cause, or succeeding against the
/// server that already owns the port.
#[tokio::test]
#[serial]
async fn given_port_held_by_embedded_server_when_external_launched_then_port_in_use() {
    // GIVEN: An embedded server holding the port
    let mut embedded = EmbeddedServerLauncher::new().with_engine(Arc::new(NeverCalledEngine));
    let embedded_key = embedded.launch(4483).await.expect("embedded launch");

    // WHEN: Launching the external server on the same port
    let mut launcher = external_launcher();
    let result = launcher.launch_with_timeout(4483, 10).await;

    // THEN: PortInUse with the bind cause, launcher Stopped, no child
    match result {
        Err(LaunchError::PortInUse { source, .. }) => {
            assert_eq!(source.kind(), ErrorKind::AddrInUse)
        }
        other => panic!("Expected PortInUse, got {other:?}"),
    }
    assert_eq!(launcher.state(), LauncherState::Stopped);
    assert!(launcher.pid().is_none());

    // AND: The embedded server is unaffected
    let client = AspClient::new(embedded_key).with_port(4483);
    assert!(client.is_server_alive(None).await);

    embedded.stop_server().await;
}

/// **VALUE**: Verifies that stop is idempotent and safe before any launch.
///
/// **BUG THIS CATCHES**: Would catch stop panicking when there is no child, or a second stop
/// trying to kill an already reaped process.
#[tokio::test]
#[serial]
async fn given_external_launcher_when_stopped_repeatedly_then_no_error() {
    // GIVEN: A launcher that never launched
    let mut launcher = external_launcher();

    // WHEN: Stopping it
    launcher.stop_server().await;

    // THEN: Still NotStarted
    assert_eq!(launcher.state(), LauncherState::NotStarted);

    // WHEN: Launching, then stopping twice
    launcher.launch(4484).await.expect("launch should succeed");
    launcher.stop_server().await;
    launcher.stop_server().await;

    // THEN: Stopped, port free
    assert_eq!(launcher.state(), LauncherState::Stopped);
    let probe = tokio::net::TcpListener::bind(("127.0.0.1", 4484)).await;
    assert!(probe.is_ok(), "Port should be free after stop: {probe:?}");
}

/// **VALUE**: Verifies that both strategies satisfy the same lifecycle contract.
///
/// **WHY THIS MATTERS**: Callers pick a strategy at construction and then use it through
/// `ServerLauncher` only. Diverging behavior would surface only in production.
///
/// **BUG THIS CATCHES**: Would catch one strategy leaving the state at Listening after stop,
/// or keeping the old server reachable.
#[tokio::test]
#[serial]
async fn given_either_strategy_when_driven_through_trait_then_same_lifecycle() {
    let mut embedded = EmbeddedServerLauncher::new().with_engine(Arc::new(NeverCalledEngine));
    let mut external = external_launcher();

    let embedded_key = launch_ping_and_stop(&mut embedded, 4485).await;
    let external_key = launch_ping_and_stop(&mut external, 4486).await;

    assert_ne!(embedded_key, external_key, "Each launch must get its own key");
}

/// **VALUE**: Verifies that the output handler sees child output with the key redacted.
///
/// **WHY THIS MATTERS**: Output handlers typically write to logs. Forwarding the raw key line
/// would put the server's only credential into log files.
///
/// **BUG THIS CATCHES**: Would catch forwarding the announcement line unmodified.
#[tokio::test]
#[serial]
async fn given_output_handler_when_launched_then_key_line_is_redacted() {
    // GIVEN: A handler collecting every line
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let mut launcher = external_launcher().with_output_handler(Arc::new(move |line: &str| {
        sink.lock().unwrap().push(line.to_string());
    }));

    // WHEN: Launching
    let key = launcher.launch(4487).await.expect("launch should succeed");

    // THEN: The announcement arrived redacted and the key never appears
    let seen = lines.lock().unwrap().clone();
    assert!(
        seen.iter().any(|line| line.contains("secret-key: [REDACTED]")),
        "Announcement should be forwarded redacted: {seen:?}"
    );
    assert!(
        seen.iter().all(|line| !line.contains(key.as_str())),
        "Key must never reach the output handler"
    );

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a binary that exits without announcing is reported as such.
///
/// **BUG THIS CATCHES**: Would catch waiting for the full timeout when the child is already
/// gone, or reporting a misleading Timeout.
#[tokio::test]
#[serial]
async fn given_child_rejecting_its_args_when_launched_then_child_exited_error() {
    // GIVEN: A launcher that passes an unknown flag, making clap exit immediately
    let mut launcher = external_launcher().with_args(["--no-such-flag"]);

    // WHEN: Launching
    let result = launcher.launch_with_timeout(4488, 10).await;

    // THEN: ChildExited, launcher Stopped
    assert!(
        matches!(result, Err(LaunchError::ChildExited { .. })),
        "Got: {result:?}"
    );
    assert_eq!(launcher.state(), LauncherState::Stopped);
}

/// **VALUE**: Verifies that an engine failure inside the child comes back as a failed
/// response and leaves the child running.
///
/// **BUG THIS CATCHES**: Would catch a conversion error crashing the server process, or the
/// error message being lost on the way back through the child.
#[tokio::test]
#[serial]
async fn given_external_server_when_source_missing_then_failed_response_and_server_alive() {
    // GIVEN: A running external server
    let mut launcher = external_launcher();
    let key = launcher.launch(4489).await.expect("launch should succeed");
    let client = AspClient::new(key).with_port(4489);

    // WHEN: Converting a file that does not exist
    let response = client
        .convert_file(
            &PathBuf::from("/definitely/not/here.adoc"),
            &HashMap::new(),
            None,
        )
        .await;

    // THEN: Failed with the missing path named, and the child still answers
    assert!(response.failed());
    assert!(
        response
            .error_message()
            .unwrap_or_default()
            .contains("/definitely/not/here.adoc"),
        "Got: {:?}",
        response.error_message()
    );
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}

/// **VALUE**: Verifies that a long conversion running in the external server can be canceled
/// through the progress monitor, and that the server survives the cancellation.
///
/// **WHY THIS MATTERS**: Cancel travels over a second connection to a separate process while
/// the first connection is still waiting on the converter. Both ends have to cooperate for the
/// user to get control back quickly.
///
/// **BUG THIS CATCHES**: Would catch the client waiting for the converter to finish, a cancel
/// that never reaches the child, or cancellation taking the whole server process down.
#[cfg(unix)]
#[tokio::test]
#[serial]
async fn given_slow_converter_when_monitor_canceled_then_canceled_and_server_alive() {
    use std::os::unix::fs::PermissionsExt;

    // GIVEN: A config whose HTML converter takes far longer than the test
    let dir = TempDir::new().expect("Failed to create temp dir");
    let script = dir.path().join("slow-converter.sh");
    std::fs::write(&script, "#!/bin/sh\nsleep 30\nexit 0\n").expect("write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    let source = dir.path().join("long.adoc");
    std::fs::write(&source, "= Long Document\n").expect("write source");

    let mut config = AspConfig::default();
    config.engine.html_command = script.to_string_lossy().to_string();
    config.save(dir.path()).expect("save config");

    // AND: An external server started with that config
    let mut launcher =
        external_launcher().with_args(["--config".to_string(), dir.path().display().to_string()]);
    let key = launcher.launch(4470).await.expect("launch should succeed");
    let client = AspClient::new(key).with_port(4470);

    // WHEN: The monitor is canceled shortly after the conversion starts
    let monitor = DefaultProgressMonitor::new();
    let canceller = {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            monitor.set_canceled(true);
        })
    };
    let started = Instant::now();
    let response = client
        .convert_file(&source, &HashMap::new(), Some(&monitor))
        .await;
    let elapsed = started.elapsed();
    canceller.await.expect("canceller task");

    // THEN: A failed, canceled response comes back long before the converter would finish
    assert!(response.failed());
    assert!(
        response
            .error_message()
            .unwrap_or_default()
            .contains("canceled"),
        "Got: {:?}",
        response.error_message()
    );
    assert!(elapsed < Duration::from_secs(10), "Cancel took {elapsed:?}");

    // AND: The child server still answers
    assert!(client.is_server_alive(None).await);

    launcher.stop_server().await;
}
