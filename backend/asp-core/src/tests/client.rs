// Unit tests for client-side response mapping and the progress monitor

use crate::DEFAULT_PORT;
use crate::client::{AspClient, DefaultProgressMonitor, ProgressMonitor, Response};
use crate::proto::AspJobResponse;

use common::SecretKey;

use std::path::Path;
use std::thread;

/// **VALUE**: Verifies that clones of the default monitor share cancellation and progress.
///
/// **WHY THIS MATTERS**: The usual pattern is one clone in a UI thread that cancels and one
/// borrowed by the client call. Independent state would make cancel a no-op.
///
/// **BUG THIS CATCHES**: Would catch deriving Clone over plain fields instead of `Arc`s.
#[test]
fn given_cloned_monitor_when_canceled_from_other_thread_then_original_observes_it() {
    // GIVEN: A monitor and a clone moved into another thread
    let monitor = DefaultProgressMonitor::new();
    let remote = monitor.clone();

    // WHEN: The other thread cancels and reports progress
    thread::spawn(move || {
        remote.set_progress(40);
        remote.set_canceled(true);
    })
    .join()
    .unwrap();

    // THEN: The original sees both
    assert!(monitor.is_canceled());
    assert_eq!(monitor.progress(), 40);
}

/// **VALUE**: Verifies that progress is clamped to 100.
///
/// **BUG THIS CATCHES**: Would catch UIs receiving 255% from a buggy reporter.
#[test]
fn given_progress_above_hundred_when_set_then_clamped() {
    let monitor = DefaultProgressMonitor::default();
    monitor.set_progress(250);
    assert_eq!(monitor.progress(), 100);
}

/// **VALUE**: Verifies the mapping of a successful wire response.
///
/// **BUG THIS CATCHES**: Would catch a success response that loses its result path.
#[test]
fn given_succeeded_job_response_when_converted_then_has_path_and_no_error() {
    // GIVEN: A successful job response
    let job = AspJobResponse::succeeded("job-1", "/docs/guide.html");

    // WHEN: Converting to a client Response
    let response = Response::from(job);

    // THEN: Path present, no error
    assert!(!response.failed());
    assert_eq!(response.result_file_path(), Some(Path::new("/docs/guide.html")));
    assert!(response.error_message().is_none());
    assert_eq!(response.job_id(), Some("job-1"));
}

/// **VALUE**: Verifies that a failed response always carries a message, even if the server
/// sent none.
///
/// **WHY THIS MATTERS**: Callers display `error_message()` on failure. A `None` there is an
/// unexplained failure for the end user.
///
/// **BUG THIS CATCHES**: Would catch passing the optional message through untouched.
#[test]
fn given_failed_job_response_without_message_when_converted_then_gets_default_message() {
    // GIVEN: A failed response with no message
    let mut job = AspJobResponse::failure("job-2", "ignored");
    job.error_message = None;

    // WHEN: Converting
    let response = Response::from(job);

    // THEN: Failed with a non-empty message and no path
    assert!(response.failed());
    assert!(response.result_file_path().is_none());
    assert!(!response.error_message().unwrap_or_default().is_empty());
}

/// **VALUE**: Verifies that cancellation is distinguishable from other failures.
///
/// **BUG THIS CATCHES**: Would catch `is_canceled` returning true for every failure.
#[test]
fn given_canceled_and_failed_responses_when_checked_then_only_canceled_is_canceled() {
    let canceled = Response::failure("Conversion canceled by user");
    let failed = Response::failure("asciidoctor exited with status 1");
    let acknowledged = Response::from(AspJobResponse::acknowledged("job-3"));

    assert!(canceled.is_canceled());
    assert!(!failed.is_canceled());
    assert!(!acknowledged.failed());
    assert!(acknowledged.result_file_path().is_none());
    assert!(acknowledged.error_message().is_none());
}

/// **VALUE**: Verifies the client's builder defaults and overrides for port and host.
///
/// **BUG THIS CATCHES**: Would catch `with_port`/`with_host` writing to a copy that the
/// builder then discards, or a default port that differs from the server's.
#[test]
fn given_new_client_when_port_and_host_overridden_then_builder_values_win() {
    // GIVEN: A client with defaults
    let client = AspClient::new(SecretKey::generate());
    assert_eq!(client.port(), DEFAULT_PORT);
    assert_eq!(client.host(), "127.0.0.1");

    // WHEN: Overriding port and host
    let client = client.with_port(5123).with_host("::1");

    // THEN: The overrides are reported back
    assert_eq!(client.port(), 5123);
    assert_eq!(client.host(), "::1");
}
