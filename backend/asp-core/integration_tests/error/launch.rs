use asp_core::error::launch::LaunchError;

use std::error::Error;
use std::io::Error as IoError;
use std::io::ErrorKind;

/// **VALUE**: Verifies that bind failures are classified by their io::ErrorKind.
///
/// **WHY THIS MATTERS**: Callers retry on another port only for conflicts. Misclassifying a
/// permission error as a conflict sends them hunting for a free port that will never help.
///
/// **BUG THIS CATCHES**: Would catch `from_bind` mapping every error to PortInUse.
#[test]
fn given_bind_errors_when_classified_then_only_addr_in_use_is_port_conflict() {
    // GIVEN: An AddrInUse and a PermissionDenied error
    let in_use = LaunchError::from_bind(
        "127.0.0.1:4447",
        4447,
        IoError::new(ErrorKind::AddrInUse, "address in use"),
    );
    let denied = LaunchError::from_bind(
        "127.0.0.1:80",
        80,
        IoError::new(ErrorKind::PermissionDenied, "permission denied"),
    );

    // WHEN/THEN: Only the first is a port conflict
    assert!(in_use.is_port_conflict());
    assert!(matches!(in_use, LaunchError::PortInUse { port: 4447, .. }));
    assert!(!denied.is_port_conflict());
    assert!(matches!(denied, LaunchError::Bind { .. }));
}

/// **VALUE**: Verifies that PortInUse keeps the io::Error as its source.
///
/// **BUG THIS CATCHES**: Would catch dropping `#[source]`, which hides the OS error from
/// anyone walking the error chain.
#[test]
fn given_port_in_use_when_source_inspected_then_exposes_io_error() {
    // GIVEN: A port conflict
    let err = LaunchError::from_bind(
        "127.0.0.1:4447",
        4447,
        IoError::new(ErrorKind::AddrInUse, "address in use"),
    );

    // WHEN: Inspecting the source
    let source = err.source().expect("PortInUse should have a source");

    // THEN: It is the io::Error with AddrInUse
    let io = source.downcast_ref::<IoError>().expect("source should be io::Error");
    assert_eq!(io.kind(), ErrorKind::AddrInUse);
}

/// **VALUE**: Verifies that launch errors include the location they were created at.
///
/// **WHY THIS MATTERS**: Launch can fail in several places (probe, spawn, announcement,
/// liveness). The location tells which one.
///
/// **BUG THIS CATCHES**: Would catch losing `#[track_caller]` on the helper constructors.
#[test]
fn given_timeout_error_when_formatted_then_includes_seconds_and_location() {
    // GIVEN: A timeout error built here
    let err = LaunchError::timeout(30);

    // WHEN: Formatting
    let error_string = err.to_string();

    // THEN: Type, budget and this file's name appear
    assert!(error_string.contains("Timeout Error"));
    assert!(error_string.contains("30s"));
    assert!(error_string.contains("launch.rs"), "Got: {error_string}");
}

/// **VALUE**: Verifies the AlreadyLaunched message names the blocking state.
#[test]
fn given_already_launched_error_when_formatted_then_names_state() {
    let err = LaunchError::already_launched("listening");
    assert!(err.to_string().contains("launcher is listening"));
}
