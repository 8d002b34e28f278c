// Unit tests for logger initialization
// Only one test installs the global logger; the others stay off global state

use crate::error::AspServerError;
use crate::logger::{LOG_FILE_NAME, initialize, initialize_internal, level_for};

use std::path::PathBuf;

use log::LevelFilter;
use tempfile::TempDir;

/// **VALUE**: Verifies that calling initialize() multiple times doesn't panic or fail.
///
/// **WHY THIS MATTERS**: A second global logger install makes fern return an error. If the
/// guard were missing, any code path that initializes twice would abort the server.
///
/// **BUG THIS CATCHES**: Would catch removing the Once or AtomicBool guards.
#[test]
fn given_logger_initialized_when_called_again_then_returns_ok() {
    // GIVEN: A scratch log directory
    let dir = TempDir::new().unwrap();

    // WHEN: Calling initialize twice
    let result1 = initialize(Some(dir.path()), false);
    let result2 = initialize(Some(dir.path()), true);

    // THEN: Both succeed and the log file exists
    assert!(result1.is_ok(), "First initialization should succeed");
    assert!(result2.is_ok(), "Second initialization should be a no-op");
    assert!(dir.path().join(LOG_FILE_NAME).exists());
}

/// **VALUE**: Verifies that an unusable log directory is a typed error, not a panic.
///
/// **BUG THIS CATCHES**: Would catch unwrapping `fern::log_file()`.
#[test]
fn given_invalid_log_dir_when_initialize_internal_called_then_returns_logger_error() {
    // GIVEN: A path that cannot hold a file
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Initializing with it
    let result = initialize_internal(Some(&invalid_dir), LevelFilter::Info);

    // THEN: Logger error naming the file
    match result {
        Err(AspServerError::Logger { message, .. }) => {
            assert!(message.contains(LOG_FILE_NAME), "Got: {message}")
        }
        other => panic!("Expected Logger error, got {other:?}"),
    }
}

/// **VALUE**: Verifies that `--verbose` always means trace.
#[test]
fn given_verbose_flag_when_level_chosen_then_trace() {
    assert_eq!(level_for(true), LevelFilter::Trace);
    assert_ne!(level_for(false), LevelFilter::Trace);
}
