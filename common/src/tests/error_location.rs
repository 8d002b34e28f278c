use crate::ErrorLocation;

use std::panic::Location;

#[track_caller]
fn construct_error_here() -> ErrorLocation {
    ErrorLocation::here()
}

/// **VALUE**: Verifies that `ErrorLocation::from()` captures file, line and column.
///
/// **WHY THIS MATTERS**: Every error enum in the workspace carries an `ErrorLocation`. If it
/// stops capturing accurate positions, all error messages lose their debugging value.
///
/// **BUG THIS CATCHES**: Would catch swapped line/column fields or a lost file path.
#[test]
fn given_location_caller_when_error_location_created_then_captures_file_line_column() {
    // GIVEN/WHEN: Creating ErrorLocation from this line
    let expected_line = line!() + 1;
    let location = ErrorLocation::from(Location::caller());

    // THEN: File, line and column are captured
    assert!(location.file.contains("error_location.rs"));
    assert_eq!(location.line, expected_line);
    assert!(location.column > 0);
}

/// **VALUE**: Verifies the bracketed `[file:line:column]` display format.
///
/// **BUG THIS CATCHES**: Would catch a Display change that drops the brackets or a component,
/// which makes locations in log lines hard to grep.
#[test]
fn given_error_location_when_formatted_then_produces_bracketed_format() {
    // GIVEN: A location
    let location = ErrorLocation::here();

    // WHEN: Formatting
    let formatted = location.to_string();

    // THEN: "[file:line:column]"
    assert_eq!(
        formatted,
        format!("[{}:{}:{}]", location.file, location.line, location.column)
    );
}

/// **VALUE**: Verifies that `#[track_caller]` propagates through helper constructors.
///
/// **WHY THIS MATTERS**: Error helpers like `LaunchError::timeout()` are `#[track_caller]`.
/// Without propagation every error would point at the helper body instead of the failure site.
///
/// **BUG THIS CATCHES**: Would catch removing `#[track_caller]` from `ErrorLocation::here()`.
#[test]
fn given_track_caller_helper_when_called_then_reports_call_site() {
    // GIVEN/WHEN: Calling a track_caller helper on a known line
    let expected_line = line!() + 1;
    let location = construct_error_here();

    // THEN: The reported line is this call site
    assert_eq!(location.line, expected_line);
}
