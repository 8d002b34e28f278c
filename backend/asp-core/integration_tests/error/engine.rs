use asp_core::error::engine::EngineError;

/// **VALUE**: Verifies that a canceled error is recognizable both by variant and by message.
///
/// **WHY THIS MATTERS**: The dispatcher branches on `is_canceled()` while clients only see the
/// message. Both must agree that this was a cancellation.
///
/// **BUG THIS CATCHES**: Would catch rewording the message so it no longer contains "canceled",
/// which breaks `Response::is_canceled` on the client.
#[test]
fn given_canceled_error_when_inspected_then_flagged_and_message_says_canceled() {
    // GIVEN: A canceled error
    let err = EngineError::canceled("job-42");

    // WHEN/THEN: Variant check and message agree
    assert!(err.is_canceled());
    let message = err.to_string();
    assert!(message.contains("canceled"));
    assert!(message.contains("job-42"));
}

/// **VALUE**: Verifies that ordinary failures are not mistaken for cancellation.
#[test]
fn given_failed_error_when_inspected_then_not_canceled() {
    let err = EngineError::failed("asciidoctor exited with exit status: 1");
    assert!(!err.is_canceled());
    assert!(err.to_string().contains("Conversion Error"));
}
