// Unit tests for the cooperative cancellation flag

use crate::engine::CancellationFlag;

use std::time::Duration;

use tokio::time::timeout;

/// **VALUE**: Verifies that a fresh flag is clear and that cancel is visible through every clone.
///
/// **WHY THIS MATTERS**: The dispatcher keeps one clone and hands another to the engine worker.
/// If clones did not share state, a Cancel request would never reach the running engine.
///
/// **BUG THIS CATCHES**: Would catch a refactor that replaces the shared channel with a plain
/// `bool` copied into each clone.
#[test]
fn given_cloned_flag_when_original_canceled_then_clone_observes_cancellation() {
    // GIVEN: A flag and a clone of it
    let flag = CancellationFlag::new();
    let worker_view = flag.clone();
    assert!(!worker_view.is_cancelled(), "Fresh flag should be clear");

    // WHEN: Canceling through the original (twice, to check idempotence)
    flag.cancel();
    flag.cancel();

    // THEN: The clone sees the flag set
    assert!(worker_view.is_cancelled(), "Clone should observe cancellation");
    assert!(flag.is_cancelled(), "Flag should stay set");
}

/// **VALUE**: Verifies that `cancelled()` wakes a waiting task when another task cancels.
///
/// **WHY THIS MATTERS**: The dispatcher races the engine worker against `cancelled()`. If the
/// future never resolves, a canceled conversion blocks its connection until the engine finishes.
///
/// **BUG THIS CATCHES**: Would catch a waiter that subscribes after the value changed and
/// misses the notification.
#[tokio::test]
async fn given_waiting_task_when_flag_canceled_then_cancelled_future_resolves() {
    // GIVEN: A task awaiting cancellation
    let flag = CancellationFlag::new();
    let waiter = flag.clone();
    let waiting = tokio::spawn(async move { waiter.cancelled().await });

    // WHEN: Another task cancels shortly after
    tokio::time::sleep(Duration::from_millis(20)).await;
    flag.cancel();

    // THEN: The waiting task finishes promptly
    let result = timeout(Duration::from_secs(2), waiting).await;
    assert!(result.is_ok(), "cancelled() should resolve after cancel()");
}

/// **VALUE**: Verifies that awaiting an already canceled flag returns immediately.
///
/// **BUG THIS CATCHES**: Would catch an implementation that only waits for the next change and
/// hangs when cancel happened before the await.
#[tokio::test]
async fn given_already_canceled_flag_when_awaited_then_resolves_immediately() {
    // GIVEN: A flag canceled before anyone waits
    let flag = CancellationFlag::default();
    flag.cancel();

    // WHEN/THEN: Awaiting resolves without blocking
    let result = timeout(Duration::from_millis(200), flag.cancelled()).await;
    assert!(result.is_ok(), "Pre-canceled flag should resolve immediately");
}
