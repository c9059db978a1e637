use super::*;

fn upgrade(status: StatusCode) -> UpgradeResponse {
    UpgradeResponse { status, body: None }
}

#[test]
fn new_handshake_is_not_started() {
    let (handshake, _completion) = Handshake::new();
    assert_eq!(handshake.state(), &HandshakeState::NotStarted);
}

#[test]
fn start_moves_to_in_progress_once() {
    let (mut handshake, _completion) = Handshake::new();
    handshake.start().expect("first start");
    assert_eq!(handshake.state(), &HandshakeState::InProgress);

    let err = handshake.start().expect_err("second start");
    assert!(matches!(err, HandshakeError::InvalidTransition { action: "start", .. }));
}

#[tokio::test]
async fn switching_protocols_completes_and_signals_success() {
    let (mut handshake, completion) = Handshake::new();
    handshake.start().expect("start");
    handshake.on_response(&upgrade(StatusCode::SWITCHING_PROTOCOLS)).expect("complete");

    assert!(handshake.state().is_complete());
    assert_eq!(completion.wait().await, Ok(()));
}

#[tokio::test]
async fn non_101_status_fails_and_signals_rejection() {
    let (mut handshake, completion) = Handshake::new();
    handshake.start().expect("start");
    let err = handshake.on_response(&upgrade(StatusCode::FORBIDDEN)).expect_err("rejected");

    assert_eq!(err, HandshakeError::Rejected(403));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
    assert_eq!(completion.wait().await, Err(HandshakeError::Rejected(403)));
}

#[test]
fn response_before_start_is_invalid() {
    let (mut handshake, _completion) = Handshake::new();
    let err = handshake.on_response(&upgrade(StatusCode::SWITCHING_PROTOCOLS)).expect_err("not started");
    assert!(matches!(err, HandshakeError::InvalidTransition { action: "complete", .. }));
    assert_eq!(handshake.state(), &HandshakeState::NotStarted);
}

#[test]
fn second_response_does_not_signal_again() {
    let (mut handshake, _completion) = Handshake::new();
    handshake.start().expect("start");
    handshake.on_response(&upgrade(StatusCode::SWITCHING_PROTOCOLS)).expect("complete");

    let err = handshake.on_response(&upgrade(StatusCode::SWITCHING_PROTOCOLS)).expect_err("already complete");
    assert!(matches!(err, HandshakeError::InvalidTransition { .. }));
    assert!(handshake.state().is_complete());
}

#[tokio::test]
async fn transport_failure_before_start_signals_failure() {
    let (mut handshake, completion) = Handshake::new();
    handshake.fail(HandshakeError::Transport("connection refused".into()));

    assert_eq!(handshake.state(), &HandshakeState::Failed("handshake transport error: connection refused".into()));
    assert_eq!(completion.wait().await, Err(HandshakeError::Transport("connection refused".into())));
}

#[tokio::test]
async fn failure_after_completion_is_ignored() {
    let (mut handshake, completion) = Handshake::new();
    handshake.start().expect("start");
    handshake.on_response(&upgrade(StatusCode::SWITCHING_PROTOCOLS)).expect("complete");
    handshake.fail(HandshakeError::Transport("late reset".into()));

    assert!(handshake.state().is_complete());
    assert_eq!(completion.wait().await, Ok(()));
}

#[tokio::test]
async fn repeated_failures_signal_only_the_first() {
    let (mut handshake, completion) = Handshake::new();
    handshake.start().expect("start");
    handshake.fail(HandshakeError::Timeout(Duration::from_millis(5)));
    handshake.fail(HandshakeError::Transport("second".into()));

    assert_eq!(completion.wait().await, Err(HandshakeError::Timeout(Duration::from_millis(5))));
}

#[tokio::test]
async fn dropped_coordinator_reports_abandoned() {
    let (handshake, completion) = Handshake::new();
    drop(handshake);
    assert_eq!(completion.wait().await, Err(HandshakeError::Abandoned));
}

#[test]
fn signal_is_single_use() {
    let (mut handshake, _completion) = Handshake::new();
    handshake.signal(Ok(())).expect("first signal");
    assert_eq!(handshake.signal(Ok(())), Err(HandshakeError::AlreadySignaled));
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(HandshakeError::Rejected(500).error_code(), "E_HANDSHAKE_REJECTED");
    assert!(HandshakeError::Timeout(Duration::from_secs(1)).retryable());
    assert!(!HandshakeError::AlreadySignaled.retryable());
}
