use crate::support::FailingTokenStore;
use fitcoach_core::auth::{
    AuthBackend, AuthCoordinator, AuthEvent, AuthPhase, AuthSnapshot, CleanupStep, InMemoryAuthBackend,
    MemoryTokenStore, Session, TokenStore,
};
use fitcoach_core::AuthError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn wait_for_seq(coordinator: &AuthCoordinator, seq: u64) -> AuthSnapshot {
    let mut rx = coordinator.watch();
    let snapshot = timeout(Duration::from_secs(5), rx.wait_for(|s| s.seq >= seq))
        .await
        .expect("state settled in time")
        .expect("state channel open")
        .clone();
    snapshot
}

async fn signed_in(coordinator: &AuthCoordinator) {
    timeout(
        Duration::from_secs(5),
        coordinator.wait_for(|state| state.is_authenticated()),
    )
    .await
    .expect("signed in");
}

#[tokio::test]
async fn authenticated_follows_latest_notification() {
    let session = || Some(InMemoryAuthBackend::session_for("ana@example.com"));
    let sequences: Vec<Vec<Option<Session>>> = vec![
        vec![session()],
        vec![None],
        vec![session(), None],
        vec![None, session()],
        vec![session(), session(), None, session()],
        vec![session(), None, None],
    ];

    for sequence in sequences {
        let backend = Arc::new(InMemoryAuthBackend::new());
        let (coordinator, _subscription) = AuthCoordinator::start(backend.clone(), Vec::new()).await;
        let expected = sequence.last().map(Option::is_some).unwrap_or(false);
        let count = sequence.len() as u64;

        for entry in sequence {
            let event = if entry.is_some() {
                AuthEvent::SignedIn
            } else {
                AuthEvent::SignedOut
            };
            backend.emit(event, entry);
        }

        let snapshot = wait_for_seq(&coordinator, 1 + count).await;
        assert_eq!(snapshot.state.is_authenticated(), expected);
        assert_eq!(
            snapshot.state.is_authenticated(),
            snapshot.state.session().is_some()
        );
    }
}

#[tokio::test]
async fn initialize_restores_existing_session() {
    let backend = Arc::new(
        InMemoryAuthBackend::new().with_session(InMemoryAuthBackend::session_for("ana@example.com")),
    );
    let coordinator = AuthCoordinator::new(backend, Vec::new());
    assert_eq!(coordinator.state().phase(), AuthPhase::Unresolved);

    coordinator.initialize().await;

    let state = coordinator.state();
    assert!(!state.is_loading());
    assert_eq!(state.phase(), AuthPhase::Authenticated);
    assert_eq!(
        state.user().and_then(|u| u.email.as_deref()),
        Some("ana@example.com")
    );
}

#[tokio::test]
async fn failed_initial_fetch_leaves_logged_out() {
    let backend = Arc::new(InMemoryAuthBackend::new());
    backend.fail_get_session("network down");
    let (coordinator, _subscription) = AuthCoordinator::start(backend, Vec::new()).await;

    let state = coordinator.state();
    assert!(!state.is_loading());
    assert!(!state.is_authenticated());
    assert_eq!(state.phase(), AuthPhase::Unauthenticated);
}

#[tokio::test]
async fn sign_in_errors_are_propagated() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_account("ana@example.com", "s3cret"));
    let (coordinator, _subscription) = AuthCoordinator::start(backend, Vec::new()).await;

    let err = coordinator
        .sign_in("ana@example.com", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Remote { status: 400, .. }));
    assert_eq!(err.user_message(), "Invalid login credentials");
    assert!(!coordinator.state().is_authenticated());
}

#[tokio::test]
async fn sign_in_flows_through_notifications() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_account("ana@example.com", "s3cret"));
    let (coordinator, _subscription) = AuthCoordinator::start(backend, Vec::new()).await;

    let response = coordinator
        .sign_in("ana@example.com", "s3cret")
        .await
        .expect("sign in");
    assert!(response.session.is_some());

    signed_in(&coordinator).await;
    assert_eq!(coordinator.state().phase(), AuthPhase::Authenticated);
}

#[tokio::test]
async fn sign_up_carries_metadata() {
    let backend = Arc::new(InMemoryAuthBackend::new());
    let (coordinator, _subscription) = AuthCoordinator::start(backend, Vec::new()).await;

    let response = coordinator
        .sign_up("bia@example.com", "s3cret", Some(json!({ "goal": "hypertrophy" })))
        .await
        .expect("sign up");
    let user = response.user.expect("user");
    assert_eq!(user.user_metadata["goal"], "hypertrophy");

    signed_in(&coordinator).await;

    let err = coordinator
        .sign_up("bia@example.com", "other", None)
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "User already registered");
}

#[tokio::test]
async fn sign_out_with_failing_storage_still_logs_out() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_account("ana@example.com", "s3cret"));
    let memory = Arc::new(MemoryTokenStore::default());
    memory.set("sb-abcd-auth-token", "{}").unwrap();
    let stores: Vec<Arc<dyn TokenStore>> = vec![Arc::new(FailingTokenStore) as Arc<dyn TokenStore>, memory.clone()];
    let (coordinator, _subscription) = AuthCoordinator::start(backend, stores).await;
    coordinator
        .sign_in("ana@example.com", "s3cret")
        .await
        .expect("sign in");
    signed_in(&coordinator).await;

    let report = coordinator.sign_out().await;

    assert!(!coordinator.state().is_authenticated());
    let failed: Vec<_> = report.failures().map(|o| o.step.clone()).collect();
    assert_eq!(failed, vec![CleanupStep::ClearTokens { store: "failing" }]);
    assert!(memory.get("sb-abcd-auth-token").unwrap().is_none());
}

#[tokio::test]
async fn sign_out_with_failing_remote_still_logs_out() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_account("ana@example.com", "s3cret"));
    let (coordinator, _subscription) = AuthCoordinator::start(backend.clone(), Vec::new()).await;
    coordinator
        .sign_in("ana@example.com", "s3cret")
        .await
        .expect("sign in");
    signed_in(&coordinator).await;
    backend.fail_sign_out("503 Service Unavailable");

    let report = coordinator.sign_out().await;

    assert_eq!(backend.sign_out_calls(), 1);
    assert!(!coordinator.state().is_authenticated());
    assert_eq!(coordinator.state().phase(), AuthPhase::Unauthenticated);
    let failed: Vec<_> = report.failures().map(|o| o.step.clone()).collect();
    assert_eq!(failed, vec![CleanupStep::RemoteSignOut]);
}

#[tokio::test]
async fn sign_out_closes_realtime_channels() {
    let backend = Arc::new(InMemoryAuthBackend::new());
    backend.open_channel("workouts");
    backend.open_channel("messages");
    let (coordinator, _subscription) = AuthCoordinator::start(backend.clone(), Vec::new()).await;

    let report = coordinator.sign_out().await;

    assert!(report.is_clean());
    assert!(backend.channels().is_empty());

    backend.open_channel("workouts");
    backend.fail_remove_channel("socket closed");
    let report = coordinator.sign_out().await;
    let failure = report.failures().next().expect("channel failure");
    assert_eq!(failure.step, CleanupStep::CloseChannels);
    assert!(failure.error.as_deref().unwrap_or_default().contains("workouts"));
    assert!(!coordinator.state().is_authenticated());
}

#[tokio::test]
async fn reset_password_forwards_email() {
    let backend = Arc::new(InMemoryAuthBackend::new());
    let coordinator = AuthCoordinator::new(backend.clone(), Vec::new());

    coordinator
        .reset_password("ana@example.com")
        .await
        .expect("reset");
    assert_eq!(backend.reset_requests(), vec!["ana@example.com".to_string()]);

    let err = coordinator.reset_password("not-an-email").await.unwrap_err();
    assert!(err.user_message().contains("invalid format"));
}

#[tokio::test]
async fn notifications_stop_after_unsubscribe() {
    let backend = Arc::new(InMemoryAuthBackend::new());
    let (coordinator, subscription) = AuthCoordinator::start(backend.clone(), Vec::new()).await;
    let before = coordinator.snapshot();

    subscription.unsubscribe();
    backend.emit(
        AuthEvent::SignedIn,
        Some(InMemoryAuthBackend::session_for("ana@example.com")),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(coordinator.snapshot(), before);
}

#[tokio::test]
async fn queued_sign_in_notification_cannot_undo_sign_out() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_account("ana@example.com", "s3cret"));
    let (coordinator, _subscription) = AuthCoordinator::start(backend.clone(), Vec::new()).await;
    backend.fail_sign_out("503 Service Unavailable");

    // Nothing yields between these calls, so the sign-in notification is still queued for
    // the forwarding task when sign-out publishes.
    coordinator
        .sign_in("ana@example.com", "s3cret")
        .await
        .expect("sign in");
    let report = coordinator.sign_out().await;
    let signed_out = coordinator.snapshot();
    assert!(!signed_out.state.is_authenticated());

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!report.is_clean());
    assert!(!coordinator.state().is_authenticated());
    assert_eq!(coordinator.snapshot(), signed_out);
}

#[tokio::test]
async fn notification_during_slow_initial_fetch_wins() {
    let backend = Arc::new(InMemoryAuthBackend::new().with_session(
        InMemoryAuthBackend::session_for("ana@example.com"),
    ));
    let gate = backend.hold_get_session();
    let coordinator = AuthCoordinator::new(backend.clone(), Vec::new());
    let _subscription = coordinator.subscribe();

    let init = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.initialize().await }
    });
    while backend.get_session_calls() == 0 {
        tokio::task::yield_now().await;
    }
    backend.emit(AuthEvent::SignedOut, None);
    let state = timeout(
        Duration::from_secs(5),
        coordinator.wait_for(|state| !state.is_loading()),
    )
    .await
    .expect("notification applied");
    assert!(!state.is_authenticated());

    gate.notify_one();
    init.await.expect("initialize");

    assert!(!coordinator.state().is_authenticated());
    assert_eq!(coordinator.state().phase(), AuthPhase::Unauthenticated);
}
