use crate::support::fast_policy;
use fitcoach_core::assistant::{
    ContentBlock, PollPolicy, RunPoller, RunStatus, ScriptedAssistant, ThreadMessage,
    FALLBACK_REPLY,
};
use fitcoach_core::AssistantError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn poller(api: &ScriptedAssistant, policy: PollPolicy) -> RunPoller {
    RunPoller::new(Arc::new(api.clone()), "asst_coach", policy)
}

#[tokio::test]
async fn polls_once_per_pending_status() {
    let api = ScriptedAssistant::new(
        vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed],
        Some(ThreadMessage::assistant("Treino salvo.")),
    );

    let reply = poller(&api, fast_policy())
        .run_to_completion("thread_1", &CancellationToken::new())
        .await
        .expect("reply");

    assert_eq!(reply, "Treino salvo.");
    assert_eq!(api.status_checks(), 2);
}

#[tokio::test]
async fn failed_run_is_reported_with_its_status() {
    let api = ScriptedAssistant::new(vec![RunStatus::Queued, RunStatus::Failed], None);

    let err = poller(&api, fast_policy())
        .run_to_completion("thread_1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::RunTerminated(RunStatus::Failed)));
    assert!(err.to_string().contains("failed"));
    assert_eq!(api.status_checks(), 1);
}

#[tokio::test]
async fn expired_and_cancelled_runs_are_failures() {
    for terminal in [RunStatus::Expired, RunStatus::Cancelled] {
        let api = ScriptedAssistant::new(vec![RunStatus::InProgress, terminal], None);
        let err = poller(&api, fast_policy())
            .run_to_completion("thread_1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::RunTerminated(status) if status == terminal));
    }
}

#[tokio::test]
async fn requires_action_ends_the_run() {
    let api = ScriptedAssistant::new(vec![RunStatus::Queued, RunStatus::RequiresAction], None);

    let err = poller(&api, PollPolicy::fixed(Duration::from_millis(1), 5))
        .run_to_completion("thread_1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AssistantError::RunTerminated(RunStatus::RequiresAction)
    ));
    assert_eq!(api.status_checks(), 1);
}

#[tokio::test]
async fn missing_text_falls_back() {
    let image_only = ThreadMessage {
        id: "msg_1".into(),
        role: "assistant".into(),
        content: vec![ContentBlock {
            kind: "image_file".into(),
            text: None,
        }],
    };
    for reply in [None, Some(image_only)] {
        let api = ScriptedAssistant::new(vec![RunStatus::Completed], reply);
        let text = poller(&api, fast_policy())
            .run_to_completion("thread_1", &CancellationToken::new())
            .await
            .expect("reply");
        assert_eq!(text, FALLBACK_REPLY);
        assert_eq!(api.status_checks(), 0);
    }
}

#[tokio::test]
async fn stops_after_max_attempts() {
    let api = ScriptedAssistant::new(vec![RunStatus::Queued, RunStatus::InProgress], None);
    let policy = PollPolicy::fixed(Duration::from_millis(1), 3);

    let err = poller(&api, policy)
        .run_to_completion("thread_1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::PollExhausted { attempts: 3 }));
    assert_eq!(api.status_checks(), 3);
}

#[tokio::test]
async fn stops_at_deadline() {
    let api = ScriptedAssistant::new(vec![RunStatus::InProgress], None);
    let policy = PollPolicy {
        timeout: Some(Duration::from_millis(30)),
        ..PollPolicy::fixed(Duration::from_millis(10), 1_000)
    };

    let err = poller(&api, policy)
        .run_to_completion("thread_1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::PollTimedOut(_)));
    assert!(api.status_checks() <= 3);
}

#[tokio::test]
async fn cancellation_aborts_polling() {
    let api = ScriptedAssistant::new(vec![RunStatus::InProgress], None);
    let policy = PollPolicy::fixed(Duration::from_secs(60), 10);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        poller(&api, policy).run_to_completion("thread_1", &cancel),
    )
    .await
    .expect("cancelled promptly")
    .unwrap_err();

    assert!(matches!(err, AssistantError::Cancelled));
    assert_eq!(api.status_checks(), 0);
}
