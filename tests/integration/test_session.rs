//! Integration tests driving a `Session` directly over HTTP clients.
//!
//! These exercise the real judge and AI clients against mock servers,
//! without the session API in between.

mod support;

use std::time::Duration;

use judgeloop_orchestrator::{
    encoding, ChatStepId, JudgeLoopError, NotificationLevel, SessionEvent, Speaker,
};
use serde_json::json;
use support::{report, report_with, Harness};
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Waits for the next notification on `events`.
async fn next_notification(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> (NotificationLevel, String) {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("Timeout waiting for notification")
            .expect("Event channel closed");
        if let SessionEvent::Notification(n) = event {
            return (n.level, n.message);
        }
    }
}

#[tokio::test]
async fn test_polls_until_terminal_status() {
    let harness = Harness::start().await;
    harness.judge.script(vec![
        report(1, "In Queue"),
        report(1, "In Queue"),
        report(2, "Processing"),
        report_with(3, "Accepted", "stdout", &encoding::encode("done\n")),
    ]);

    harness
        .session
        .compile()
        .await
        .unwrap()
        .await
        .unwrap();

    assert_eq!(harness.judge.polls(), vec!["tok-1"; 4]);
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.outcome.unwrap().display_text(), "done\n");
    assert!(!snapshot.processing);
}

#[tokio::test]
async fn test_superseded_compile_does_not_write() {
    let harness = Harness::start().await;
    // First submission never finishes on its own
    harness.judge.script(vec![report(2, "Processing")]);
    harness.judge.script(vec![report_with(
        3,
        "Accepted",
        "stdout",
        &encoding::encode("second\n"),
    )]);
    let mut events = harness.session.subscribe();

    let first = harness.session.compile().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let second = harness.session.compile().await.unwrap();

    timeout(Duration::from_secs(5), first)
        .await
        .expect("Superseded chain did not stop")
        .unwrap();
    second.await.unwrap();

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.outcome.unwrap().display_text(), "second\n");
    assert!(!snapshot.processing);

    let polls_after = harness.judge.polls().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.judge.polls().len(), polls_after);

    let (level, _) = next_notification(&mut events).await;
    assert_eq!(level, NotificationLevel::Success);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_token_surfaces_generic_failure() {
    let harness = Harness::start().await;
    // No script: the mock judge has nothing to answer polls with
    let mut events = harness.session.subscribe();

    harness
        .session
        .compile()
        .await
        .unwrap()
        .await
        .unwrap();

    let (level, message) = next_notification(&mut events).await;
    assert_eq!(level, NotificationLevel::Error);
    assert_eq!(message, "Something went wrong! Please try again.");
    assert!(harness.session.snapshot().await.output.is_none());
}

#[tokio::test]
async fn test_time_limit_is_sent_to_chat_as_error() {
    let harness = Harness::start().await;
    harness.judge.script(vec![report(5, "Time Limit Exceeded")]);
    harness
        .ai
        .answer_chat(json!({ "chat": "Your loop never ends" }));

    harness
        .session
        .compile()
        .await
        .unwrap()
        .await
        .unwrap();
    harness.session.start_chat().await.unwrap();
    let transcript = harness.session.send_chat_message("why so slow?").await.unwrap();

    assert_eq!(transcript[3].text, "Your loop never ends");
    assert_eq!(transcript[3].speaker, Speaker::Bot);
    let bodies = harness.ai.chat_bodies();
    assert_eq!(bodies[0]["error"], "Time Limit Exceeded");
    assert_eq!(bodies[0]["code"], judgeloop_orchestrator::language::DEFAULT_SOURCE);
}

#[tokio::test]
async fn test_chat_loops_and_tracks_steps() {
    let harness = Harness::start().await;
    harness.session.start_chat().await.unwrap();
    let machine = harness.session.chat_machine().await.unwrap();

    harness.session.send_chat_message("one").await.unwrap();
    assert_eq!(machine.current_step().await, Some(ChatStepId::AwaitUser));
    let transcript = harness.session.send_chat_message("two").await.unwrap();

    assert_eq!(transcript.len(), 8);
    assert_eq!(harness.ai.chat_bodies().len(), 2);
    assert_eq!(transcript[7].step, ChatStepId::Followup);
}

#[tokio::test]
async fn test_regenerate_is_refused_after_success() {
    let harness = Harness::start().await;
    harness
        .judge
        .script(vec![report_with(3, "Accepted", "stdout", "NQo=")]);

    harness
        .session
        .compile()
        .await
        .unwrap()
        .await
        .unwrap();

    let err = harness.session.regenerate().await.unwrap_err();
    assert!(matches!(err, JudgeLoopError::NothingToRegenerate));
    assert!(harness.ai.regen_bodies().is_empty());
}

#[tokio::test]
async fn test_non_utf8_output_is_shown_lossily() {
    let harness = Harness::start().await;
    // stdout is "ok", 0xff, "\n"
    harness
        .judge
        .script(vec![report_with(3, "Accepted", "stdout", "b2v/Cg==")]);

    harness
        .session
        .compile()
        .await
        .unwrap()
        .await
        .unwrap();

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.outcome.unwrap().display_text(), "ok\u{fffd}\n");
}
