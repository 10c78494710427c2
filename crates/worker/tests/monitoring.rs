//! End-to-end behaviour of ingestion, sweeping and dispatch.

mod common;

use deadman_core::status::{CheckStatus, PingKind};
use deadman_db::Store;
use deadman_worker::NewPingInput;

use common::{at, Harness};

#[tokio::test]
async fn quiet_check_goes_grace_then_down_with_one_notification() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();
    let webhook = h.channel(&check, "webhook", true, true).await;
    let email = h.channel(&check, "email", false, true).await;
    h.channel(&check, "webhook", true, false).await;

    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();
    assert_eq!(h.status(&check).await, "up");

    h.sweeper.sweep_once(at(330)).await.unwrap();
    assert_eq!(h.status(&check).await, "grace");
    assert!(h.notifier.sent().is_empty());

    h.sweeper.sweep_once(at(390)).await.unwrap();
    assert_eq!(h.status(&check).await, "down");

    h.sweeper.sweep_once(at(420)).await.unwrap();
    h.sweeper.sweep_once(at(3600)).await.unwrap();

    let mut notified: Vec<_> = h.notifier.sent().iter().map(|s| s.channel_id).collect();
    notified.sort();
    assert_eq!(notified, vec![webhook.id, email.id]);
    assert!(h
        .notifier
        .sent()
        .iter()
        .all(|s| s.status == CheckStatus::Down));

    let notifications = h.store.all_notifications().await;
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n.status == "sent" && n.check_status == "down"));
}

#[tokio::test]
async fn recovery_notifies_up_subscribers() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();
    let both = h.channel(&check, "webhook", true, true).await;
    h.channel(&check, "email", false, true).await;

    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();
    h.sweeper.sweep_once(at(400)).await.unwrap();

    let outcome = h
        .ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(500))
        .await
        .unwrap();
    assert_eq!(outcome.transition.previous, CheckStatus::Down);
    assert_eq!(outcome.transition.current, CheckStatus::Up);
    assert_eq!(outcome.deliveries.len(), 1);
    assert_eq!(outcome.deliveries[0].channel_id(), both.id);

    let ups: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|s| s.status == CheckStatus::Up)
        .collect();
    assert_eq!(ups.len(), 1);
}

#[tokio::test]
async fn repeated_sweeps_report_nothing_new() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    h.ingestor
        .record(&check.code.to_string(), NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();

    let first = h.sweeper.sweep_once(at(390)).await.unwrap();
    let second = h.sweeper.sweep_once(at(390)).await.unwrap();

    assert_eq!(first.transitions, 1);
    assert_eq!(second.transitions, 0);
    assert_eq!(second.checked, 0);
}

#[tokio::test]
async fn competing_sweepers_notify_once() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    h.channel(&check, "webhook", true, true).await;
    h.ingestor
        .record(&check.code.to_string(), NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();

    let foreign = h.foreign_sweeper();
    let (a, b) = tokio::join!(h.sweeper.sweep_once(at(390)), foreign.sweep_once(at(390)));
    a.unwrap();
    b.unwrap();
    h.sweeper.sweep_once(at(400)).await.unwrap();

    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.store.all_notifications().await.len(), 1);
    assert_eq!(h.store.list_unprocessed_flips(10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn fail_ping_notifies_immediately() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    h.channel(&check, "webhook", true, true).await;

    let outcome = h
        .ingestor
        .record(
            &check.code.to_string(),
            NewPingInput::exit_status(3).unwrap(),
            at(10),
        )
        .await
        .unwrap();

    assert_eq!(outcome.transition.current, CheckStatus::Down);
    assert_eq!(outcome.ping.exit_status, Some(3));
    assert_eq!(outcome.ping.kind, "fail");
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn failed_delivery_is_recorded_and_not_retried() {
    let h = Harness::with_notifier(deadman_events::RecordingNotifier::failing(&["email"]));
    let check = h.interval_check(300, 60).await;
    h.channel(&check, "email", true, true).await;
    h.ingestor
        .record(&check.code.to_string(), NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();

    h.sweeper.sweep_once(at(400)).await.unwrap();
    h.sweeper.sweep_once(at(500)).await.unwrap();

    let notifications = h.store.all_notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].status, "failed");
    assert!(notifications[0].error.is_some());
}

#[tokio::test]
async fn undispatched_flip_is_picked_up_by_the_next_sweep() {
    use deadman_db::models::check::StateUpdate;
    use deadman_db::models::flip::NewFlip;
    use deadman_db::CheckCommit;

    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    h.channel(&check, "webhook", true, true).await;

    // A commit whose process died before dispatching.
    h.store
        .commit(&CheckCommit {
            check_id: check.id,
            expected_version: check.version,
            state: StateUpdate {
                status: CheckStatus::Down,
                last_ping: None,
                last_start: None,
                last_duration_ms: None,
                n_pings: 0,
            },
            ping: None,
            flip: Some(NewFlip {
                created_at: at(0),
                old_status: CheckStatus::New,
                new_status: CheckStatus::Down,
            }),
        })
        .await
        .unwrap()
        .unwrap();

    h.sweeper.sweep_once(at(10)).await.unwrap();
    h.sweeper.sweep_once(at(20)).await.unwrap();

    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn paused_check_is_not_swept_and_resume_starts_over() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();
    h.channel(&check, "webhook", true, true).await;
    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();

    h.admin.pause(common::PROJECT, &code, at(10)).await.unwrap();
    h.sweeper.sweep_once(at(3600)).await.unwrap();
    assert_eq!(h.status(&check).await, "paused");

    let resumed = h.admin.resume(common::PROJECT, &code, at(3700)).await.unwrap();
    assert_eq!(resumed.current, CheckStatus::New);
    h.sweeper.sweep_once(at(99_999)).await.unwrap();
    assert_eq!(h.status(&check).await, "new");
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn cron_check_follows_its_schedule() {
    use deadman_db::models::check::CreateCheck;

    let h = Harness::new();
    // Daily at 13:00 UTC; t0 is 12:00.
    let check = h
        .admin
        .create_check(
            &CreateCheck::cron(common::PROJECT, "daily", "0 13 * * *", "UTC", 600),
            at(0),
        )
        .await
        .unwrap();
    let code = check.code.to_string();

    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();

    h.sweeper.sweep_once(at(3599)).await.unwrap();
    assert_eq!(h.status(&check).await, "up");
    h.sweeper.sweep_once(at(3600)).await.unwrap();
    assert_eq!(h.status(&check).await, "grace");
    h.sweeper.sweep_once(at(3600 + 600)).await.unwrap();
    assert_eq!(h.status(&check).await, "down");
}
