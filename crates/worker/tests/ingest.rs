//! Ping ingestion edge cases.

mod common;

use assert_matches::assert_matches;
use deadman_core::error::CoreError;
use deadman_core::log_events::SortOrder;
use deadman_core::status::{CheckStatus, PingKind};
use deadman_db::models::check::CreateCheck;
use deadman_db::Store;
use deadman_worker::{MonitorError, NewPingInput};

use common::{at, Harness, PROJECT, RETENTION};

#[tokio::test]
async fn every_ping_gets_the_next_number() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();

    let mut ns = Vec::new();
    for (i, kind) in [PingKind::Start, PingKind::Log, PingKind::Success, PingKind::Ign]
        .into_iter()
        .enumerate()
    {
        let outcome = h
            .ingestor
            .record(&code, NewPingInput::new(kind), at(i as i64))
            .await
            .unwrap();
        ns.push(outcome.ping.n);
    }

    assert_eq!(ns, vec![1, 2, 3, 4]);
    let stored = h.store.find_check(check.id).await.unwrap().unwrap();
    assert_eq!(stored.n_pings, 4);
    assert_eq!(stored.last_ping, Some(at(2)));
}

#[tokio::test]
async fn start_then_success_records_run_duration() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();

    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Start), at(0))
        .await
        .unwrap();
    let outcome = h
        .ingestor
        .record(
            &code,
            NewPingInput::new(PingKind::Success).with_body("done"),
            at(42),
        )
        .await
        .unwrap();

    assert_eq!(outcome.ping.duration_ms, Some(42_000));
    assert_eq!(outcome.ping.body.as_deref(), Some("done"));
    let stored = h.store.find_check(check.id).await.unwrap().unwrap();
    assert_eq!(stored.last_duration_ms, Some(42_000));
    assert!(stored.last_start.is_none());
}

#[tokio::test]
async fn unknown_malformed_and_deleted_codes_are_not_found() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let deleted = h.interval_check(300, 60).await;
    h.admin
        .delete(PROJECT, &deleted.code.to_string(), at(0))
        .await
        .unwrap();

    let codes = [
        "not-a-uuid".to_string(),
        uuid::Uuid::new_v4().to_string(),
        deleted.code.to_string(),
    ];
    for code in &codes {
        let err = h
            .ingestor
            .record(code, NewPingInput::new(PingKind::Success), at(1))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            MonitorError::Core(CoreError::NotFound { entity: "check", .. })
        );
        assert!(err.is_client_error());
    }

    // The live check is untouched.
    let stored = h.store.find_check(check.id).await.unwrap().unwrap();
    assert_eq!(stored.n_pings, 0);
}

#[tokio::test]
async fn exit_status_out_of_range_is_rejected() {
    assert_matches!(NewPingInput::exit_status(256), Err(CoreError::Validation(_)));
    assert_matches!(NewPingInput::exit_status(-1), Err(CoreError::Validation(_)));
    assert_eq!(NewPingInput::exit_status(0).unwrap().kind, PingKind::Success);
}

#[tokio::test]
async fn manual_resume_check_ignores_pings_while_paused() {
    let h = Harness::new();
    let mut input = CreateCheck::interval(PROJECT, "strict", 300, 60);
    input.manual_resume = true;
    let check = h.admin.create_check(&input, at(0)).await.unwrap();
    let code = check.code.to_string();

    h.ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(0))
        .await
        .unwrap();
    h.admin.pause(PROJECT, &code, at(10)).await.unwrap();

    let outcome = h
        .ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(20))
        .await
        .unwrap();
    assert!(!outcome.transition.occurred());
    assert_eq!(outcome.ping.n, 2);
    assert_eq!(h.status(&check).await, "paused");
}

#[tokio::test]
async fn ping_resumes_paused_check_without_manual_resume() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();
    h.admin.pause(PROJECT, &code, at(0)).await.unwrap();

    let outcome = h
        .ingestor
        .record(&code, NewPingInput::new(PingKind::Success), at(5))
        .await
        .unwrap();
    assert_eq!(outcome.transition.previous, CheckStatus::Paused);
    assert_eq!(outcome.transition.current, CheckStatus::Up);
}

#[tokio::test]
async fn old_pings_are_pruned_beyond_retention() {
    let h = Harness::new();
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();

    for i in 0..(RETENTION + 5) {
        h.ingestor
            .record(&code, NewPingInput::new(PingKind::Log), at(i))
            .await
            .unwrap();
    }

    let pings = h
        .store
        .list_pings(check.id, 0, None, SortOrder::OldestFirst, 1000)
        .await
        .unwrap();
    assert_eq!(pings.len() as i64, RETENTION);
    assert_eq!(pings[0].n, 6);
    assert_eq!(pings.last().unwrap().n, RETENTION + 5);
}

#[tokio::test]
async fn invalid_schedules_are_rejected_at_registration() {
    let h = Harness::new();
    let bad = [
        CreateCheck::interval(PROJECT, "too fast", 10, 60),
        CreateCheck::interval(PROJECT, "no grace", 300, 1),
        CreateCheck::cron(PROJECT, "bad cron", "61 * * * *", "UTC", 60),
        CreateCheck::cron(PROJECT, "bad tz", "0 3 * * *", "Mars/Olympus", 60),
        CreateCheck::interval(PROJECT, "  ", 300, 60),
    ];
    for input in &bad {
        let err = h.admin.create_check(input, at(0)).await.unwrap_err();
        assert_matches!(err, MonitorError::Core(CoreError::Validation(_)), "{}", input.name);
    }
}

#[tokio::test]
async fn concurrent_pings_are_serialised() {
    let h = std::sync::Arc::new(Harness::new());
    let check = h.interval_check(300, 60).await;
    let code = check.code.to_string();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let h = h.clone();
            let code = code.clone();
            tokio::spawn(async move {
                h.ingestor
                    .record(&code, NewPingInput::new(PingKind::Success), at(i))
                    .await
                    .unwrap()
                    .ping
                    .n
            })
        })
        .collect();

    let mut ns = Vec::new();
    for handle in handles {
        ns.push(handle.await.unwrap());
    }
    ns.sort();
    assert_eq!(ns, (1..=20).collect::<Vec<i64>>());
}
