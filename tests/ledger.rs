//! Ledger behavior end to end over real backends.

use std::sync::{Arc, Barrier};

use dots_ledger::config::GitConfig;
use dots_ledger::persist::{Backend, PersistError, SnapshotStore};
use dots_ledger::{ClaimOutcome, Ledger, UserId, UserRecord, WallMillis, WindowRule};
use time::macros::datetime;

/// Millis for a UTC instant.
fn utc_ms(dt: time::OffsetDateTime) -> WallMillis {
    WallMillis((dt.unix_timestamp_nanos() / 1_000_000) as u64)
}

fn snapshot_ledger(dir: &std::path::Path) -> Ledger {
    Ledger::new(
        WindowRule::fixed_default(),
        Arc::new(SnapshotStore::new(dir.join("users.json"))),
    )
}

#[test]
fn double_claim_grants_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = snapshot_ledger(dir.path());
    let now = utc_ms(datetime!(2025-03-12 12:00 UTC));

    let first = ledger.claim_daily_at(UserId(1), "ada", now);
    assert_eq!(
        first,
        ClaimOutcome {
            dots: 10,
            claimed: true,
            persisted: true
        }
    );

    // Same window: no mutation of balance or timestamp.
    let second = ledger.claim_daily_at(UserId(1), "ada", WallMillis(now.0 + 1));
    assert_eq!(second.dots, 10);
    assert!(!second.claimed);
    let record = ledger.user(UserId(1)).expect("record");
    assert_eq!(record.last_check_in, now);
}

#[test]
fn daily_and_share_windows_are_independent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = snapshot_ledger(dir.path());
    let now = utc_ms(datetime!(2025-03-12 12:00 UTC));

    assert!(ledger.claim_daily_at(UserId(1), "ada", now).claimed);
    let share = ledger.claim_share_at(UserId(1), "ada", now);
    assert!(share.claimed);
    assert_eq!(share.dots, 30);
    assert!(!ledger.claim_share_at(UserId(1), "ada", now).claimed);
}

#[test]
fn next_window_grants_again() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = snapshot_ledger(dir.path());

    // Claim at noon; the next 01:00 UTC+1 reset is 00:00 UTC the next day.
    let noon = utc_ms(datetime!(2025-03-12 12:00 UTC));
    assert!(ledger.claim_daily_at(UserId(1), "ada", noon).claimed);

    let next_morning = utc_ms(datetime!(2025-03-13 02:00 UTC));
    let outcome = ledger.claim_daily_at(UserId(1), "ada", next_morning);
    assert!(outcome.claimed);
    assert_eq!(outcome.dots, 20);
}

#[test]
fn balance_does_not_create_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = snapshot_ledger(dir.path());

    assert_eq!(ledger.balance(UserId(404)), 0);
    assert!(ledger.user(UserId(404)).is_none());
}

#[test]
fn concurrent_share_claims_grant_exactly_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = Arc::new(snapshot_ledger(dir.path()));

    const CALLERS: usize = 16;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                ledger.claim_share(UserId(1), "ada")
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let granted = outcomes.iter().filter(|o| o.claimed).count();
    assert_eq!(granted, 1);
    assert_eq!(ledger.balance(UserId(1)), 20);
}

#[test]
fn claims_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let now = utc_ms(datetime!(2025-03-12 12:00 UTC));

    {
        let ledger = snapshot_ledger(dir.path());
        ledger.claim_daily_at(UserId(1), "ada", now);
        ledger.claim_share_at(UserId(2), "bob", now);
    }

    let ledger = snapshot_ledger(dir.path());
    assert_eq!(ledger.load().expect("load"), 2);
    assert_eq!(ledger.balance(UserId(1)), 10);
    assert_eq!(ledger.balance(UserId(2)), 20);

    // Timestamps round-tripped, so the same window still refuses.
    assert!(!ledger.claim_daily_at(UserId(1), "ada", WallMillis(now.0 + 1)).claimed);
}

struct FailingBackend;

impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn load(&self) -> Result<Vec<UserRecord>, PersistError> {
        Ok(Vec::new())
    }

    fn save(&self, _changed: &UserRecord, _all: &[UserRecord]) -> Result<(), PersistError> {
        Err(PersistError::Http("connection refused".to_string()))
    }
}

#[test]
fn backend_outage_does_not_abort_claims() {
    let ledger = Ledger::new(WindowRule::fixed_default(), Arc::new(FailingBackend));
    let now = utc_ms(datetime!(2025-03-12 12:00 UTC));

    let outcome = ledger.claim_daily_at(UserId(1), "ada", now);
    assert!(outcome.claimed);
    assert!(!outcome.persisted);
    assert_eq!(outcome.dots, 10);

    // The in-memory state stayed authoritative.
    assert_eq!(ledger.balance(UserId(1)), 10);
}

#[test]
fn rolling_rule_ledger_uses_elapsed_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = Ledger::new(
        WindowRule::Rolling { hours: 24 },
        Arc::new(SnapshotStore::new(dir.path().join("users.json"))),
    );

    let start = WallMillis(1_700_000_000_000);
    assert!(ledger.claim_daily_at(UserId(1), "ada", start).claimed);

    let one_hour_short = WallMillis(start.0 + 23 * 3_600_000);
    assert!(!ledger.claim_daily_at(UserId(1), "ada", one_hour_short).claimed);

    let full_day = WallMillis(start.0 + 24 * 3_600_000);
    assert!(ledger.claim_daily_at(UserId(1), "ada", full_day).claimed);
}

#[test]
fn git_backend_round_trips_through_ledger() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = GitConfig {
        repo_path: root.path().join("repo"),
        snapshot_path: root.path().join("repo").join("users.json"),
        push_interval_secs: 0,
    };

    let now = utc_ms(datetime!(2025-03-12 12:00 UTC));
    {
        let (store, worker) = dots_ledger::persist::GitStore::spawn(&cfg).expect("spawn");
        let ledger = Ledger::new(WindowRule::fixed_default(), Arc::new(store));
        ledger.claim_daily_at(UserId(9), "ada", now);
        worker.flush().expect("flush");
        worker.shutdown();
    }

    let (store, worker) = dots_ledger::persist::GitStore::spawn(&cfg).expect("spawn");
    let ledger = Ledger::new(WindowRule::fixed_default(), Arc::new(store));
    assert_eq!(ledger.load().expect("load"), 1);
    assert_eq!(ledger.balance(UserId(9)), 10);
    worker.shutdown();
}
