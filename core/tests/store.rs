//! Namespace store tests.
//!
//! Tests cover: dataset replacement and upload screening, consistent
//! snapshots, namespace lookup, the compare-and-set ledger claim with its
//! confirm and release, and the notification journal.

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use retention_core::{
    contract::{DatasetSource, LedgerRepository},
    error::EngineError,
    event::{Alert, NotificationEvent},
    ledger::NotificationRecord,
    notify::LedgerStep,
    record::{Customer, Dataset, Transaction},
    tam::TamStatus,
    NamespaceStore,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

const NS: &str = "shop-1";

fn store() -> NamespaceStore {
    NamespaceStore::open_migrated(":memory:").unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn customer(id: &str) -> Customer {
    Customer {
        customer_id:  id.to_string(),
        name:         format!("Name of {id}"),
        phone:        "+62 811 000".to_string(),
        member_since: Some(date("2023-01-15")),
        description:  String::new(),
    }
}

fn txn(customer_id: &str, day: &str, invoice: &str, amount: f64) -> Transaction {
    Transaction {
        customer_id:    customer_id.to_string(),
        invoice_date:   date(day),
        invoice_number: invoice.to_string(),
        amount,
    }
}

fn sample() -> Dataset {
    Dataset::new(
        vec![customer("c1"), customer("c2")],
        vec![
            txn("c1", "2024-05-01", "A-1", 25.5),
            txn("c2", "2024-05-03", "B-1", 12.0),
            txn("c2", "2024-05-09", "B-2", 30.0),
        ],
    )
}

fn at_risk_event(customer_id: &str, day: u32) -> NotificationEvent {
    NotificationEvent {
        namespace:     NS.to_string(),
        customer_id:   customer_id.to_string(),
        customer_name: String::new(),
        raised_at:     Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
        alert:         Alert::AtRiskEntered {
            previous_status: Some(TamStatus::Active),
            recency_days:    40,
        },
    }
}

/// A first-time step that moves `customer_id` into At Risk with an alert.
fn alert_step(customer_id: &str, day: u32) -> LedgerStep {
    let event = at_risk_event(customer_id, day);
    let mut next = NotificationRecord::new(customer_id, TamStatus::AtRisk);
    next.last_alert_at = Some(event.raised_at);
    LedgerStep {
        previous: None,
        next,
        event: Some(event),
    }
}

/// Claim a step and confirm its delivery, as a successful sweep does.
fn commit(store: &NamespaceStore, namespace: &str, sweep_id: &str, step: &LedgerStep) {
    store.claim_step(namespace, sweep_id, step).unwrap();
    store.confirm_step(namespace, sweep_id, step).unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn dataset_round_trips_through_the_store() {
    let store = store();
    let summary = store.replace_dataset(NS, &sample()).unwrap();
    assert_eq!(summary.customers, 2);
    assert_eq!(summary.transactions, 3);
    assert_eq!(summary.skipped, 0);

    let loaded = store.load_dataset(NS).unwrap();
    assert_eq!(loaded, sample());
    assert_eq!(store.namespaces().unwrap(), vec![NS.to_string()]);
}

#[test]
fn upload_skips_rows_that_break_the_contract() {
    let store = store();
    let mut data = sample();
    data.customers.push(customer("c1"));
    data.transactions.push(txn("ghost", "2024-05-02", "G-1", 10.0));
    data.transactions.push(txn("c1", "2024-05-02", "A-1", 10.0));
    data.transactions.push(txn("c1", "2024-05-02", "A-9", -1.0));

    let summary = store.replace_dataset(NS, &data).unwrap();
    assert_eq!(summary.customers, 2);
    assert_eq!(summary.transactions, 3);
    assert_eq!(summary.skipped, 3);
    assert_eq!(store.transactions(NS).unwrap().len(), 3);
}

/// Re-uploading replaces the dataset wholesale.
#[test]
fn replace_drops_previous_rows() {
    let store = store();
    store.replace_dataset(NS, &sample()).unwrap();

    let smaller = Dataset::new(vec![customer("c3")], vec![txn("c3", "2024-06-01", "C-1", 5.0)]);
    store.replace_dataset(NS, &smaller).unwrap();

    let loaded = store.load_dataset(NS).unwrap();
    assert_eq!(loaded, smaller);
}

#[test]
fn missing_namespace_is_not_found() {
    let store = store();
    assert!(!store.has_namespace("nobody").unwrap());
    assert!(matches!(
        store.load_dataset("nobody"),
        Err(EngineError::NamespaceNotFound { .. })
    ));
}

#[test]
fn ledger_commit_is_compare_and_set() {
    let store = store();
    let first = alert_step("c1", 1);
    commit(&store, NS, "sweep-1", &first);

    // The same step again: the record is no longer absent.
    assert!(matches!(
        store.claim_step(NS, "sweep-2", &first),
        Err(EngineError::LedgerConflict { .. })
    ));

    // A step built on a stale view of the record is refused.
    let mut stale_prev = first.next.clone();
    stale_prev.last_status = TamStatus::Active;
    let stale = LedgerStep {
        previous: Some(stale_prev),
        next:     NotificationRecord::new("c1", TamStatus::Inactive),
        event:    None,
    };
    assert!(matches!(
        store.claim_step(NS, "sweep-2", &stale),
        Err(EngineError::LedgerConflict { .. })
    ));

    // A step built on the current record applies.
    let mut next = first.next.clone();
    next.last_status = TamStatus::Inactive;
    let current = LedgerStep {
        previous: Some(first.next.clone()),
        next:     next.clone(),
        event:    None,
    };
    commit(&store, NS, "sweep-2", &current);

    let ledger = store.load_ledger(NS).unwrap();
    assert_eq!(ledger.get("c1"), Some(&next));
    assert_eq!(store.notification_log(NS).unwrap().len(), 1);
}

/// A rejected claim writes neither the record nor the journal row.
#[test]
fn conflicting_claim_rolls_back_the_journal() {
    let store = store();
    commit(&store, NS, "sweep-1", &alert_step("c1", 1));
    let _ = store.claim_step(NS, "sweep-2", &alert_step("c1", 2));

    let log = store.notification_log(NS).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].sweep_id, "sweep-1");
}

#[test]
fn journal_tracks_seen_flag() {
    let store = store();
    commit(&store, NS, "sweep-1", &alert_step("c1", 1));
    commit(&store, NS, "sweep-1", &alert_step("c2", 1));

    let unseen = store.unseen_notifications(NS).unwrap();
    assert_eq!(unseen.len(), 2);
    assert!(unseen.iter().all(|e| !e.seen));
    assert_eq!(unseen[0].event, at_risk_event("c1", 1));

    assert_eq!(store.mark_notifications_seen(NS).unwrap(), 2);
    assert!(store.unseen_notifications(NS).unwrap().is_empty());
    assert!(store.notification_log(NS).unwrap().iter().all(|e| e.seen));
    assert_eq!(store.mark_notifications_seen(NS).unwrap(), 0);
}

#[test]
fn ledger_survives_dataset_replacement() {
    let store = store();
    store.replace_dataset(NS, &sample()).unwrap();
    commit(&store, NS, "sweep-1", &alert_step("c1", 1));

    let summary = store.replace_dataset(NS, &sample()).unwrap();
    assert_eq!(summary.pruned, 0);

    let ledger = store.load_ledger(NS).unwrap();
    assert_eq!(ledger.get("c1").unwrap().last_status, TamStatus::AtRisk);
    assert_eq!(store.notification_log(NS).unwrap().len(), 1);
}

/// Records of customers the new upload no longer contains are dropped.
#[test]
fn reupload_prunes_records_of_dropped_customers() {
    let store = store();
    store.replace_dataset(NS, &sample()).unwrap();
    commit(&store, NS, "sweep-1", &alert_step("c1", 1));
    commit(&store, NS, "sweep-1", &alert_step("c2", 1));
    commit(&store, "other", "sweep-1", &alert_step("c1", 1));

    let only_c2 = Dataset::new(vec![customer("c2")], vec![txn("c2", "2024-05-03", "B-1", 12.0)]);
    let summary = store.replace_dataset(NS, &only_c2).unwrap();
    assert_eq!(summary.pruned, 1);

    let ledger = store.load_ledger(NS).unwrap();
    assert!(ledger.get("c1").is_none());
    assert!(ledger.get("c2").is_some());
    assert!(
        store.load_ledger("other").unwrap().get("c1").is_some(),
        "pruning is scoped to the uploaded namespace"
    );
    // Delivered history is kept.
    assert_eq!(store.notification_log(NS).unwrap().len(), 2);
}

#[test]
fn ledgers_are_scoped_by_namespace() {
    let store = store();
    commit(&store, "north", "sweep-1", &alert_step("c1", 1));

    assert!(store.load_ledger("south").unwrap().is_empty());
    assert!(store.notification_log("south").unwrap().is_empty());
    // Same customer id, other namespace: no conflict.
    commit(&store, "south", "sweep-1", &alert_step("c1", 1));
}

/// A claimed alert stays out of the journal until delivery is confirmed,
/// and blocks a second claim for the same customer and day.
#[test]
fn claim_is_pending_until_confirmed() {
    let store = store();
    let step = alert_step("c1", 1);
    store.claim_step(NS, "sweep-1", &step).unwrap();

    assert!(store.notification_log(NS).unwrap().is_empty());
    assert!(store.unseen_notifications(NS).unwrap().is_empty());
    assert_eq!(store.mark_notifications_seen(NS).unwrap(), 0);
    assert_eq!(store.load_ledger(NS).unwrap().get("c1"), Some(&step.next));

    // Another sweeper with the same stale view loses.
    assert!(matches!(
        store.claim_step(NS, "sweep-2", &step),
        Err(EngineError::LedgerConflict { .. })
    ));

    store.confirm_step(NS, "sweep-1", &step).unwrap();
    let log = store.notification_log(NS).unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].seen);
}

#[test]
fn release_restores_the_previous_record() {
    let store = store();

    // First-time claim: release removes the record entirely.
    let fresh = alert_step("c1", 1);
    store.claim_step(NS, "sweep-1", &fresh).unwrap();
    store.release_step(NS, "sweep-1", &fresh).unwrap();
    assert!(store.load_ledger(NS).unwrap().is_empty());

    // The dedupe key is free again.
    commit(&store, NS, "sweep-2", &fresh);

    // Claim on top of an existing record: release puts it back.
    let mut next = fresh.next.clone();
    next.vip_alerted_at = Some(Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap());
    let vip = LedgerStep {
        previous: Some(fresh.next.clone()),
        next,
        event:    Some(NotificationEvent {
            alert: Alert::VipPromoted { segment: "Champions".into() },
            ..at_risk_event("c1", 2)
        }),
    };
    store.claim_step(NS, "sweep-3", &vip).unwrap();
    store.release_step(NS, "sweep-3", &vip).unwrap();

    assert_eq!(store.load_ledger(NS).unwrap().get("c1"), Some(&fresh.next));
    let log = store.notification_log(NS).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].sweep_id, "sweep-2");
}

/// A load racing with uploads always sees one whole dataset, never
/// customers from one upload and transactions from another.
#[test]
fn loads_never_mix_two_uploads() {
    let store = store();
    let old = sample();
    let new = Dataset::new(
        vec![customer("n1"), customer("n2"), customer("n3")],
        vec![
            txn("n1", "2024-06-01", "N-1", 5.0),
            txn("n2", "2024-06-02", "N-2", 6.0),
            txn("n3", "2024-06-03", "N-3", 7.0),
        ],
    );
    store.replace_dataset(NS, &old).unwrap();

    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..200 {
                let next = if i % 2 == 0 { &new } else { &old };
                store.replace_dataset(NS, next).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        let mut loads = 0;
        while !done.load(Ordering::SeqCst) || loads < 50 {
            let loaded = store.load_dataset(NS).unwrap();
            assert!(
                loaded == old || loaded == new,
                "torn snapshot: {} customers, {} transactions",
                loaded.customers.len(),
                loaded.transactions.len()
            );
            loads += 1;
        }
    });
}
