//! TAM status tests.
//!
//! Tests cover: band boundaries, the documented scenario, the partition
//! property and fail-fast threshold validation.

use chrono::{Duration, NaiveDate};
use retention_core::{
    compute_analysis,
    config::{EngineConfig, TamThresholds},
    record::{Customer, Dataset, Transaction},
    tam::{classify_recency, TamStatus},
    EngineError,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn customer(id: &str) -> Customer {
    Customer {
        customer_id: id.to_string(),
        name: format!("Customer {id}"),
        phone: String::new(),
        member_since: None,
        description: String::new(),
    }
}

fn txn(customer_id: &str, invoice_date: NaiveDate, invoice: &str, amount: f64) -> Transaction {
    Transaction {
        customer_id: customer_id.to_string(),
        invoice_date,
        invoice_number: invoice.to_string(),
        amount,
    }
}

fn thresholds() -> TamThresholds {
    TamThresholds {
        active_max_days: 30,
        at_risk_max_days: 90,
        inactive_max_days: 180,
        lost_max_days: 365,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn bands_are_inclusive_at_their_upper_bound() {
    let t = thresholds();
    let cases = [
        (0, TamStatus::Active),
        (30, TamStatus::Active),
        (31, TamStatus::AtRisk),
        (90, TamStatus::AtRisk),
        (91, TamStatus::Inactive),
        (180, TamStatus::Inactive),
        (181, TamStatus::Lost),
        (365, TamStatus::Lost),
        (5000, TamStatus::Lost),
    ];
    for (days, expected) in cases {
        assert_eq!(
            classify_recency(Some(days), &t),
            expected,
            "recency {days} classified wrongly"
        );
    }
    assert_eq!(classify_recency(None, &t), TamStatus::NoPurchase);
}

/// 45 days → At Risk, 400 days → Lost, no transactions → No Purchase.
#[test]
fn documented_scenario_classifies_as_expected() {
    let reference = date("2024-06-30");
    let dataset = Dataset::new(
        vec![customer("at-risk"), customer("lost"), customer("never")],
        vec![
            txn("at-risk", reference - Duration::days(45), "INV001", 120.0),
            txn("lost", reference - Duration::days(400), "INV002", 80.0),
        ],
    );
    let config = EngineConfig::default().validate().unwrap();
    let analysis = compute_analysis(&dataset, Some(reference), &config);

    assert_eq!(analysis.status_of("at-risk"), Some(TamStatus::AtRisk));
    assert_eq!(analysis.status_of("lost"), Some(TamStatus::Lost));
    assert_eq!(analysis.status_of("never"), Some(TamStatus::NoPurchase));
    assert_eq!(analysis.aggregates.beyond_horizon, 1, "400 days is past the 365-day horizon");
}

/// Every customer gets exactly one status; No Purchase iff no qualifying purchase.
#[test]
fn statuses_partition_the_customer_set() {
    let reference = date("2024-03-01");
    let customers: Vec<Customer> = (0..40).map(|i| customer(&format!("c{i:02}"))).collect();
    let transactions: Vec<Transaction> = (0..40)
        .filter(|i| i % 7 != 0)
        .map(|i| {
            txn(
                &format!("c{i:02}"),
                reference - Duration::days(i64::from(i) * 13),
                &format!("INV{i:03}"),
                10.0 + f64::from(i),
            )
        })
        .collect();
    let dataset = Dataset::new(customers, transactions);
    let config = EngineConfig::default().validate().unwrap();
    let analysis = compute_analysis(&dataset, Some(reference), &config);

    assert_eq!(analysis.customers.len(), 40);
    let total: usize = analysis.aggregates.status_counts.iter().map(|c| c.customers).sum();
    assert_eq!(total, 40, "status counts must cover every customer exactly once");

    for c in &analysis.customers {
        let no_purchase = c.status == TamStatus::NoPurchase;
        assert_eq!(
            no_purchase,
            c.raw.frequency == 0 && c.raw.recency.is_none(),
            "{} status {:?} disagrees with its metrics",
            c.customer_id,
            c.status,
        );
        assert_eq!(no_purchase, c.rfm.is_none(), "only purchasers are scored");
    }
}

/// A purchase dated after the reference date does not count.
#[test]
fn future_dated_purchases_do_not_qualify() {
    let reference = date("2024-01-31");
    let dataset = Dataset::new(
        vec![customer("early"), customer("late")],
        vec![
            txn("early", date("2024-01-10"), "INV001", 20.0),
            txn("late", date("2024-02-05"), "INV002", 20.0),
        ],
    );
    let config = EngineConfig::default().validate().unwrap();
    let analysis = compute_analysis(&dataset, Some(reference), &config);

    assert_eq!(analysis.status_of("late"), Some(TamStatus::NoPurchase));
    assert_eq!(analysis.aggregates.transactions_future_dated, 1);
}

#[test]
fn non_increasing_thresholds_are_rejected_up_front() {
    let mut config = EngineConfig::default();
    config.tam.at_risk_max_days = config.tam.active_max_days;
    assert!(matches!(config.validate(), Err(EngineError::Configuration { .. })));

    let mut config = EngineConfig::default();
    config.tam.lost_max_days = 100;
    assert!(matches!(config.validate(), Err(EngineError::Configuration { .. })));
}

#[test]
fn bucket_count_below_two_is_rejected() {
    let config = EngineConfig::with_bucket_count(1);
    assert!(matches!(config.validate(), Err(EngineError::Configuration { .. })));
}

#[test]
fn status_labels_round_trip() {
    for status in TamStatus::ALL {
        assert_eq!(TamStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(
        serde_json::to_string(&TamStatus::AtRisk).unwrap(),
        "\"At Risk\""
    );
}
