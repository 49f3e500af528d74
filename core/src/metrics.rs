//! Metric calculator: raw recency, frequency and monetary per customer.
//!
//! Rules:
//!   - Only transactions dated on or before the reference date qualify.
//!   - Recency uses every qualifying transaction; the lookback window only
//!     narrows what counts toward frequency and monetary.
//!   - A customer with no qualifying transaction has no recency and is
//!     treated as no-purchase downstream.
//!   - Rows that break the ingestion contract are rejected, never attributed.

use crate::{
    config::Lookback,
    record::{Dataset, RejectedTransaction, RejectionReason, Transaction},
    types::{CustomerId, Days},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub customer_id:   CustomerId,
    /// Whole days since the latest qualifying transaction.
    pub recency:       Option<Days>,
    pub frequency:     u32,
    pub monetary:      f64,
    pub last_purchase: Option<NaiveDate>,
}

impl RawMetrics {
    fn empty(customer_id: &str) -> Self {
        Self {
            customer_id:   customer_id.to_string(),
            recency:       None,
            frequency:     0,
            monetary:      0.0,
            last_purchase: None,
        }
    }

    pub fn is_no_purchase(&self) -> bool {
        self.recency.is_none()
    }
}

/// Output of one metric pass over a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRun {
    /// `None` only when no reference date was supplied and the dataset has
    /// no valid transactions to derive one from.
    pub reference_date:      Option<NaiveDate>,
    /// One entry per customer, ordered by customer id.
    pub metrics:             Vec<RawMetrics>,
    pub rejected:            Vec<RejectedTransaction>,
    /// Valid transactions dated on or before the reference date.
    pub qualifying_count:    usize,
    /// Valid transactions dated after the reference date.
    pub future_dated_count:  usize,
    pub qualifying_volume:   f64,
}

pub fn compute_metrics(
    dataset: &Dataset,
    reference_date: Option<NaiveDate>,
    lookback: Lookback,
) -> MetricRun {
    let mut by_customer: BTreeMap<&str, RawMetrics> = BTreeMap::new();
    for customer in &dataset.customers {
        if by_customer.contains_key(customer.customer_id.as_str()) {
            log::warn!("duplicate customer id {} ignored", customer.customer_id);
            continue;
        }
        by_customer.insert(&customer.customer_id, RawMetrics::empty(&customer.customer_id));
    }

    let (valid, rejected) = screen_transactions(dataset, &by_customer);

    let reference_date = reference_date.or_else(|| valid.iter().map(|t| t.invoice_date).max());

    let mut qualifying_count = 0;
    let mut future_dated_count = 0;
    let mut qualifying_volume = 0.0;

    if let Some(reference) = reference_date {
        for txn in valid {
            if txn.invoice_date > reference {
                future_dated_count += 1;
                continue;
            }
            let Some(entry) = by_customer.get_mut(txn.customer_id.as_str()) else {
                continue;
            };
            qualifying_count += 1;
            qualifying_volume += txn.amount;

            if entry.last_purchase.map_or(true, |d| txn.invoice_date > d) {
                entry.last_purchase = Some(txn.invoice_date);
            }

            let elapsed = (reference - txn.invoice_date).num_days();
            if in_window(elapsed, lookback) {
                entry.frequency += 1;
                entry.monetary += txn.amount;
            }
        }

        for entry in by_customer.values_mut() {
            entry.recency = entry.last_purchase.map(|d| (reference - d).num_days());
        }
    }

    if future_dated_count > 0 {
        log::debug!("{future_dated_count} transactions dated after the reference date excluded");
    }

    MetricRun {
        reference_date,
        metrics: by_customer.into_values().collect(),
        rejected,
        qualifying_count,
        future_dated_count,
        qualifying_volume,
    }
}

fn in_window(elapsed_days: Days, lookback: Lookback) -> bool {
    match lookback {
        Lookback::AllTime => true,
        Lookback::TrailingDays { days } => elapsed_days < Days::from(days),
    }
}

/// Split transactions into usable rows and rejected rows.
fn screen_transactions<'a>(
    dataset: &'a Dataset,
    known: &BTreeMap<&str, RawMetrics>,
) -> (Vec<&'a Transaction>, Vec<RejectedTransaction>) {
    let mut valid = Vec::with_capacity(dataset.transactions.len());
    let mut rejected = Vec::new();
    let mut seen_invoices: HashSet<(&str, &str)> = HashSet::new();

    for txn in &dataset.transactions {
        let reason = if !known.contains_key(txn.customer_id.as_str()) {
            Some(RejectionReason::UnknownCustomer)
        } else if !txn.amount.is_finite() || txn.amount < 0.0 {
            Some(RejectionReason::InvalidAmount)
        } else if !seen_invoices.insert((txn.customer_id.as_str(), txn.invoice_number.as_str())) {
            Some(RejectionReason::DuplicateInvoice)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                log::warn!(
                    "transaction {} for customer {} rejected: {:?}",
                    txn.invoice_number,
                    txn.customer_id,
                    reason,
                );
                rejected.push(RejectedTransaction {
                    transaction: txn.clone(),
                    reason,
                });
            }
            None => valid.push(txn),
        }
    }

    (valid, rejected)
}
