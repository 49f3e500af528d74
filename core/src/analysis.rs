//! Analysis facade: the single entry point for classification.
//!
//! EXECUTION ORDER (fixed):
//!   1. Metric calculator   (raw recency / frequency / monetary)
//!   2. Scorer              (purchasers only)
//!   3. Segmenter           (scored customers only)
//!   4. TAM classifier      (every customer)
//!   5. Aggregates
//!
//! RULES:
//!   - A run is a pure function of (dataset, reference date, config).
//!   - Every customer in the dataset appears exactly once in the output.
//!   - Output order is by customer id, independent of input order.

use crate::{
    config::ValidatedConfig,
    metrics::{compute_metrics, RawMetrics},
    record::{Dataset, RejectedTransaction},
    scorer::{score_customers, RfmScore},
    segment::assign_segment,
    tam::{self, TamStatus},
    types::CustomerId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAnalysis {
    pub customer_id: CustomerId,
    pub name:        String,
    pub raw:         RawMetrics,
    pub rfm:         Option<RfmScore>,
    pub segment:     Option<String>,
    pub status:      TamStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub label:         String,
    pub customers:     usize,
    pub avg_recency:   f64,
    pub avg_frequency: f64,
    pub avg_monetary:  f64,
    pub members:       Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status:    TamStatus,
    pub customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub customers_analyzed:        usize,
    pub customers_with_purchases:  usize,
    pub transactions_processed:    usize,
    pub transactions_rejected:     usize,
    pub transactions_future_dated: usize,
    pub total_sales:               f64,
    /// Lost customers whose recency also exceeds `lost_max_days`.
    pub beyond_horizon:            usize,
    pub status_counts:             Vec<StatusCount>,
    /// Sorted by average monetary value, highest first.
    pub segments:                  Vec<SegmentSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub reference_date: Option<NaiveDate>,
    pub customers:      Vec<CustomerAnalysis>,
    pub aggregates:     Aggregates,
    pub rejected:       Vec<RejectedTransaction>,
}

impl Analysis {
    pub fn customer(&self, customer_id: &str) -> Option<&CustomerAnalysis> {
        self.customers
            .binary_search_by(|c| c.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|i| &self.customers[i])
    }

    pub fn status_of(&self, customer_id: &str) -> Option<TamStatus> {
        self.customer(customer_id).map(|c| c.status)
    }

    pub fn count(&self, status: TamStatus) -> usize {
        self.customers.iter().filter(|c| c.status == status).count()
    }
}

/// Classify every customer in `dataset`.
///
/// `reference_date` defaults to the latest valid invoice date.
pub fn compute_analysis(
    dataset: &Dataset,
    reference_date: Option<NaiveDate>,
    config: &ValidatedConfig,
) -> Analysis {
    let run = compute_metrics(dataset, reference_date, config.rfm.lookback);
    let scores = score_customers(&run.metrics, config.rfm.bucket_count);

    let names: HashMap<&str, &str> = dataset
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.name.as_str()))
        .collect();

    let mut beyond_horizon = 0;
    let customers: Vec<CustomerAnalysis> = run
        .metrics
        .into_iter()
        .map(|raw| {
            let rfm = scores.get(&raw.customer_id).copied();
            let segment = rfm
                .as_ref()
                .and_then(|score| assign_segment(&config.segments, score))
                .map(str::to_string);
            let status = tam::classify(&raw, &config.tam);
            if tam::beyond_horizon(raw.recency, &config.tam) {
                beyond_horizon += 1;
            }
            let name = names
                .get(raw.customer_id.as_str())
                .copied()
                .unwrap_or_default()
                .to_string();
            CustomerAnalysis {
                customer_id: raw.customer_id.clone(),
                name,
                raw,
                rfm,
                segment,
                status,
            }
        })
        .collect();

    let status_counts = TamStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            customers: customers.iter().filter(|c| c.status == status).count(),
        })
        .collect();

    let aggregates = Aggregates {
        customers_analyzed:        customers.len(),
        customers_with_purchases:  scores.len(),
        transactions_processed:    run.qualifying_count,
        transactions_rejected:     run.rejected.len(),
        transactions_future_dated: run.future_dated_count,
        total_sales:               run.qualifying_volume,
        beyond_horizon,
        status_counts,
        segments:                  summarize_segments(&customers),
    };

    log::debug!(
        "analysis: {} customers, {} scored, {} rejected rows",
        aggregates.customers_analyzed,
        aggregates.customers_with_purchases,
        aggregates.transactions_rejected,
    );

    Analysis {
        reference_date: run.reference_date,
        customers,
        aggregates,
        rejected: run.rejected,
    }
}

fn summarize_segments(customers: &[CustomerAnalysis]) -> Vec<SegmentSummary> {
    let mut groups: BTreeMap<&str, Vec<&CustomerAnalysis>> = BTreeMap::new();
    for c in customers {
        if let Some(label) = c.segment.as_deref() {
            groups.entry(label).or_default().push(c);
        }
    }

    let mut summaries: Vec<SegmentSummary> = groups
        .into_iter()
        .map(|(label, members)| {
            let n = members.len() as f64;
            let avg = |f: fn(&RawMetrics) -> f64| members.iter().map(|c| f(&c.raw)).sum::<f64>() / n;
            SegmentSummary {
                label:         label.to_string(),
                customers:     members.len(),
                avg_recency:   avg(|r| r.recency.unwrap_or_default() as f64),
                avg_frequency: avg(|r| f64::from(r.frequency)),
                avg_monetary:  avg(|r| r.monetary),
                members:       members
                    .iter()
                    .map(|c| if c.name.is_empty() { c.customer_id.clone() } else { c.name.clone() })
                    .collect(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_monetary
            .total_cmp(&a.avg_monetary)
            .then_with(|| a.label.cmp(&b.label))
    });
    summaries
}
