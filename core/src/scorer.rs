//! Quantile scorer: raw metrics to ordinal scores in `1..=K`.
//!
//! Each dimension is ranked independently over the current population and
//! cut into K buckets of near-equal size. Equal raw values always share a
//! bucket: a tie that straddles a cut point stays in the lower bucket.
//! A dimension where every customer has the same value scores K for all.

use crate::{
    metrics::RawMetrics,
    types::{CustomerId, Score},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RfmScore {
    pub recency:   Score,
    pub frequency: Score,
    pub monetary:  Score,
}

impl RfmScore {
    pub fn new(recency: Score, frequency: Score, monetary: Score) -> Self {
        Self { recency, frequency, monetary }
    }

    /// Compact "RFM" code, e.g. `"545"`. Only unambiguous for K < 10.
    pub fn code(&self) -> String {
        format!("{}{}{}", self.recency, self.frequency, self.monetary)
    }
}

/// Score every customer that has at least one qualifying transaction.
/// No-purchase customers are skipped and never receive a score.
pub fn score_customers(metrics: &[RawMetrics], bucket_count: Score) -> BTreeMap<CustomerId, RfmScore> {
    let purchasers: Vec<&RawMetrics> = metrics.iter().filter(|m| !m.is_no_purchase()).collect();

    // Recency is inverted so that the most recent buyers rank highest.
    let recency = assign_buckets(
        purchasers
            .iter()
            .map(|m| (m.customer_id.as_str(), -(m.recency.unwrap_or_default() as f64)))
            .collect(),
        bucket_count,
    );
    let frequency = assign_buckets(
        purchasers
            .iter()
            .map(|m| (m.customer_id.as_str(), f64::from(m.frequency)))
            .collect(),
        bucket_count,
    );
    let monetary = assign_buckets(
        purchasers
            .iter()
            .map(|m| (m.customer_id.as_str(), m.monetary))
            .collect(),
        bucket_count,
    );

    purchasers
        .iter()
        .filter_map(|m| {
            let id = m.customer_id.as_str();
            let score = RfmScore::new(
                *recency.get(id)?,
                *frequency.get(id)?,
                *monetary.get(id)?,
            );
            Some((m.customer_id.clone(), score))
        })
        .collect()
}

/// Rank `(customer, value)` pairs ascending and map each to a bucket.
/// Higher values receive higher buckets.
fn assign_buckets(mut entries: Vec<(&str, f64)>, bucket_count: Score) -> BTreeMap<&str, Score> {
    let mut out = BTreeMap::new();
    let n = entries.len();
    if n == 0 {
        return out;
    }

    entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let k = usize::from(bucket_count);
    let same = |a: f64, b: f64| a.total_cmp(&b) == Ordering::Equal;

    if same(entries[0].1, entries[n - 1].1) {
        for (id, _) in entries {
            out.insert(id, bucket_count);
        }
        return out;
    }

    let mut i = 0;
    while i < n {
        // The bucket of the first member of a tie group applies to all of it.
        let bucket = (i * k / n + 1) as Score;
        let group_value = entries[i].1;
        while i < n && same(entries[i].1, group_value) {
            out.insert(entries[i].0, bucket);
            i += 1;
        }
    }
    out
}
