//! TAM status classifier: recency bands to account status.
//!
//! Status is re-derived from scratch on every run; nothing here carries
//! state between runs. The five statuses partition the customer set.

use crate::{config::TamThresholds, metrics::RawMetrics, types::Days};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TamStatus {
    Active,
    #[serde(rename = "At Risk")]
    AtRisk,
    Inactive,
    Lost,
    #[serde(rename = "No Purchase")]
    NoPurchase,
}

impl TamStatus {
    /// Every status, in reporting order.
    pub const ALL: [TamStatus; 5] = [
        TamStatus::Active,
        TamStatus::AtRisk,
        TamStatus::Inactive,
        TamStatus::Lost,
        TamStatus::NoPurchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TamStatus::Active     => "Active",
            TamStatus::AtRisk     => "At Risk",
            TamStatus::Inactive   => "Inactive",
            TamStatus::Lost       => "Lost",
            TamStatus::NoPurchase => "No Purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for TamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status for a recency value. `None` means no qualifying purchase.
pub fn classify_recency(recency: Option<Days>, t: &TamThresholds) -> TamStatus {
    match recency {
        None                                    => TamStatus::NoPurchase,
        Some(days) if days <= t.active_max_days  => TamStatus::Active,
        Some(days) if days <= t.at_risk_max_days => TamStatus::AtRisk,
        Some(days) if days <= t.inactive_max_days => TamStatus::Inactive,
        Some(_)                                 => TamStatus::Lost,
    }
}

pub fn classify(metrics: &RawMetrics, t: &TamThresholds) -> TamStatus {
    classify_recency(metrics.recency, t)
}

/// Whether a Lost customer has also passed the outer retention horizon.
pub fn beyond_horizon(recency: Option<Days>, t: &TamThresholds) -> bool {
    recency.is_some_and(|days| days > t.lost_max_days)
}
