//! Notification ledger: the scheduler's only cross-run state.

use crate::{tam::TamStatus, types::CustomerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub customer_id:    CustomerId,
    pub last_status:    TamStatus,
    /// Last At-Risk alert (entered or reminder).
    pub last_alert_at:  Option<DateTime<Utc>>,
    pub vip_alerted_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn new(customer_id: impl Into<CustomerId>, last_status: TamStatus) -> Self {
        Self {
            customer_id: customer_id.into(),
            last_status,
            last_alert_at: None,
            vip_alerted_at: None,
        }
    }
}

/// Per-namespace ledger keyed by customer id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    records: BTreeMap<CustomerId, NotificationRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, customer_id: &str) -> Option<&NotificationRecord> {
        self.records.get(customer_id)
    }

    pub fn upsert(&mut self, record: NotificationRecord) {
        self.records.insert(record.customer_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<NotificationRecord> for Ledger {
    fn from_iter<I: IntoIterator<Item = NotificationRecord>>(iter: I) -> Self {
        let mut ledger = Ledger::new();
        for record in iter {
            ledger.upsert(record);
        }
        ledger
    }
}
