//! Notification events: what the scheduler hands to the notifier.
//!
//! Variants are only ever added, never removed or reordered: delivered
//! events are journaled as JSON and must stay readable.

use crate::{
    tam::TamStatus,
    types::{CustomerId, Days, Namespace},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    /// The customer moved into At Risk since the last recorded status.
    AtRiskEntered {
        previous_status: Option<TamStatus>,
        recency_days:    Days,
    },
    /// The customer is still At Risk and the cool-down has elapsed.
    AtRiskReminder {
        recency_days:          Days,
        days_since_last_alert: Days,
    },
    /// The customer reached the VIP segment for the first time.
    VipPromoted {
        segment: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub namespace:     Namespace,
    pub customer_id:   CustomerId,
    pub customer_name: String,
    pub raised_at:     DateTime<Utc>,
    pub alert:         Alert,
}

impl NotificationEvent {
    /// Stable name of the alert variant, used for the journal's type column.
    pub fn alert_type(&self) -> &'static str {
        match self.alert {
            Alert::AtRiskEntered { .. }  => "at_risk_entered",
            Alert::AtRiskReminder { .. } => "at_risk_reminder",
            Alert::VipPromoted { .. }    => "vip_promoted",
        }
    }

    /// One alert per customer, alert family and calendar day.
    /// Entered and reminder share the at-risk family.
    pub fn dedupe_key(&self) -> String {
        let family = match self.alert {
            Alert::AtRiskEntered { .. } | Alert::AtRiskReminder { .. } => "at_risk",
            Alert::VipPromoted { .. } => "vip",
        };
        format!("{}:{}:{}", self.customer_id, family, self.raised_at.date_naive())
    }

    pub fn is_at_risk(&self) -> bool {
        matches!(
            self.alert,
            Alert::AtRiskEntered { .. } | Alert::AtRiskReminder { .. }
        )
    }

    /// Human-readable text for chat delivery.
    pub fn message(&self) -> String {
        let who = if self.customer_name.is_empty() {
            self.customer_id.as_str()
        } else {
            self.customer_name.as_str()
        };
        match &self.alert {
            Alert::AtRiskEntered { recency_days, .. } => format!(
                "{who} has not purchased for {recency_days} days and is now at risk. \
                 A reminder or a limited offer may bring them back."
            ),
            Alert::AtRiskReminder { recency_days, .. } => format!(
                "{who} is still at risk ({recency_days} days since the last purchase)."
            ),
            Alert::VipPromoted { segment } => format!(
                "{who} has joined the {segment} segment. Look after your most valuable customers."
            ),
        }
    }
}
