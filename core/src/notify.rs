//! Notification planning: the pure "what changed" half of a sweep.
//!
//! `plan_notifications` compares the current analysis against the ledger
//! and returns ordered ledger steps. Delivery and persistence happen
//! elsewhere; nothing in this module performs I/O.
//!
//! Alert rules:
//!   - At Risk, previous recorded status not At Risk  → AtRiskEntered
//!   - At Risk, previous recorded status At Risk      → AtRiskReminder
//!   - Both require `cooldown_days` whole days since the last at-risk alert.
//!   - VIP segment reached, never alerted before     → VipPromoted (once)
//!   - Any other status change                       → ledger update only

use crate::{
    analysis::{Analysis, CustomerAnalysis},
    config::NotificationConfig,
    event::{Alert, NotificationEvent},
    ledger::{Ledger, NotificationRecord},
    tam::TamStatus,
    types::Namespace,
};
use chrono::{DateTime, Utc};

/// One ledger transition, optionally carrying the alert that justifies it.
///
/// `previous` is the record the commit must find in place; a step is only
/// applied if every earlier step for the same customer was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStep {
    pub previous: Option<NotificationRecord>,
    pub next:     NotificationRecord,
    pub event:    Option<NotificationEvent>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepPlan {
    /// Ordered by customer id; steps for one customer are contiguous.
    pub steps: Vec<LedgerStep>,
}

impl SweepPlan {
    pub fn events(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.steps.iter().filter_map(|s| s.event.as_ref())
    }

    /// The ledger as it would be if every step were committed.
    pub fn apply(&self, ledger: &Ledger) -> Ledger {
        let mut updated = ledger.clone();
        for step in &self.steps {
            updated.upsert(step.next.clone());
        }
        updated
    }
}

pub fn plan_notifications(
    namespace: &str,
    ledger: &Ledger,
    analysis: &Analysis,
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> SweepPlan {
    let mut steps = Vec::new();
    for customer in &analysis.customers {
        plan_customer(namespace, ledger.get(&customer.customer_id), customer, now, config, &mut steps);
    }
    SweepPlan { steps }
}

/// Pure sweep: the updated ledger and every event it would emit.
pub fn run_notification_sweep(
    namespace: &str,
    previous: &Ledger,
    analysis: &Analysis,
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> (Ledger, Vec<NotificationEvent>) {
    let plan = plan_notifications(namespace, previous, analysis, now, config);
    let events = plan.events().cloned().collect();
    (plan.apply(previous), events)
}

fn plan_customer(
    namespace: &str,
    previous: Option<&NotificationRecord>,
    customer: &CustomerAnalysis,
    now: DateTime<Utc>,
    config: &NotificationConfig,
    steps: &mut Vec<LedgerStep>,
) {
    let mut current = previous.cloned();
    let mut next = previous
        .cloned()
        .unwrap_or_else(|| NotificationRecord::new(customer.customer_id.clone(), customer.status));
    next.last_status = customer.status;

    let mut status_pending = previous.map_or(true, |p| p.last_status != customer.status);

    if let Some(alert) = at_risk_alert(previous, customer, now, config) {
        next.last_alert_at = Some(now);
        steps.push(LedgerStep {
            previous: current.replace(next.clone()),
            next:     next.clone(),
            event:    Some(event(namespace, customer, now, alert)),
        });
        status_pending = false;
    }

    let vip_reached = match (&config.vip_segment, &customer.segment) {
        (Some(vip), Some(segment)) => vip == segment,
        _ => false,
    };
    if vip_reached && next.vip_alerted_at.is_none() {
        next.vip_alerted_at = Some(now);
        let alert = Alert::VipPromoted {
            segment: customer.segment.clone().unwrap_or_default(),
        };
        steps.push(LedgerStep {
            previous: current.replace(next.clone()),
            next:     next.clone(),
            event:    Some(event(namespace, customer, now, alert)),
        });
        status_pending = false;
    }

    if status_pending {
        steps.push(LedgerStep {
            previous: current,
            next,
            event:    None,
        });
    }
}

fn at_risk_alert(
    previous: Option<&NotificationRecord>,
    customer: &CustomerAnalysis,
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> Option<Alert> {
    if customer.status != TamStatus::AtRisk {
        return None;
    }

    let since_last = previous
        .and_then(|p| p.last_alert_at)
        .map(|at| (now - at).num_days());
    if since_last.is_some_and(|days| days < config.cooldown_days) {
        return None;
    }

    let recency_days = customer.raw.recency.unwrap_or_default();
    let was_at_risk = previous.is_some_and(|p| p.last_status == TamStatus::AtRisk);

    Some(match (was_at_risk, since_last) {
        (true, Some(days_since_last_alert)) => Alert::AtRiskReminder {
            recency_days,
            days_since_last_alert,
        },
        _ => Alert::AtRiskEntered {
            previous_status: previous.map(|p| p.last_status),
            recency_days,
        },
    })
}

fn event(
    namespace: &str,
    customer: &CustomerAnalysis,
    now: DateTime<Utc>,
    alert: Alert,
) -> NotificationEvent {
    NotificationEvent {
        namespace:     Namespace::from(namespace),
        customer_id:   customer.customer_id.clone(),
        customer_name: customer.name.clone(),
        raised_at:     now,
        alert,
    }
}
