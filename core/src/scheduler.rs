//! Notification scheduler: periodic sweeps with a deduplicated ledger.
//!
//! SWEEP ORDER (per namespace, under the namespace lock):
//!   1. Read the clock; today is the reference date.
//!   2. Load the dataset and run the analysis facade.
//!   3. Load the ledger and plan steps (pure).
//!   4. For each step, in order: claim it in the ledger (with retries),
//!      deliver its event (if any), then confirm the delivery or release
//!      the claim.
//!
//! RULES:
//!   - One sweep or upload per namespace at a time. A sweep that finds the
//!     namespace busy is skipped, never queued behind it.
//!   - The ledger claim is the serialization point. An event is only
//!     delivered by the sweeper that won the claim.
//!   - The ledger never keeps a claim for an event that was not delivered.
//!   - A customer whose step failed gets no further steps this sweep.

use crate::{
    analysis::compute_analysis,
    clock::Clock,
    config::ValidatedConfig,
    contract::{DatasetSource, LedgerRepository, Notifier},
    error::{EngineError, EngineResult},
    event::NotificationEvent,
    notify::{plan_notifications, LedgerStep},
    types::{CustomerId, Namespace},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// One mutex per namespace. Different namespaces never contend.
///
/// The mutexes guard no data, so a panic while one is held leaves nothing
/// inconsistent and poisoning is ignored.
#[derive(Debug, Default)]
pub struct NamespaceLocks {
    locks: Mutex<HashMap<Namespace, Arc<Mutex<()>>>>,
}

impl NamespaceLocks {
    pub fn handle(&self, namespace: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(namespace.to_string()).or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub customer_id: CustomerId,
    pub error:       String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id:       String,
    pub namespace:      Namespace,
    pub swept_at:       DateTime<Utc>,
    pub customers:      usize,
    /// Events that were delivered and recorded in the ledger.
    pub delivered:      Vec<NotificationEvent>,
    /// Ledger steps committed without an event (status changes only).
    pub status_updates: usize,
    pub failures:       Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(SweepReport),
    Skipped { namespace: Namespace },
    Failed { namespace: Namespace, error: String },
}

pub struct NotificationScheduler {
    config:   ValidatedConfig,
    source:   Arc<dyn DatasetSource>,
    ledger:   Arc<dyn LedgerRepository>,
    notifier: Arc<dyn Notifier>,
    clock:    Arc<dyn Clock>,
    locks:    NamespaceLocks,
}

impl NotificationScheduler {
    pub fn new(
        config: ValidatedConfig,
        source: Arc<dyn DatasetSource>,
        ledger: Arc<dyn LedgerRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            ledger,
            notifier,
            clock,
            locks: NamespaceLocks::default(),
        }
    }

    /// Run `f` while holding the namespace lock, waiting for any sweep in
    /// progress. Dataset uploads go through here.
    pub fn with_upload_lock<T>(
        &self,
        namespace: &str,
        f: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let handle = self.locks.handle(namespace);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Sweep every namespace the dataset source knows about.
    pub fn run_all(&self) -> EngineResult<Vec<SweepOutcome>> {
        let namespaces = self.source.namespaces()?;
        let outcomes = namespaces
            .into_iter()
            .map(|namespace| match self.run_sweep(&namespace) {
                Ok(report) => SweepOutcome::Completed(report),
                Err(EngineError::NamespaceBusy { namespace }) => {
                    log::warn!("{namespace}: sweep skipped, namespace busy");
                    SweepOutcome::Skipped { namespace }
                }
                Err(e) => {
                    log::error!("{namespace}: sweep failed: {e}");
                    SweepOutcome::Failed {
                        namespace,
                        error: e.to_string(),
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }

    /// One sweep of one namespace. Fails with `NamespaceBusy` instead of
    /// waiting when another sweep or upload holds the namespace.
    pub fn run_sweep(&self, namespace: &str) -> EngineResult<SweepReport> {
        let handle = self.locks.handle(namespace);
        let _guard = try_acquire(&handle, namespace)?;

        let now = self.clock.now();
        let sweep_id = uuid::Uuid::new_v4().to_string();

        let dataset = self.source.load_dataset(namespace)?;
        let analysis = compute_analysis(&dataset, Some(now.date_naive()), &self.config);
        let ledger = self.ledger.load_ledger(namespace)?;
        let plan = plan_notifications(namespace, &ledger, &analysis, now, &self.config.notifications);

        let mut report = SweepReport {
            sweep_id,
            namespace: namespace.to_string(),
            swept_at: now,
            customers: analysis.customers.len(),
            delivered: Vec::new(),
            status_updates: 0,
            failures: Vec::new(),
        };

        let mut blocked: Option<&str> = None;
        for step in &plan.steps {
            let customer_id = step.next.customer_id.as_str();
            if blocked == Some(customer_id) {
                continue;
            }
            if let Err(e) = self.apply_step(namespace, &report.sweep_id, step) {
                log::warn!("{namespace}: customer {customer_id}: {e}");
                report.failures.push(SweepFailure {
                    customer_id: customer_id.to_string(),
                    error:       e.to_string(),
                });
                blocked = Some(customer_id);
                continue;
            }
            match &step.event {
                Some(event) => report.delivered.push(event.clone()),
                None => report.status_updates += 1,
            }
        }

        log::info!(
            "{namespace}: sweep {}: {} customers, {} alerts, {} status updates, {} failures",
            report.sweep_id,
            report.customers,
            report.delivered.len(),
            report.status_updates,
            report.failures.len(),
        );
        Ok(report)
    }

    fn apply_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()> {
        let customer_id = step.next.customer_id.as_str();
        self.with_retries(namespace, customer_id, || {
            self.ledger.claim_step(namespace, sweep_id, step)
        })?;

        let Some(event) = &step.event else {
            return Ok(());
        };
        if let Err(e) = self.notifier.deliver(event) {
            let released = self.with_retries(namespace, customer_id, || {
                self.ledger.release_step(namespace, sweep_id, step)
            });
            if let Err(release) = released {
                log::error!("{namespace}: claim for {customer_id} not released: {release}");
            }
            return Err(e);
        }

        // Delivered and deduplicated either way; only the journal row stays pending.
        if let Err(e) = self.with_retries(namespace, customer_id, || {
            self.ledger.confirm_step(namespace, sweep_id, step)
        }) {
            log::warn!("{namespace}: alert for {customer_id} delivered but not journaled: {e}");
        }
        Ok(())
    }

    /// Run a ledger write, retrying storage errors. A conflict means
    /// another writer got there first and is never retried.
    fn with_retries(
        &self,
        namespace: &str,
        customer_id: &str,
        write: impl Fn() -> EngineResult<()>,
    ) -> EngineResult<()> {
        let attempts = self.config.notifications.persist_retries;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match write() {
                Ok(()) => return Ok(()),
                Err(e @ EngineError::LedgerConflict { .. }) => return Err(e),
                Err(e) => {
                    log::debug!(
                        "{namespace}: ledger write for {customer_id} failed (attempt {attempt}/{attempts}): {e}",
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(EngineError::LedgerPersistence {
            namespace:   namespace.to_string(),
            customer_id: customer_id.to_string(),
            attempts,
            reason:      last_error,
        })
    }

    /// Spawn the periodic sweep on the tokio runtime, using the configured interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.notifications.sweep_interval_secs);
        self.spawn_every(period)
    }

    /// Spawn the periodic sweep with an explicit period.
    ///
    /// Sweeps run on the blocking pool and the loop waits for each to
    /// finish; ticks missed meanwhile are skipped, not replayed.
    pub fn spawn_every(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let scheduler = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || scheduler.run_all()).await {
                    Ok(Ok(outcomes)) => {
                        let alerts: usize = outcomes
                            .iter()
                            .map(|o| match o {
                                SweepOutcome::Completed(r) => r.delivered.len(),
                                _ => 0,
                            })
                            .sum();
                        log::debug!("sweep tick: {} namespaces, {alerts} alerts", outcomes.len());
                    }
                    Ok(Err(e)) => log::error!("sweep tick failed: {e}"),
                    Err(e) => log::error!("sweep task panicked: {e}"),
                }
            }
        })
    }
}

fn try_acquire<'a>(handle: &'a Mutex<()>, namespace: &str) -> EngineResult<MutexGuard<'a, ()>> {
    match handle.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(EngineError::NamespaceBusy {
            namespace: namespace.to_string(),
        }),
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
    }
}
