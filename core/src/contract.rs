//! Collaborator contracts.
//!
//! RULE: the scheduler reaches datasets, the ledger and delivery only
//! through these traits. `NamespaceStore` implements the first two; the
//! notifier lives with whoever owns the chat channel.

use crate::{
    error::EngineResult,
    event::NotificationEvent,
    ledger::Ledger,
    notify::LedgerStep,
    record::Dataset,
    types::Namespace,
};

pub trait DatasetSource: Send + Sync {
    /// Every namespace that has an uploaded dataset.
    fn namespaces(&self) -> EngineResult<Vec<Namespace>>;

    /// The namespace's validated customers and transactions.
    fn load_dataset(&self, namespace: &str) -> EngineResult<Dataset>;
}

pub trait LedgerRepository: Send + Sync {
    fn load_ledger(&self, namespace: &str) -> EngineResult<Ledger>;

    /// Apply one ledger step atomically and claim its event, before delivery.
    ///
    /// The stored record must still equal `step.previous`; otherwise the
    /// call fails with `EngineError::LedgerConflict` and nothing is written.
    /// A step carrying an event journals it as pending in the same write,
    /// so a concurrent sweeper can never claim the same alert.
    fn claim_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()>;

    /// The claimed event was delivered.
    fn confirm_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()>;

    /// The claimed event was not delivered: put `step.previous` back.
    fn release_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()>;
}

pub trait Notifier: Send + Sync {
    /// Hand one event to the delivery channel. An error means the event
    /// was not delivered and the ledger must not advance.
    fn deliver(&self, event: &NotificationEvent) -> EngineResult<()>;
}
