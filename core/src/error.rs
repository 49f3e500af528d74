use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Namespace '{namespace}' not found")]
    NamespaceNotFound { namespace: String },

    #[error("Namespace '{namespace}' is busy with another sweep or upload")]
    NamespaceBusy { namespace: String },

    #[error("Ledger record for '{customer_id}' in '{namespace}' was advanced by another writer")]
    LedgerConflict { namespace: String, customer_id: String },

    #[error("Ledger update for '{customer_id}' in '{namespace}' failed after {attempts} attempts: {reason}")]
    LedgerPersistence {
        namespace:   String,
        customer_id: String,
        attempts:    u32,
        reason:      String,
    },

    #[error("Delivery to '{namespace}' for '{customer_id}' failed: {reason}")]
    Delivery {
        namespace:   String,
        customer_id: String,
        reason:      String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
