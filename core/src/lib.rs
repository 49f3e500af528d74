//! Customer classification engine: RFM scoring, segments, TAM status and
//! deduplicated At-Risk notifications per business namespace.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod record;
pub mod scheduler;
pub mod scorer;
pub mod segment;
pub mod store;
pub mod tam;
pub mod types;

pub use analysis::{compute_analysis, Analysis};
pub use config::{EngineConfig, ValidatedConfig};
pub use error::{EngineError, EngineResult};
pub use scheduler::NotificationScheduler;
pub use store::NamespaceStore;
