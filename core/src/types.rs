//! Shared primitive types used across the engine.

/// Whole days elapsed between two calendar dates.
pub type Days = i64;

/// A stable, unique customer identifier within one namespace.
pub type CustomerId = String;

/// The isolated per-business dataset and ledger scope.
pub type Namespace = String;

/// An ordinal RFM score in `1..=K`.
pub type Score = u8;
