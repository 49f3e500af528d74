//! Validated ingestion records.
//!
//! These are the only shapes the engine consumes. Spreadsheet parsing and
//! row validation happen upstream; by the time a record reaches the engine
//! its dates are parsed and its fields are typed.

use crate::types::CustomerId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id:     CustomerId,
    pub name:            String,
    #[serde(default)]
    pub phone:           String,
    pub member_since:    Option<NaiveDate>,
    #[serde(default)]
    pub description:     String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id:    CustomerId,
    pub invoice_date:   NaiveDate,
    pub invoice_number: String,
    pub amount:         f64,
}

/// One namespace's customers and transactions, as handed over by ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub customers:    Vec<Customer>,
    pub transactions: Vec<Transaction>,
}

impl Dataset {
    pub fn new(customers: Vec<Customer>, transactions: Vec<Transaction>) -> Self {
        Self { customers, transactions }
    }

    /// Latest invoice date across all transactions, if any.
    pub fn latest_invoice_date(&self) -> Option<NaiveDate> {
        self.transactions.iter().map(|t| t.invoice_date).max()
    }
}

/// Why a transaction was dropped from an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    UnknownCustomer,
    InvalidAmount,
    DuplicateInvoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTransaction {
    pub transaction: Transaction,
    pub reason:      RejectionReason,
}
