use super::NamespaceStore;
use crate::{
    contract::DatasetSource,
    error::{EngineError, EngineResult},
    record::{Customer, Dataset, Transaction},
    types::Namespace,
};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;

/// Counts from one dataset upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub customers:    usize,
    pub transactions: usize,
    /// Rows dropped at this boundary (unknown customer, bad amount, duplicate invoice).
    pub skipped:      usize,
    /// Ledger records removed because their customer is no longer in the dataset.
    pub pruned:       usize,
}

impl NamespaceStore {
    // ── Dataset ────────────────────────────────────────────────

    /// Replace a namespace's customers and transactions in one SQL transaction.
    /// Ledger records survive for customers still present and are pruned
    /// for customers the new dataset drops.
    pub fn replace_dataset(&self, namespace: &str, dataset: &Dataset) -> EngineResult<UploadSummary> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO namespace (namespace, uploaded_at) VALUES (?1, ?2)
             ON CONFLICT(namespace) DO UPDATE SET uploaded_at = excluded.uploaded_at",
            params![namespace, Utc::now()],
        )?;
        tx.execute("DELETE FROM transactions WHERE namespace = ?1", params![namespace])?;
        tx.execute("DELETE FROM customer WHERE namespace = ?1", params![namespace])?;

        let mut summary = UploadSummary::default();
        let mut known: HashSet<&str> = HashSet::new();
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO customer
                    (namespace, customer_id, name, phone, member_since, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for c in &dataset.customers {
                if !known.insert(c.customer_id.as_str()) {
                    log::warn!("{namespace}: duplicate customer {} skipped", c.customer_id);
                    continue;
                }
                insert.execute(params![
                    namespace,
                    c.customer_id,
                    c.name,
                    c.phone,
                    c.member_since,
                    c.description,
                ])?;
                summary.customers += 1;
            }
        }
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO transactions
                    (namespace, customer_id, invoice_date, invoice_number, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for t in &dataset.transactions {
                let valid_amount = t.amount.is_finite() && t.amount >= 0.0;
                let inserted = if known.contains(t.customer_id.as_str()) && valid_amount {
                    insert.execute(params![
                        namespace,
                        t.customer_id,
                        t.invoice_date,
                        t.invoice_number,
                        t.amount,
                    ])?
                } else {
                    0
                };
                if inserted == 0 {
                    log::warn!(
                        "{namespace}: transaction {} for {} skipped at upload",
                        t.invoice_number,
                        t.customer_id,
                    );
                    summary.skipped += 1;
                } else {
                    summary.transactions += 1;
                }
            }
        }

        summary.pruned = tx.execute(
            "DELETE FROM notification_record
             WHERE namespace = ?1
               AND customer_id NOT IN (SELECT customer_id FROM customer WHERE namespace = ?1)",
            params![namespace],
        )?;

        tx.commit()?;
        log::info!(
            "{namespace}: dataset replaced ({} customers, {} transactions, {} skipped, {} ledger records pruned)",
            summary.customers,
            summary.transactions,
            summary.skipped,
            summary.pruned,
        );
        Ok(summary)
    }

    pub fn customers(&self, namespace: &str) -> EngineResult<Vec<Customer>> {
        read_customers(&self.conn(), namespace)
    }

    pub fn transactions(&self, namespace: &str) -> EngineResult<Vec<Transaction>> {
        read_transactions(&self.conn(), namespace)
    }

    /// Customers and transactions read under one guard and one SQL
    /// transaction, so an upload can never land between the two reads.
    pub fn snapshot(&self, namespace: &str) -> EngineResult<Dataset> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let found: i64 = tx.query_row(
            "SELECT COUNT(*) FROM namespace WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        if found == 0 {
            return Err(EngineError::NamespaceNotFound {
                namespace: namespace.to_string(),
            });
        }

        let customers = read_customers(&tx, namespace)?;
        let transactions = read_transactions(&tx, namespace)?;
        tx.commit()?;
        Ok(Dataset::new(customers, transactions))
    }
}

fn read_customers(conn: &Connection, namespace: &str) -> EngineResult<Vec<Customer>> {
    let mut stmt = conn.prepare(
        "SELECT customer_id, name, phone, member_since, description
         FROM customer WHERE namespace = ?1
         ORDER BY customer_id ASC",
    )?;
    let rows = stmt.query_map(params![namespace], |row| {
        Ok(Customer {
            customer_id:  row.get(0)?,
            name:         row.get(1)?,
            phone:        row.get(2)?,
            member_since: row.get(3)?,
            description:  row.get(4)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn read_transactions(conn: &Connection, namespace: &str) -> EngineResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT customer_id, invoice_date, invoice_number, amount
         FROM transactions WHERE namespace = ?1
         ORDER BY customer_id ASC, invoice_date ASC, invoice_number ASC",
    )?;
    let rows = stmt.query_map(params![namespace], |row| {
        Ok(Transaction {
            customer_id:    row.get(0)?,
            invoice_date:   row.get(1)?,
            invoice_number: row.get(2)?,
            amount:         row.get(3)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl DatasetSource for NamespaceStore {
    fn namespaces(&self) -> EngineResult<Vec<Namespace>> {
        self.list_namespaces()
    }

    fn load_dataset(&self, namespace: &str) -> EngineResult<Dataset> {
        self.snapshot(namespace)
    }
}
