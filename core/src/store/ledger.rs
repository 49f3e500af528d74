use super::NamespaceStore;
use crate::{
    contract::LedgerRepository,
    error::{EngineError, EngineResult},
    event::NotificationEvent,
    ledger::{Ledger, NotificationRecord},
    notify::LedgerStep,
    tam::TamStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type};
use serde::{Deserialize, Serialize};

/// One journaled, delivered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id:       i64,
    pub sweep_id: String,
    pub sent_at:  DateTime<Utc>,
    pub seen:     bool,
    pub event:    NotificationEvent,
}

impl NamespaceStore {
    // ── Notification ledger ────────────────────────────────────

    pub fn ledger(&self, namespace: &str) -> EngineResult<Ledger> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT customer_id, last_status, last_alert_at, vip_alerted_at
             FROM notification_record WHERE namespace = ?1",
        )?;
        let rows = stmt.query_map(params![namespace], |row| {
            let status: String = row.get(1)?;
            let last_status = TamStatus::parse(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    Type::Text,
                    format!("unknown status '{status}'").into(),
                )
            })?;
            Ok(NotificationRecord {
                customer_id:    row.get(0)?,
                last_status,
                last_alert_at:  row.get(2)?,
                vip_alerted_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Ledger, _>>().map_err(Into::into)
    }

    /// Compare-and-set one ledger step and claim its event.
    ///
    /// The record moves from `step.previous` to `step.next` and the event is
    /// journaled as pending, in one SQL transaction. Once this returns, any
    /// other sweeper sees the advanced record or loses on the dedupe key.
    pub fn claim_ledger_step(
        &self,
        namespace: &str,
        sweep_id: &str,
        step: &LedgerStep,
    ) -> EngineResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let next = &step.next;

        let changed = match &step.previous {
            None => tx.execute(
                "INSERT INTO notification_record
                    (namespace, customer_id, last_status, last_alert_at, vip_alerted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(namespace, customer_id) DO NOTHING",
                params![
                    namespace,
                    next.customer_id,
                    next.last_status.as_str(),
                    next.last_alert_at,
                    next.vip_alerted_at,
                ],
            )?,
            Some(prev) => swap_record(&tx, namespace, prev, next)?,
        };
        if changed == 0 {
            // Dropping `tx` rolls back.
            return Err(conflict(namespace, &next.customer_id));
        }

        if let Some(event) = &step.event {
            let journaled = tx.execute(
                "INSERT INTO notification_log
                    (namespace, sweep_id, customer_id, alert_type, dedupe_key, payload, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(namespace, dedupe_key) DO NOTHING",
                params![
                    namespace,
                    sweep_id,
                    event.customer_id,
                    event.alert_type(),
                    event.dedupe_key(),
                    serde_json::to_string(event)?,
                    event.raised_at,
                ],
            )?;
            if journaled == 0 {
                return Err(conflict(namespace, &next.customer_id));
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Mark a claimed event as delivered so it shows in the journal.
    pub fn confirm_ledger_step(
        &self,
        namespace: &str,
        sweep_id: &str,
        step: &LedgerStep,
    ) -> EngineResult<()> {
        let Some(event) = &step.event else {
            return Ok(());
        };
        let changed = self.conn().execute(
            "UPDATE notification_log SET delivered = 1
             WHERE namespace = ?1 AND dedupe_key = ?2 AND sweep_id = ?3",
            params![namespace, event.dedupe_key(), sweep_id],
        )?;
        if changed == 0 {
            return Err(conflict(namespace, &step.next.customer_id));
        }
        Ok(())
    }

    /// Undo a claim whose event was not delivered: restore `step.previous`
    /// and drop the pending journal row.
    pub fn release_ledger_step(
        &self,
        namespace: &str,
        sweep_id: &str,
        step: &LedgerStep,
    ) -> EngineResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let next = &step.next;

        let changed = match &step.previous {
            None => tx.execute(
                "DELETE FROM notification_record
                 WHERE namespace = ?1 AND customer_id = ?2
                   AND last_status = ?3
                   AND last_alert_at IS ?4
                   AND vip_alerted_at IS ?5",
                params![
                    namespace,
                    next.customer_id,
                    next.last_status.as_str(),
                    next.last_alert_at,
                    next.vip_alerted_at,
                ],
            )?,
            Some(prev) => swap_record(&tx, namespace, next, prev)?,
        };
        if changed == 0 {
            return Err(conflict(namespace, &next.customer_id));
        }

        if let Some(event) = &step.event {
            tx.execute(
                "DELETE FROM notification_log
                 WHERE namespace = ?1 AND dedupe_key = ?2 AND sweep_id = ?3 AND delivered = 0",
                params![namespace, event.dedupe_key(), sweep_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ── Notification journal ───────────────────────────────────

    pub fn notification_log(&self, namespace: &str) -> EngineResult<Vec<JournalEntry>> {
        self.journal(namespace, false)
    }

    pub fn unseen_notifications(&self, namespace: &str) -> EngineResult<Vec<JournalEntry>> {
        self.journal(namespace, true)
    }

    /// Mark every delivered notification as seen. Returns how many changed.
    pub fn mark_notifications_seen(&self, namespace: &str) -> EngineResult<usize> {
        let changed = self.conn().execute(
            "UPDATE notification_log SET seen = 1
             WHERE namespace = ?1 AND delivered = 1 AND seen = 0",
            params![namespace],
        )?;
        Ok(changed)
    }

    fn journal(&self, namespace: &str, unseen_only: bool) -> EngineResult<Vec<JournalEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, sweep_id, sent_at, seen, payload
             FROM notification_log
             WHERE namespace = ?1 AND delivered = 1 AND (?2 = 0 OR seen = 0)
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![namespace, unseen_only], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, DateTime<Utc>>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, sweep_id, sent_at, seen, payload) = row?;
            entries.push(JournalEntry {
                id,
                sweep_id,
                sent_at,
                seen,
                event: serde_json::from_str(&payload)?,
            });
        }
        Ok(entries)
    }
}

/// Move a stored record from `from` to `to`. Returns 0 when the stored
/// record no longer equals `from`.
fn swap_record(
    tx: &rusqlite::Transaction<'_>,
    namespace: &str,
    from: &NotificationRecord,
    to: &NotificationRecord,
) -> rusqlite::Result<usize> {
    tx.execute(
        "UPDATE notification_record
         SET last_status = ?3, last_alert_at = ?4, vip_alerted_at = ?5
         WHERE namespace = ?1 AND customer_id = ?2
           AND last_status = ?6
           AND last_alert_at IS ?7
           AND vip_alerted_at IS ?8",
        params![
            namespace,
            to.customer_id,
            to.last_status.as_str(),
            to.last_alert_at,
            to.vip_alerted_at,
            from.last_status.as_str(),
            from.last_alert_at,
            from.vip_alerted_at,
        ],
    )
}

fn conflict(namespace: &str, customer_id: &str) -> EngineError {
    EngineError::LedgerConflict {
        namespace:   namespace.to_string(),
        customer_id: customer_id.to_string(),
    }
}

impl LedgerRepository for NamespaceStore {
    fn load_ledger(&self, namespace: &str) -> EngineResult<Ledger> {
        self.ledger(namespace)
    }

    fn claim_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()> {
        self.claim_ledger_step(namespace, sweep_id, step)
    }

    fn confirm_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()> {
        self.confirm_ledger_step(namespace, sweep_id, step)
    }

    fn release_step(&self, namespace: &str, sweep_id: &str, step: &LedgerStep) -> EngineResult<()> {
        self.release_ledger_step(namespace, sweep_id, step)
    }
}
