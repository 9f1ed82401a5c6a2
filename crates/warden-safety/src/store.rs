use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use warden_core::{ActionKind, WardenError};

use crate::ledger::Transaction;

/// Append-only persistent log of committed budget transactions.
///
/// One row per charge or refund; `spent` for a day key is the sum of its
/// rows, which is how the ledger reconstructs state after a restart.
pub struct LedgerStore {
    db: Mutex<Connection>,
}

impl LedgerStore {
    /// Open or create the transaction log at the given path.
    pub fn open(path: &Path) -> warden_core::Result<Self> {
        info!(?path, "opening ledger store");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| WardenError::Ledger(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS budget_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                requester_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount_usd REAL NOT NULL,
                day_key TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_day ON budget_transactions(day_key);
            ",
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Append one transaction. Never updates or deletes existing rows.
    pub fn append(&self, tx: &Transaction, day_key: NaiveDate) -> warden_core::Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO budget_transactions (timestamp, requester_id, kind, amount_usd, day_key)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                tx.timestamp.to_rfc3339(),
                tx.requester_id,
                tx.kind.as_str(),
                tx.amount_usd,
                day_key.format("%Y-%m-%d").to_string(),
            ],
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(())
    }

    /// All transactions recorded against a day key, in insertion order.
    pub fn load_day(&self, day_key: NaiveDate) -> warden_core::Result<Vec<Transaction>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT timestamp, requester_id, kind, amount_usd
                 FROM budget_transactions WHERE day_key = ?1 ORDER BY id",
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        let rows = stmt
            .query_map(
                rusqlite::params![day_key.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        let mut transactions = Vec::new();
        for row in rows {
            let (ts, requester_id, kind, amount_usd) =
                row.map_err(|e| WardenError::Ledger(e.to_string()))?;
            let timestamp = match DateTime::parse_from_rfc3339(&ts) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    warn!(error = %e, "skipping ledger row with bad timestamp");
                    continue;
                }
            };
            let kind = match ActionKind::from_str(&kind) {
                Ok(k) => k,
                Err(e) => {
                    warn!(error = %e, "skipping ledger row with unknown kind");
                    continue;
                }
            };
            transactions.push(Transaction {
                timestamp,
                requester_id,
                kind,
                amount_usd,
            });
        }
        Ok(transactions)
    }
}
