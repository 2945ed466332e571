//! SQLite payment mirror.
//!
//! RULE: Only store.rs talks to the database.
//! The pipeline consumes plain RawPayment rows — it never executes SQL.
//!
//! The mirror holds the full payment history as exported from the
//! production database; each batch run reads it whole.

use crate::{category::CategorySet, error::RetentionResult, feed::RawPayment};
use rusqlite::{params, Connection};

pub struct PaymentStore {
    conn: Connection,
}

impl PaymentStore {
    /// Open (or create) the payment mirror at `path`.
    pub fn open(path: &str) -> RetentionResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better read performance while an import is running.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RetentionResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RetentionResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_payments.sql"))?;
        Ok(())
    }

    // ── Feed queries ───────────────────────────────────────────

    /// Successful recurring payments. Rows without a subscription are
    /// excluded here: a recurring payment always belongs to one.
    pub fn load_recurring(&self, recurring: &CategorySet) -> RetentionResult<Vec<RawPayment>> {
        self.load_where(recurring, true)
    }

    /// Successful payments across `categories`, recurring and one-time.
    pub fn load_all(&self, categories: &CategorySet) -> RetentionResult<Vec<RawPayment>> {
        self.load_where(categories, false)
    }

    fn load_where(
        &self,
        categories: &CategorySet,
        require_subscription: bool,
    ) -> RetentionResult<Vec<RawPayment>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        // rusqlite has no variadic IN binding; the codes come from config
        // and are plain integers, so splicing them is safe.
        let sql = format!(
            "SELECT supporter_id, payment_type_id, subscription_id, payment_date, amount
             FROM payment
             WHERE is_success = 1
               AND payment_type_id IN ({}){}
             ORDER BY id ASC",
            categories.sql_list(),
            if require_subscription {
                " AND subscription_id IS NOT NULL"
            } else {
                ""
            },
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawPayment {
                    supporter_id:    row.get(0)?,
                    payment_type:    row.get(1)?,
                    subscription_id: row.get(2)?,
                    payment_date:    row.get(3)?,
                    amount:          row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Import ─────────────────────────────────────────────────

    pub fn insert_payment(&self, row: &RawPayment, is_success: bool) -> RetentionResult<()> {
        self.conn.execute(
            "INSERT INTO payment
                 (supporter_id, payment_type_id, subscription_id, payment_date, amount, is_success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.supporter_id,
                row.payment_type,
                row.subscription_id,
                row.payment_date,
                row.amount,
                is_success as i64,
            ],
        )?;
        Ok(())
    }

    pub fn payment_count(&self) -> RetentionResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM payment", [], |row| row.get(0))?;
        Ok(count)
    }
}
