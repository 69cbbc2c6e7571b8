//! SQLite-backed `LedgerStore`.
//!
//! Tables: `users`, `expenses` (integer cents, raw split JSON),
//! `settlements` (one row per month, upserted) and `categories`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::LedgerStore;
use crate::types::{
    from_cents, CasaError, ExpenseRecord, Party, PartyId, SettlementRecord, StoredExpense,
    YearMonth,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        spent_at TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        payer_user_id INTEGER NOT NULL REFERENCES users(id),
        category TEXT NOT NULL,
        description TEXT,
        split_json TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_expenses_spent_at ON expenses(spent_at)",
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        month TEXT NOT NULL UNIQUE,
        from_user_id INTEGER NOT NULL REFERENCES users(id),
        to_user_id INTEGER NOT NULL REFERENCES users(id),
        amount_cents INTEGER NOT NULL,
        paid_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
];

const EXPENSE_COLUMNS: &str =
    "id, spent_at, amount_cents, payer_user_id, category, description, split_json";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid SQLite URL: {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {database_url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, in_memory, "SQLite store ready");
        Ok(store)
    }

    /// Fresh private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        debug!(statements = SCHEMA.len(), "Schema applied");
        Ok(())
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid stored date: {raw}"))
}

fn expense_from_row(row: &SqliteRow) -> Result<ExpenseRecord> {
    let spent_at: String = row.try_get("spent_at")?;
    let amount_cents: i64 = row.try_get("amount_cents")?;
    let description: Option<String> = row.try_get("description")?;

    Ok(ExpenseRecord {
        id: row.try_get("id")?,
        spent_at: parse_date(&spent_at)?,
        amount: from_cents(amount_cents),
        payer_id: PartyId(row.try_get("payer_user_id")?),
        category: row.try_get("category")?,
        description: description.unwrap_or_default(),
        split_json: row.try_get("split_json")?,
    })
}

fn settlement_from_row(row: &SqliteRow) -> Result<SettlementRecord> {
    let month: String = row.try_get("month")?;
    let paid_at: Option<String> = row.try_get("paid_at")?;
    let paid_at = paid_at
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Invalid stored timestamp: {raw}"))
        })
        .transpose()?;

    Ok(SettlementRecord {
        month: month.parse()?,
        from: PartyId(row.try_get("from_user_id")?),
        to: PartyId(row.try_get("to_user_id")?),
        amount_cents: row.try_get("amount_cents")?,
        paid_at,
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn list_expenses_for_month(&self, month: YearMonth) -> Result<Vec<ExpenseRecord>> {
        let (start, end) = month.bounds();
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses \
             WHERE spent_at >= ? AND spent_at < ? \
             ORDER BY spent_at DESC, id DESC"
        ))
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list expenses for {month}"))?;

        let expenses = rows.iter().map(expense_from_row).collect::<Result<Vec<_>>>()?;
        debug!(%month, count = expenses.len(), "Expenses loaded");
        Ok(expenses)
    }

    async fn get_parties(&self) -> Result<(Party, Party)> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load parties")?;

        if rows.len() > 2 {
            warn!(count = rows.len(), "More than two parties stored, using the first two");
        }

        let mut parties = rows.into_iter().map(|(id, name)| Party::new(id, name));
        match (parties.next(), parties.next()) {
            (Some(a), Some(b)) => Ok((a, b)),
            (found, _) => Err(CasaError::PartiesNotConfigured(format!(
                "expected two parties, found {}",
                usize::from(found.is_some())
            ))
            .into()),
        }
    }

    async fn record_settlement(
        &self,
        month: YearMonth,
        debtor: PartyId,
        creditor: PartyId,
        amount_cents: i64,
    ) -> Result<SettlementRecord> {
        let paid_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO settlements (month, from_user_id, to_user_id, amount_cents, paid_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (month) DO UPDATE SET
                from_user_id = excluded.from_user_id,
                to_user_id = excluded.to_user_id,
                amount_cents = excluded.amount_cents,
                paid_at = excluded.paid_at
            "#,
        )
        .bind(month.to_string())
        .bind(debtor.0)
        .bind(creditor.0)
        .bind(amount_cents)
        .bind(paid_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record settlement for {month}"))?;

        Ok(SettlementRecord {
            month,
            from: debtor,
            to: creditor,
            amount_cents,
            paid_at: Some(paid_at),
        })
    }

    async fn get_settlement(&self, month: YearMonth) -> Result<Option<SettlementRecord>> {
        let row = sqlx::query(
            "SELECT month, from_user_id, to_user_id, amount_cents, paid_at \
             FROM settlements WHERE month = ?",
        )
        .bind(month.to_string())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load settlement for {month}"))?;

        row.as_ref().map(settlement_from_row).transpose()
    }

    async fn clear_settlement(&self, month: YearMonth) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settlements WHERE month = ?")
            .bind(month.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear settlement for {month}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_expense(&self, id: i64) -> Result<Option<ExpenseRecord>> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load expense #{id}"))?;

        row.as_ref().map(expense_from_row).transpose()
    }

    async fn add_expense(&self, expense: &StoredExpense) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO expenses
                (created_at, spent_at, amount_cents, payer_user_id, category, description, split_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(expense.spent_at.to_string())
        .bind(expense.amount_cents)
        .bind(expense.payer_id.0)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(&expense.split_json)
        .execute(&self.pool)
        .await
        .context("Failed to insert expense")?;

        Ok(result.last_insert_rowid())
    }

    async fn update_expense(&self, id: i64, expense: &StoredExpense) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE expenses
            SET amount_cents = ?, payer_user_id = ?, category = ?, description = ?,
                spent_at = ?, split_json = ?
            WHERE id = ?
            "#,
        )
        .bind(expense.amount_cents)
        .bind(expense.payer_id.0)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.spent_at.to_string())
        .bind(&expense.split_json)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update expense #{id}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expense(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete expense #{id}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM categories ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")
    }

    async fn add_category(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to add category {name}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("UPDATE expenses SET category = ? WHERE category = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&mut *tx)
            .await
            .context("Failed to re-file expenses")?;

        let result = sqlx::query("UPDATE categories SET name = ? WHERE name = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to rename category {old_name} to {new_name}"))?;

        tx.commit().await.context("Failed to commit category rename")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete category {name}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn ensure_default_parties(&self, party_a_name: &str, party_b_name: &str) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count parties")?;

        if count > 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for name in [party_a_name, party_b_name] {
            sqlx::query("INSERT INTO users (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to create party {name}"))?;
        }
        tx.commit().await.context("Failed to commit default parties")?;

        info!(party_a = party_a_name, party_b = party_b_name, "Default parties created");
        Ok(())
    }

    async fn ensure_default_categories(&self, names: &[String]) -> Result<()> {
        let mut added = 0;
        for name in names {
            if self.add_category(name).await? {
                added += 1;
            }
        }
        if added > 0 {
            info!(added, "Default categories seeded");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
