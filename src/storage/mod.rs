//! Persistence layer.
//!
//! Defines the `LedgerStore` trait the household service depends on, and a
//! SQLite implementation backed by `sqlx`. Amounts are stored as integer
//! cents; split weights as the raw JSON text they were written with.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ExpenseRecord, Party, PartyId, SettlementRecord, StoredExpense, YearMonth};

/// Categories seeded on first start and restored by a reset.
pub const DEFAULT_CATEGORIES: &[&str] = &["Outro", "Mercado", "Contas", "Transporte", "Casa", "Pets"];

/// Abstraction over the household's storage backend.
///
/// `get_parties` must return the two parties in a stable order: the first
/// one is party A for every summary computed from it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All expenses dated within the month, newest first.
    async fn list_expenses_for_month(&self, month: YearMonth) -> Result<Vec<ExpenseRecord>>;

    /// The two configured parties, party A first.
    async fn get_parties(&self) -> Result<(Party, Party)>;

    /// Upsert the settlement for a month.
    async fn record_settlement(
        &self,
        month: YearMonth,
        debtor: PartyId,
        creditor: PartyId,
        amount_cents: i64,
    ) -> Result<SettlementRecord>;

    async fn get_settlement(&self, month: YearMonth) -> Result<Option<SettlementRecord>>;

    /// Remove a month's settlement. Returns false if none was stored.
    async fn clear_settlement(&self, month: YearMonth) -> Result<bool>;

    async fn get_expense(&self, id: i64) -> Result<Option<ExpenseRecord>>;

    /// Insert an expense and return its id.
    async fn add_expense(&self, expense: &StoredExpense) -> Result<i64>;

    /// Returns false if no expense has this id.
    async fn update_expense(&self, id: i64, expense: &StoredExpense) -> Result<bool>;

    /// Returns false if no expense has this id.
    async fn delete_expense(&self, id: i64) -> Result<bool>;

    /// Category names in alphabetical order.
    async fn list_categories(&self) -> Result<Vec<String>>;

    /// Returns false if the category already existed.
    async fn add_category(&self, name: &str) -> Result<bool>;

    /// Rename a category and every expense filed under it.
    async fn rename_category(&self, old_name: &str, new_name: &str) -> Result<bool>;

    /// Expenses keep their category text; it just leaves the list.
    async fn delete_category(&self, name: &str) -> Result<bool>;

    /// Create both parties if no party exists yet.
    async fn ensure_default_parties(&self, party_a_name: &str, party_b_name: &str) -> Result<()>;

    /// Add any of the given categories that are missing.
    async fn ensure_default_categories(&self, names: &[String]) -> Result<()>;
}
