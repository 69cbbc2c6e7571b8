//! Ledger: the household service.
//!
//! Fetches a month's snapshot from the store, runs the settlement engine on
//! it, validates writes before they reach storage, and records closings.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::settlement::{compute_month_summary, expense_shares};
use crate::storage::{LedgerStore, DEFAULT_CATEGORIES};
use crate::types::{
    from_cents, CasaError, ExpenseRecord, MonthSummary, NewExpense, Party, SettlementRecord,
    StoredExpense, YearMonth,
};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// An expense with each party's share, for the month detail listing.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseLine {
    #[serde(flatten)]
    pub expense: ExpenseRecord,
    /// `None` when the payer is neither party.
    pub payer_name: Option<String>,
    pub share_a: f64,
    pub share_b: f64,
}

/// Everything the month screen shows.
#[derive(Debug, Clone, Serialize)]
pub struct MonthReport {
    pub month: YearMonth,
    pub party_a: Party,
    pub party_b: Party,
    pub summary: MonthSummary,
    pub expenses: Vec<ExpenseLine>,
    pub settlement: Option<SettlementRecord>,
}

/// Result of closing a month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloseOutcome {
    Recorded(SettlementRecord),
    NothingToSettle,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    default_categories: Vec<String>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            default_categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Override the categories restored by [`Ledger::reset_categories`].
    pub fn with_default_categories(mut self, categories: Vec<String>) -> Self {
        self.default_categories = categories;
        self
    }

    /// Seed the parties and default categories on an empty store.
    pub async fn bootstrap(&self, party_a_name: &str, party_b_name: &str) -> Result<(Party, Party)> {
        self.store.ensure_default_parties(party_a_name, party_b_name).await?;
        self.store.ensure_default_categories(&self.default_categories).await?;
        self.parties().await
    }

    /// The two parties, party A first.
    pub async fn parties(&self) -> Result<(Party, Party)> {
        let (a, b) = self.store.get_parties().await?;
        if a.id == b.id {
            return Err(CasaError::PartiesNotConfigured(format!(
                "both parties share id #{}",
                a.id
            ))
            .into());
        }
        Ok((a, b))
    }

    // -- Reading -------------------------------------------------------------

    async fn snapshot(&self, month: YearMonth) -> Result<(Party, Party, Vec<ExpenseRecord>)> {
        let ((a, b), expenses) =
            tokio::try_join!(self.parties(), self.store.list_expenses_for_month(month))?;
        Ok((a, b, expenses))
    }

    pub async fn month_summary(&self, month: YearMonth) -> Result<MonthSummary> {
        let (a, b, expenses) = self.snapshot(month).await?;
        let summary = compute_month_summary(&expenses, &a, &b);

        info!(
            %month,
            expenses = expenses.len(),
            total = format!("R$ {:.2}", summary.total),
            bal_a = format!("{:.2}", summary.bal_a),
            bal_b = format!("{:.2}", summary.bal_b),
            "Month summarised"
        );
        Ok(summary)
    }

    pub async fn month_report(&self, month: YearMonth) -> Result<MonthReport> {
        let (a, b, expenses) = self.snapshot(month).await?;
        let summary = compute_month_summary(&expenses, &a, &b);
        let settlement = self.store.get_settlement(month).await?;

        let lines = expenses
            .into_iter()
            .map(|expense| {
                let (share_a, share_b) = expense_shares(&expense, &a, &b);
                let payer_name = [&a, &b]
                    .into_iter()
                    .find(|p| p.id == expense.payer_id)
                    .map(|p| p.name.clone());
                ExpenseLine { expense, payer_name, share_a, share_b }
            })
            .collect();

        Ok(MonthReport {
            month,
            party_a: a,
            party_b: b,
            summary,
            expenses: lines,
            settlement,
        })
    }

    pub async fn settlement(&self, month: YearMonth) -> Result<Option<SettlementRecord>> {
        self.store.get_settlement(month).await
    }

    /// A single expense, for the edit form.
    pub async fn expense(&self, id: i64) -> Result<ExpenseRecord> {
        self.store
            .get_expense(id)
            .await?
            .ok_or_else(|| CasaError::ExpenseNotFound(id).into())
    }

    // -- Closing -------------------------------------------------------------

    /// Record the month's transfer. Re-closing an unchanged month stores
    /// the same settlement again.
    pub async fn close_month(&self, month: YearMonth) -> Result<CloseOutcome> {
        let summary = self.month_summary(month).await?;
        let transfer = summary.settlement;
        let cents = transfer.amount_cents();

        if cents <= 0 {
            // A month edited back into balance drops its earlier transfer.
            if self.store.clear_settlement(month).await? {
                info!(%month, "Previous settlement cleared");
            }
            info!(%month, "Nothing to settle");
            return Ok(CloseOutcome::NothingToSettle);
        }

        let record = self
            .store
            .record_settlement(month, transfer.from, transfer.to, cents)
            .await?;

        info!(%month, %transfer, amount = format!("R$ {:.2}", record.amount()), "Month closed");
        Ok(CloseOutcome::Recorded(record))
    }

    // -- Writing -------------------------------------------------------------

    /// Check a write against the two parties and serialise its split.
    fn validate(&self, input: &NewExpense, a: &Party, b: &Party) -> Result<StoredExpense> {
        if input.amount_cents <= 0 {
            return Err(CasaError::InvalidAmount(format!(
                "{:.2} must be greater than zero",
                from_cents(input.amount_cents)
            ))
            .into());
        }
        if input.payer_id != a.id && input.payer_id != b.id {
            return Err(CasaError::UnknownPayer(input.payer_id).into());
        }
        if !input.split_a.is_finite() || !(0.0..=1.0).contains(&input.split_a) {
            return Err(CasaError::InvalidSplit(input.split_a).into());
        }

        let category = input.category.trim();
        if category.is_empty() {
            return Err(CasaError::InvalidCategory("category is empty".into()).into());
        }
        let description = match input.description.trim() {
            "" => category,
            d => d,
        };

        let mut weights = serde_json::Map::new();
        weights.insert(a.id.key(), input.split_a.into());
        weights.insert(b.id.key(), (1.0 - input.split_a).into());

        Ok(StoredExpense {
            amount_cents: input.amount_cents,
            payer_id: input.payer_id,
            category: category.to_string(),
            description: description.to_string(),
            spent_at: input.spent_at,
            split_json: serde_json::Value::Object(weights).to_string(),
        })
    }

    fn to_record(id: i64, stored: StoredExpense) -> ExpenseRecord {
        ExpenseRecord {
            id,
            spent_at: stored.spent_at,
            amount: from_cents(stored.amount_cents),
            payer_id: stored.payer_id,
            category: stored.category,
            description: stored.description,
            split_json: Some(stored.split_json),
        }
    }

    pub async fn add_expense(&self, input: &NewExpense) -> Result<ExpenseRecord> {
        let (a, b) = self.parties().await?;
        let stored = self.validate(input, &a, &b)?;

        if self.store.add_category(&stored.category).await? {
            debug!(category = %stored.category, "New category registered");
        }
        let id = self.store.add_expense(&stored).await?;

        let record = Self::to_record(id, stored);
        info!(expense = %record, "Expense added");
        Ok(record)
    }

    pub async fn update_expense(&self, id: i64, input: &NewExpense) -> Result<ExpenseRecord> {
        let (a, b) = self.parties().await?;
        let stored = self.validate(input, &a, &b)?;

        self.store.add_category(&stored.category).await?;
        if !self.store.update_expense(id, &stored).await? {
            return Err(CasaError::ExpenseNotFound(id).into());
        }

        info!(id, "Expense updated");
        Ok(Self::to_record(id, stored))
    }

    pub async fn delete_expense(&self, id: i64) -> Result<()> {
        if !self.store.delete_expense(id).await? {
            return Err(CasaError::ExpenseNotFound(id).into());
        }
        info!(id, "Expense deleted");
        Ok(())
    }

    // -- Categories ----------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.store.list_categories().await
    }

    /// Returns false if the category already existed.
    pub async fn add_category(&self, name: &str) -> Result<bool> {
        let name = non_empty(name)?;
        self.store.add_category(name).await
    }

    pub async fn rename_category(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let new_name = non_empty(new_name)?;
        if new_name == old_name {
            return Ok(false);
        }
        let renamed = self.store.rename_category(old_name, new_name).await?;
        if renamed {
            info!(from = old_name, to = new_name, "Category renamed");
        }
        Ok(renamed)
    }

    pub async fn delete_category(&self, name: &str) -> Result<bool> {
        self.store.delete_category(name).await
    }

    /// Re-add any missing default category.
    pub async fn reset_categories(&self) -> Result<Vec<String>> {
        self.store.ensure_default_categories(&self.default_categories).await?;
        self.store.list_categories().await
    }
}

fn non_empty(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CasaError::InvalidCategory("category is empty".into()).into());
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
