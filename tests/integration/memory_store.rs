//! In-memory ledger store for integration testing.
//!
//! Provides a deterministic `LedgerStore` implementation that keeps
//! parties, expenses, settlements and categories in plain collections,
//! with no database involved.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use casa_split::storage::LedgerStore;
use casa_split::types::*;

#[derive(Default)]
struct Inner {
    parties: Vec<Party>,
    expenses: BTreeMap<i64, ExpenseRecord>,
    next_id: i64,
    settlements: BTreeMap<YearMonth, SettlementRecord>,
    categories: BTreeSet<String>,
    settlement_writes: usize,
}

/// All state is in-memory and inspectable from test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the two parties, A = #1, B = #2.
    pub fn with_parties(a: &str, b: &str) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().parties = vec![Party::new(1, a), Party::new(2, b)];
        store
    }

    /// Insert a raw record, bypassing validation (legacy or broken rows).
    pub fn insert_raw(&self, mut record: ExpenseRecord) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        record.id = inner.next_id;
        inner.expenses.insert(record.id, record);
        inner.next_id
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// How many times a settlement has been written.
    pub fn settlement_writes(&self) -> usize {
        self.inner.lock().unwrap().settlement_writes
    }

    pub fn expense_count(&self) -> usize {
        self.inner.lock().unwrap().expenses.len()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    fn to_record(id: i64, e: &StoredExpense) -> ExpenseRecord {
        ExpenseRecord {
            id,
            spent_at: e.spent_at,
            amount: from_cents(e.amount_cents),
            payer_id: e.payer_id,
            category: e.category.clone(),
            description: e.description.clone(),
            split_json: Some(e.split_json.clone()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn list_expenses_for_month(&self, month: YearMonth) -> Result<Vec<ExpenseRecord>> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<ExpenseRecord> = inner
            .expenses
            .values()
            .filter(|e| month.contains(e.spent_at))
            .cloned()
            .collect();
        found.sort_by(|x, y| y.spent_at.cmp(&x.spent_at).then(y.id.cmp(&x.id)));
        Ok(found)
    }

    async fn get_parties(&self) -> Result<(Party, Party)> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        match inner.parties.as_slice() {
            [a, b, ..] => Ok((a.clone(), b.clone())),
            other => Err(CasaError::PartiesNotConfigured(format!(
                "expected two parties, found {}",
                other.len()
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
        self.check_error()?;
        let record = SettlementRecord {
            month,
            from: debtor,
            to: creditor,
            amount_cents,
            paid_at: Some(Utc::now()),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.settlement_writes += 1;
        inner.settlements.insert(month, record.clone());
        Ok(record)
    }

    async fn get_settlement(&self, month: YearMonth) -> Result<Option<SettlementRecord>> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().settlements.get(&month).cloned())
    }

    async fn clear_settlement(&self, month: YearMonth) -> Result<bool> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().settlements.remove(&month).is_some())
    }

    async fn get_expense(&self, id: i64) -> Result<Option<ExpenseRecord>> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().expenses.get(&id).cloned())
    }

    async fn add_expense(&self, expense: &StoredExpense) -> Result<i64> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.expenses.insert(id, Self::to_record(id, expense));
        Ok(id)
    }

    async fn update_expense(&self, id: i64, expense: &StoredExpense) -> Result<bool> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.expenses.get_mut(&id) {
            Some(slot) => {
                *slot = Self::to_record(id, expense);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expense(&self, id: i64) -> Result<bool> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().expenses.remove(&id).is_some())
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().categories.iter().cloned().collect())
    }

    async fn add_category(&self, name: &str) -> Result<bool> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().categories.insert(name.to_string()))
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> Result<bool> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        for e in inner.expenses.values_mut().filter(|e| e.category == old_name) {
            e.category = new_name.to_string();
        }
        if inner.categories.remove(old_name) {
            inner.categories.insert(new_name.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_category(&self, name: &str) -> Result<bool> {
        self.check_error()?;
        Ok(self.inner.lock().unwrap().categories.remove(name))
    }

    async fn ensure_default_parties(&self, party_a_name: &str, party_b_name: &str) -> Result<()> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.parties.is_empty() {
            inner.parties = vec![Party::new(1, party_a_name), Party::new(2, party_b_name)];
        }
        Ok(())
    }

    async fn ensure_default_categories(&self, names: &[String]) -> Result<()> {
        self.check_error()?;
        self.inner
            .lock()
            .unwrap()
            .categories
            .extend(names.iter().cloned());
        Ok(())
    }
}
