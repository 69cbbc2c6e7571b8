//! Month lifecycle: record expenses, summarise, close, re-close.

use chrono::NaiveDate;
use std::sync::Arc;

use casa_split::engine::ledger::{CloseOutcome, Ledger};
use casa_split::quick_entry::QuickEntryParser;
use casa_split::types::*;

use crate::memory_store::MemoryStore;

const A: PartyId = PartyId(1);
const B: PartyId = PartyId(2);

fn march() -> YearMonth {
    YearMonth::new(2025, 3).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn expense(cents: i64, payer: PartyId, split_a: f64, spent_at: NaiveDate) -> NewExpense {
    NewExpense {
        amount_cents: cents,
        payer_id: payer,
        category: "Mercado".into(),
        description: String::new(),
        spent_at,
        split_a,
    }
}

fn household() -> (MemoryStore, Ledger) {
    let store = MemoryStore::with_parties("Thiago", "Marina");
    let ledger = Ledger::new(Arc::new(store.clone()));
    (store, ledger)
}

fn close_enough(x: f64, y: f64) -> bool {
    (x - y).abs() < 1e-9
}

#[tokio::test]
async fn test_close_month_then_reclose_is_idempotent() {
    let (store, ledger) = household();
    ledger.add_expense(&expense(20000, A, 0.6, date(2025, 3, 3))).await.unwrap();
    ledger.add_expense(&expense(10000, B, 0.6, date(2025, 3, 18))).await.unwrap();

    let summary = ledger.month_summary(march()).await.unwrap();
    assert!(close_enough(summary.quota_a, 180.0));
    assert!(close_enough(summary.quota_b, 120.0));
    assert!(close_enough(summary.bal_a, 20.0));
    assert_eq!(summary.bal_a, -summary.bal_b);

    let first = match ledger.close_month(march()).await.unwrap() {
        CloseOutcome::Recorded(r) => r,
        other => panic!("expected a settlement, got {other:?}"),
    };
    assert_eq!((first.from, first.to, first.amount_cents), (B, A, 2000));

    let second = match ledger.close_month(march()).await.unwrap() {
        CloseOutcome::Recorded(r) => r,
        other => panic!("expected a settlement, got {other:?}"),
    };
    assert_eq!(
        (second.from, second.to, second.amount_cents),
        (first.from, first.to, first.amount_cents)
    );
    assert_eq!(store.settlement_writes(), 2);

    let stored = ledger.settlement(march()).await.unwrap().unwrap();
    assert_eq!(stored.amount_cents, 2000);
}

#[tokio::test]
async fn test_reclose_after_change_overwrites() {
    let (_store, ledger) = household();
    let first = ledger.add_expense(&expense(10000, A, 0.5, date(2025, 3, 1))).await.unwrap();
    ledger.close_month(march()).await.unwrap();

    // Marina now paid the same bill instead.
    let mut changed = expense(10000, B, 0.5, date(2025, 3, 1));
    changed.description = "Conta corrigida".into();
    ledger.update_expense(first.id, &changed).await.unwrap();
    ledger.close_month(march()).await.unwrap();

    let stored = ledger.settlement(march()).await.unwrap().unwrap();
    assert_eq!((stored.from, stored.to, stored.amount_cents), (A, B, 5000));
}

#[tokio::test]
async fn test_reclose_after_balancing_clears_settlement() {
    let (_store, ledger) = household();
    ledger.add_expense(&expense(10000, A, 0.5, date(2025, 3, 1))).await.unwrap();
    match ledger.close_month(march()).await.unwrap() {
        CloseOutcome::Recorded(r) => assert_eq!((r.from, r.to, r.amount_cents), (B, A, 5000)),
        other => panic!("expected a settlement, got {other:?}"),
    }

    // Marina covers a bill of the same size, so the month is even again.
    ledger.add_expense(&expense(10000, B, 0.5, date(2025, 3, 2))).await.unwrap();

    let summary = ledger.month_summary(march()).await.unwrap();
    assert_eq!(summary.bal_a, 0.0);
    assert_eq!(ledger.close_month(march()).await.unwrap(), CloseOutcome::NothingToSettle);

    assert!(ledger.settlement(march()).await.unwrap().is_none());
    let report = ledger.month_report(march()).await.unwrap();
    assert!(report.settlement.is_none());
    assert!(report.summary.suggestion.starts_with("Perfeito"));
}

#[tokio::test]
async fn test_balanced_month_records_nothing() {
    let (store, ledger) = household();
    ledger.add_expense(&expense(8000, A, 0.5, date(2025, 3, 5))).await.unwrap();
    ledger.add_expense(&expense(8000, B, 0.5, date(2025, 3, 6))).await.unwrap();

    let summary = ledger.month_summary(march()).await.unwrap();
    assert_eq!(summary.bal_a, 0.0);
    assert_eq!(summary.settlement.amount, 0.0);

    assert_eq!(ledger.close_month(march()).await.unwrap(), CloseOutcome::NothingToSettle);
    assert_eq!(store.settlement_writes(), 0);
    assert!(ledger.settlement(march()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_legacy_rows_degrade_without_failing() {
    let (store, ledger) = household();
    store.insert_raw(ExpenseRecord {
        id: 0,
        spent_at: date(2025, 3, 2),
        amount: 50.0,
        payer_id: A,
        category: "Mercado".into(),
        description: "Split corrompido".into(),
        split_json: Some("not json".into()),
    });
    store.insert_raw(ExpenseRecord {
        id: 0,
        spent_at: date(2025, 3, 9),
        amount: 30.0,
        payer_id: PartyId(999),
        category: "Casa".into(),
        description: "Pagador antigo".into(),
        split_json: Some(r#"{"1": 0.5, "2": 0.5}"#.into()),
    });

    let report = ledger.month_report(march()).await.unwrap();
    let s = &report.summary;
    assert_eq!(s.total, 80.0);
    assert_eq!((s.paid_a, s.paid_b), (50.0, 0.0));
    assert_eq!((s.quota_a, s.quota_b), (40.0, 40.0));
    assert_eq!((s.bal_a, s.bal_b), (10.0, -40.0));
    assert_eq!(s.settlement, Transfer { from: B, to: A, amount: 10.0 });

    // Newest first; the stranger's payment has no payer name.
    assert_eq!(report.expenses[0].expense.description, "Pagador antigo");
    assert_eq!(report.expenses[0].payer_name, None);
    assert_eq!(report.expenses[1].payer_name.as_deref(), Some("Thiago"));

    match ledger.close_month(march()).await.unwrap() {
        CloseOutcome::Recorded(r) => assert_eq!(r.amount_cents, 1000),
        other => panic!("expected a settlement, got {other:?}"),
    }
}

#[tokio::test]
async fn test_month_boundaries() {
    let (_store, ledger) = household();
    ledger.add_expense(&expense(1000, A, 0.5, date(2025, 3, 31))).await.unwrap();
    ledger.add_expense(&expense(2000, A, 0.5, date(2025, 4, 1))).await.unwrap();
    ledger.add_expense(&expense(4000, A, 0.5, date(2025, 2, 28))).await.unwrap();

    let march_total = ledger.month_summary(march()).await.unwrap().total;
    let april_total = ledger.month_summary(march().next()).await.unwrap().total;
    let february_total = ledger.month_summary(march().previous()).await.unwrap().total;

    assert_eq!(march_total, 10.0);
    assert_eq!(april_total, 20.0);
    assert_eq!(february_total, 40.0);
}

#[tokio::test]
async fn test_quick_entry_into_ledger() {
    let (_store, ledger) = household();
    let (a, b) = ledger.parties().await.unwrap();
    let parser = QuickEntryParser::new().unwrap();

    let entry = parser
        .parse("mercado 150,00 ela", &a.name, &b.name, (0.5, 0.5), date(2025, 3, 15))
        .unwrap();
    let record = ledger.add_expense(&entry.to_new_expense(&a, &b)).await.unwrap();
    assert_eq!(record.payer_id, B);
    assert_eq!(ledger.categories().await.unwrap(), vec!["Mercado"]);

    let summary = ledger.month_summary(march()).await.unwrap();
    assert_eq!(summary.settlement, Transfer { from: A, to: B, amount: 75.0 });
    assert_eq!(summary.suggestion, "Para equalizar: Pix de R$ 75.00 de Thiago para Marina.");
}

#[tokio::test]
async fn test_bootstrap_on_empty_store() {
    let store = MemoryStore::new();
    let ledger = Ledger::new(Arc::new(store.clone()));

    let err = ledger.month_summary(march()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CasaError>(),
        Some(CasaError::PartiesNotConfigured(_))
    ));

    let (a, b) = ledger.bootstrap("Thiago", "Marina").await.unwrap();
    assert_eq!((a.name.as_str(), b.name.as_str()), ("Thiago", "Marina"));
    assert!(ledger.categories().await.unwrap().contains(&"Pets".to_string()));

    // A second bootstrap keeps the existing parties.
    let (a2, _) = ledger.bootstrap("Outro", "Nome").await.unwrap();
    assert_eq!(a2, a);
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let (store, ledger) = household();
    ledger.add_expense(&expense(1000, A, 0.5, date(2025, 3, 1))).await.unwrap();

    store.set_error("disk full");
    let err = ledger.close_month(march()).await.unwrap_err();
    assert!(err.to_string().contains("disk full"));
    assert_eq!(store.expense_count(), 1);

    store.clear_error();
    assert!(ledger.close_month(march()).await.is_ok());
}

#[tokio::test]
async fn test_category_rename_refiles_expenses() {
    let (_store, ledger) = household();
    ledger.add_expense(&expense(1000, A, 0.5, date(2025, 3, 1))).await.unwrap();

    assert!(ledger.rename_category("Mercado", "Supermercado").await.unwrap());
    let report = ledger.month_report(march()).await.unwrap();
    assert_eq!(report.expenses[0].expense.category, "Supermercado");
    assert_eq!(ledger.categories().await.unwrap(), vec!["Supermercado"]);
}
