//! Settlement engine: month totals, quotas, balances and the net transfer.
//!
//! Pure computation over a snapshot of expense records. Malformed split
//! payloads never fail the month: each party whose weight cannot be read
//! falls back to an even share.

use serde_json::{Map, Value};

use crate::types::{ExpenseRecord, MonthSummary, Party, PartyId, Transfer};

/// Weight assumed for a party whose split entry is missing or unreadable.
pub const EVEN_SPLIT: f64 = 0.5;

/// Suggestion shown when both balances are exactly zero.
pub const NOTHING_TO_SETTLE: &str = "Perfeito: não há nada a acertar neste mês.";

// ---------------------------------------------------------------------------
// Split weights
// ---------------------------------------------------------------------------

/// Read both parties' weights from a raw split payload.
///
/// The payload is a JSON object keyed by stringified party id. Values may be
/// numbers or numeric strings. Anything unreadable, for either party
/// independently, becomes [`EVEN_SPLIT`].
pub fn split_weights(raw: Option<&str>, a: PartyId, b: PartyId) -> (f64, f64) {
    let entries = raw.and_then(parse_object);
    let weight = |id: PartyId| {
        entries
            .as_ref()
            .and_then(|m| m.get(&id.key()))
            .and_then(weight_value)
            .unwrap_or(EVEN_SPLIT)
    };
    (weight(a), weight(b))
}

fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn weight_value(value: &Value) -> Option<f64> {
    let w = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    w.is_finite().then_some(w)
}

/// Each party's share of a single expense, per its split weights.
pub fn expense_shares(expense: &ExpenseRecord, party_a: &Party, party_b: &Party) -> (f64, f64) {
    let (wa, wb) = split_weights(expense.split_json.as_deref(), party_a.id, party_b.id);
    (expense.amount * wa, expense.amount * wb)
}

// ---------------------------------------------------------------------------
// Month summary
// ---------------------------------------------------------------------------

/// Per-field contributions, summed in a canonical order so that the result
/// does not depend on the order expenses were listed in.
#[derive(Default)]
struct Accumulator {
    total: Vec<f64>,
    paid_a: Vec<f64>,
    paid_b: Vec<f64>,
    quota_a: Vec<f64>,
    quota_b: Vec<f64>,
}

fn canonical_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().fold(0.0, |acc, v| acc + v)
}

/// Compute totals, quotas, balances and the settling transfer for a month.
///
/// A payer id matching neither party still counts towards `total` and the
/// quotas but is left out of both `paid_*` figures.
pub fn compute_month_summary(
    expenses: &[ExpenseRecord],
    party_a: &Party,
    party_b: &Party,
) -> MonthSummary {
    let mut acc = Accumulator::default();

    for expense in expenses {
        let amount = expense.amount;
        acc.total.push(amount);

        let (share_a, share_b) = expense_shares(expense, party_a, party_b);
        acc.quota_a.push(share_a);
        acc.quota_b.push(share_b);

        if expense.payer_id == party_a.id {
            acc.paid_a.push(amount);
        } else if expense.payer_id == party_b.id {
            acc.paid_b.push(amount);
        }
    }

    let total = canonical_sum(acc.total);
    let paid_a = canonical_sum(acc.paid_a);
    let paid_b = canonical_sum(acc.paid_b);
    let quota_a = canonical_sum(acc.quota_a);
    let quota_b = canonical_sum(acc.quota_b);

    let bal_a = paid_a - quota_a;
    let bal_b = paid_b - quota_b;

    let (suggestion, settlement) = settle(party_a, party_b, bal_a, bal_b);

    MonthSummary {
        total,
        paid_a,
        paid_b,
        quota_a,
        quota_b,
        bal_a,
        bal_b,
        suggestion,
        settlement,
    }
}

/// Direction rule, checked on A's balance first.
fn settle(party_a: &Party, party_b: &Party, bal_a: f64, bal_b: f64) -> (String, Transfer) {
    if bal_a > 0.0 {
        (
            suggestion(party_b, party_a, bal_a),
            Transfer { from: party_b.id, to: party_a.id, amount: bal_a },
        )
    } else if bal_b > 0.0 {
        (
            suggestion(party_a, party_b, bal_b),
            Transfer { from: party_a.id, to: party_b.id, amount: bal_b },
        )
    } else {
        (
            NOTHING_TO_SETTLE.to_string(),
            Transfer { from: party_a.id, to: party_b.id, amount: 0.0 },
        )
    }
}

fn suggestion(debtor: &Party, creditor: &Party, amount: f64) -> String {
    format!(
        "Para equalizar: Pix de R$ {amount:.2} de {} para {}.",
        debtor.name, creditor.name
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
