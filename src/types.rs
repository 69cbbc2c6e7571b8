//! Shared types for Casa Split.
//!
//! These types form the data model used across all modules: the two
//! parties, the expense records fetched per month, the summary produced
//! by the settlement engine, and the stored settlement of a month.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Parties
// ---------------------------------------------------------------------------

/// Storage identifier of a party.
///
/// Split-weight payloads key their entries by the stringified id, which is
/// exactly what `Display` renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartyId {
    /// Key used for this party inside a split-weight mapping.
    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

/// One of the two account holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
}

impl Party {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: PartyId(id),
            name: name.into(),
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

/// An expense as fetched from storage for a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: i64,
    pub spent_at: NaiveDate,
    /// Major currency units (already converted from stored cents).
    pub amount: f64,
    pub payer_id: PartyId,
    pub category: String,
    pub description: String,
    /// Raw split-weight payload, a JSON object keyed by stringified party id.
    /// `None` when the record has no payload at all.
    pub split_json: Option<String>,
}

impl fmt::Display for ExpenseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} R$ {:.2} [{}] {} (payer #{})",
            self.id, self.spent_at, self.amount, self.category, self.description, self.payer_id,
        )
    }
}

/// Write-side expense input, validated by the ledger before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub amount_cents: i64,
    pub payer_id: PartyId,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub spent_at: NaiveDate,
    /// Party A's weight; party B gets the complement.
    #[serde(default = "default_split_a")]
    pub split_a: f64,
}

fn default_split_a() -> f64 {
    0.5
}

/// An expense row ready to be written: the split already serialised.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExpense {
    pub amount_cents: i64,
    pub payer_id: PartyId,
    pub category: String,
    pub description: String,
    pub spent_at: NaiveDate,
    pub split_json: String,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Net transfer that settles a month: `from` pays `amount` to `to`.
///
/// A zero amount means nothing is owed; the direction is then meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: PartyId,
    pub to: PartyId,
    pub amount: f64,
}

impl Transfer {
    /// Amount rounded to integer minor units for persistence.
    pub fn amount_cents(&self) -> i64 {
        to_cents(self.amount)
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} -> #{}: {:.2}", self.from, self.to, self.amount)
    }
}

/// Output of the settlement engine for one set of expenses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub total: f64,
    pub paid_a: f64,
    pub paid_b: f64,
    pub quota_a: f64,
    pub quota_b: f64,
    /// `paid_a - quota_a`; positive means party A is owed money.
    pub bal_a: f64,
    pub bal_b: f64,
    pub suggestion: String,
    #[serde(rename = "settle_from_to_amount")]
    pub settlement: Transfer,
}

impl fmt::Display for MonthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total=R$ {:.2} | paid A={:.2} B={:.2} | quota A={:.2} B={:.2} | bal A={:.2} B={:.2} | {}",
            self.total,
            self.paid_a,
            self.paid_b,
            self.quota_a,
            self.quota_b,
            self.bal_a,
            self.bal_b,
            self.suggestion,
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement record
// ---------------------------------------------------------------------------

/// A month's settlement as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub month: YearMonth,
    pub from: PartyId,
    pub to: PartyId,
    pub amount_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
}

impl SettlementRecord {
    pub fn amount(&self) -> f64 {
        from_cents(self.amount_cents)
    }
}

// ---------------------------------------------------------------------------
// Reporting period
// ---------------------------------------------------------------------------

/// Calendar month key, rendered and parsed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, CasaError> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(CasaError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// The month a date falls in.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// Half-open date range `[start, end)` covered by the month.
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.first_day(), self.next().first_day())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let (start, end) = self.bounds();
        date >= start && date < end
    }

    /// The `n` most recent months up to and including `today`'s, newest first.
    pub fn last_n(today: NaiveDate, n: usize) -> Vec<Self> {
        let mut months = Vec::with_capacity(n);
        let mut current = Self::containing(today);
        for _ in 0..n {
            months.push(current);
            current = current.previous();
        }
        months
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = CasaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CasaError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Convert a major-unit amount to integer cents, rounding half away from zero.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert integer cents back to major units.
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for Casa Split.
#[derive(Debug, thiserror::Error)]
pub enum CasaError {
    #[error("Invalid month (expected YYYY-MM): {0}")]
    InvalidMonth(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid split weight: {0} (must be between 0 and 1)")]
    InvalidSplit(f64),

    #[error("Payer #{0} is not one of the two household parties")]
    UnknownPayer(PartyId),

    #[error("Household parties not configured: {0}")]
    PartiesNotConfigured(String),

    #[error("Expense not found: #{0}")]
    ExpenseNotFound(i64),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
