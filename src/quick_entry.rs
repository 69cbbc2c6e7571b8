//! Quick entry: turn a one-line note into an expense draft.
//!
//! `"mercado 123,45 ela 60/40 ontem"` becomes a R$ 123,45 grocery expense
//! paid by party B, split 60/40, dated yesterday. Amounts are parsed
//! exactly with `rust_decimal` before being converted to cents.

use chrono::{Datelike, Duration, NaiveDate};
use regex::{Match, Regex};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::ops::Range;
use std::sync::OnceLock;

use crate::types::{NewExpense, Party};

/// Category used when no keyword matches.
pub const FALLBACK_CATEGORY: &str = "Outro";

/// Keyword table, checked in order; the first category with a hit wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Mercado", &["mercado", "supermercado", "angeloni", "giassi", "condor", "hortifruti"]),
    ("Contas", &["luz", "celesc", "água", "agua", "internet", "vivo", "claro", "gás", "gas"]),
    ("Moradia", &["condominio", "condomínio", "iptu", "taxa lixo", "seguro"]),
    ("Casa", &["limpeza", "manutenção", "manutencao", "conserto", "lâmpada", "lampada", "chaveiro", "ferragem"]),
    ("Móveis & Eletro", &["sofa", "sofá", "cama", "cadeira", "mesa", "geladeira", "microondas", "móvel", "movel", "eletro"]),
    ("Transporte", &["gasolina", "combustível", "combustivel", "uber", "99"]),
    ("Pets", &["pet", "ração", "racao", "veterinário", "veterinario", "banho", "tosa"]),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which party the note says paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payer {
    PartyA,
    PartyB,
}

/// A parsed quick-entry draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickEntry {
    pub amount: Decimal,
    pub amount_cents: i64,
    pub split_a: f64,
    pub split_b: f64,
    pub spent_at: NaiveDate,
    pub payer: Payer,
    pub category: String,
    pub description: String,
}

impl QuickEntry {
    /// Write-side expense for this draft.
    pub fn to_new_expense(&self, party_a: &Party, party_b: &Party) -> NewExpense {
        let payer = match self.payer {
            Payer::PartyA => party_a,
            Payer::PartyB => party_b,
        };
        NewExpense {
            amount_cents: self.amount_cents,
            payer_id: payer.id,
            category: self.category.clone(),
            description: self.description.clone(),
            spent_at: self.spent_at,
            split_a: self.split_a,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct QuickEntryParser {
    split: Regex,
    date: Regex,
    decimal_amount: Regex,
    integer_amount: Regex,
    relative_day: Regex,
    currency: Regex,
}

impl QuickEntryParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            split: Regex::new(r"\b(\d{1,3})\s*/\s*(\d{1,3})\b")?,
            date: Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b")?,
            decimal_amount: Regex::new(r"\d{1,3}(?:\.\d{3})*,\d{2}|\d+,\d{2}|\d+\.\d{2}")?,
            integer_amount: Regex::new(r"\b\d+\b")?,
            relative_day: Regex::new(r"(?i)\b(hoje|ontem)\b")?,
            currency: Regex::new(r"(?i)r\$")?,
        })
    }

    /// Parse a note. Returns `None` for blank text or text with no amount.
    pub fn parse(
        &self,
        text: &str,
        party_a_name: &str,
        party_b_name: &str,
        default_split: (f64, f64),
        today: NaiveDate,
    ) -> Option<QuickEntry> {
        if text.trim().is_empty() {
            return None;
        }

        let mut consumed: Vec<Range<usize>> = Vec::new();

        let split = self.find_split(text);
        let (split_a, split_b) = match &split {
            Some((range, weights)) => {
                consumed.push(range.clone());
                *weights
            }
            None => default_split,
        };

        let (date, rejected) = self.find_date(text, split.as_ref().map(|(r, _)| r), today);
        let spent_at = match date {
            Some((range, d)) => {
                consumed.push(range);
                d
            }
            None => self.relative_date(text, today),
        };

        // Digits of an impossible date are never an amount.
        let mut hidden = consumed.clone();
        hidden.extend(rejected);
        let (amount_range, amount) = self.find_amount(&blank_out(text, &hidden))?;
        let amount_cents = amount.checked_mul(Decimal::ONE_HUNDRED)?.round().to_i64()?;
        if amount_cents <= 0 {
            return None;
        }
        consumed.push(amount_range);

        let category = detect_category(text).to_string();
        let description = self.clean_description(text, &consumed);
        let description = if description.is_empty() { category.clone() } else { description };

        Some(QuickEntry {
            amount,
            amount_cents,
            split_a,
            split_b,
            spent_at,
            payer: detect_payer(text, party_a_name, party_b_name),
            category,
            description,
        })
    }

    /// First `NN/MM` pair adding up to 100, as percentages.
    fn find_split(&self, text: &str) -> Option<(Range<usize>, (f64, f64))> {
        self.split.captures_iter(text).find_map(|caps| {
            let a: u32 = caps.get(1)?.as_str().parse().ok()?;
            let b: u32 = caps.get(2)?.as_str().parse().ok()?;
            let whole = caps.get(0)?.range();
            (a + b == 100).then(|| (whole, (a as f64 / 100.0, b as f64 / 100.0)))
        })
    }

    /// First `d/m[/y]` that is a real calendar date and not the split,
    /// plus the ranges of date-shaped tokens that are not real dates.
    /// Without a year, the date falls in `today`'s year.
    fn find_date(
        &self,
        text: &str,
        split: Option<&Range<usize>>,
        today: NaiveDate,
    ) -> (Option<(Range<usize>, NaiveDate)>, Vec<Range<usize>>) {
        let mut found = None;
        let mut rejected = Vec::new();
        for caps in self.date.captures_iter(text) {
            let Some(whole) = caps.get(0).map(|m| m.range()) else {
                continue;
            };
            if split.is_some_and(|r| overlaps(r, &whole)) {
                continue;
            }
            match calendar_date(&caps, today) {
                Some(d) if found.is_none() => found = Some((whole, d)),
                Some(_) => {}
                None => rejected.push(whole),
            }
        }
        (found, rejected)
    }

    fn relative_date(&self, text: &str, today: NaiveDate) -> NaiveDate {
        match self.relative_day.captures(text).and_then(|c| c.get(1)) {
            Some(m) if m.as_str().eq_ignore_ascii_case("ontem") => today - Duration::days(1),
            _ => today,
        }
    }

    /// Prefer amounts written with cents; fall back to a bare integer.
    fn find_amount(&self, text: &str) -> Option<(Range<usize>, Decimal)> {
        let found: Match = self
            .decimal_amount
            .find(text)
            .or_else(|| self.integer_amount.find(text))?;
        let raw = found.as_str();
        let normalised = if raw.contains(',') {
            raw.replace('.', "").replace(',', ".")
        } else {
            raw.to_string()
        };
        let amount = Decimal::from_str(&normalised).ok()?;
        Some((found.range(), amount))
    }

    fn clean_description(&self, text: &str, consumed: &[Range<usize>]) -> String {
        let blanked = blank_out(text, consumed);
        let without_days = self.relative_day.replace_all(&blanked, " ");
        let without_currency = self.currency.replace_all(&without_days, " ");
        without_currency.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn calendar_date(caps: &regex::Captures, today: NaiveDate) -> Option<NaiveDate> {
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 { y + 2000 } else { y }
        }
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Replace the given byte ranges with spaces, keeping byte offsets stable.
fn blank_out(text: &str, ranges: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if ranges.iter().any(|r| r.contains(&i)) {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    out
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn detect_payer(text: &str, party_a_name: &str, party_b_name: &str) -> Payer {
    let words = words(text);
    let has = |w: &str| words.iter().any(|x| x == w);
    let lower = text.to_lowercase();

    if has("eu") {
        Payer::PartyA
    } else if has("ela") {
        Payer::PartyB
    } else if !party_a_name.is_empty() && lower.contains(&party_a_name.to_lowercase()) {
        Payer::PartyA
    } else if !party_b_name.is_empty() && lower.contains(&party_b_name.to_lowercase()) {
        Payer::PartyB
    } else {
        Payer::PartyA
    }
}

/// Keyword category, matched on whole words (phrases on substrings).
pub fn detect_category(text: &str) -> &'static str {
    let words = words(text);
    let lower = text.to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|kw| {
                if kw.contains(' ') {
                    lower.contains(kw)
                } else {
                    words.iter().any(|w| w == kw)
                }
            })
        })
        .map(|(category, _)| *category)
        .unwrap_or(FALLBACK_CATEGORY)
}

static PARSER: OnceLock<Result<QuickEntryParser, regex::Error>> = OnceLock::new();

/// Convenience wrapper over a process-wide parser, compiled on first use.
pub fn parse_quick_input(
    text: &str,
    party_a_name: &str,
    party_b_name: &str,
    default_split: (f64, f64),
    today: NaiveDate,
) -> Option<QuickEntry> {
    PARSER
        .get_or_init(QuickEntryParser::new)
        .as_ref()
        .ok()?
        .parse(text, party_a_name, party_b_name, default_split, today)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
