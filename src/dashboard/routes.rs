//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use anyhow::Context;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, NaiveDate};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::HouseholdConfig;
use crate::engine::ledger::{CloseOutcome, Ledger, MonthReport};
use crate::quick_entry::{QuickEntry, QuickEntryParser};
use crate::types::{
    CasaError, ExpenseRecord, MonthSummary, NewExpense, Party, SettlementRecord, YearMonth,
};

/// Header carrying the shared household password.
pub const PASSWORD_HEADER: &str = "x-casa-password";

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub ledger: Ledger,
    pub parser: QuickEntryParser,
    pub household: HouseholdConfig,
    pub password: Option<SecretString>,
}

impl DashboardState {
    pub fn new(ledger: Ledger, household: HouseholdConfig) -> anyhow::Result<Self> {
        let parser = QuickEntryParser::new().context("Failed to build quick-entry parser")?;
        Ok(Self {
            ledger,
            parser,
            household,
            password: None,
        })
    }

    /// Require `x-casa-password` on every `/api` request.
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error: domain failures become 4xx, everything else 500.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<CasaError>() {
            Some(CasaError::ExpenseNotFound(_)) => StatusCode::NOT_FOUND,
            Some(CasaError::PartiesNotConfigured(_)) => StatusCode::CONFLICT,
            Some(CasaError::Config(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
            Some(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_month(raw: &str) -> ApiResult<YearMonth> {
    Ok(raw.parse::<YearMonth>()?)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PartiesResponse {
    pub party_a: Party,
    pub party_b: Party,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickEntryRequest {
    pub text: String,
    /// Store the parsed expense instead of only previewing it.
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickEntryResponse {
    pub entry: QuickEntry,
    pub expense: NewExpense,
    /// Set when the request asked to save.
    pub saved: Option<ExpenseRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameCategoryRequest {
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryChange {
    pub changed: bool,
    pub categories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Reject requests without the configured password. No-op when unset.
pub async fn require_password(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.password {
        let supplied = request
            .headers()
            .get(PASSWORD_HEADER)
            .and_then(|v| v.to_str().ok());
        let accepted = supplied.map_or(false, |s| {
            constant_time_eq(s.as_bytes(), expected.expose_secret().as_bytes())
        });
        if !accepted {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing or wrong household password" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/parties
pub async fn get_parties(State(state): State<AppState>) -> ApiResult<Json<PartiesResponse>> {
    let (party_a, party_b) = state.ledger.parties().await?;
    Ok(Json(PartiesResponse { party_a, party_b }))
}

/// GET /api/months
///
/// The month picker, current month first.
pub async fn get_months(State(state): State<AppState>) -> Json<Vec<YearMonth>> {
    Json(YearMonth::last_n(state.today(), state.household.months_listed))
}

/// GET /api/months/:month/summary
pub async fn get_month_summary(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> ApiResult<Json<MonthSummary>> {
    let month = parse_month(&month)?;
    Ok(Json(state.ledger.month_summary(month).await?))
}

/// GET /api/months/:month/expenses
pub async fn get_month_report(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> ApiResult<Json<MonthReport>> {
    let month = parse_month(&month)?;
    Ok(Json(state.ledger.month_report(month).await?))
}

/// GET /api/months/:month/settlement
pub async fn get_settlement(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> ApiResult<Json<Option<SettlementRecord>>> {
    let month = parse_month(&month)?;
    Ok(Json(state.ledger.settlement(month).await?))
}

/// POST /api/months/:month/settlement (close the month)
pub async fn close_month(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> ApiResult<Json<CloseOutcome>> {
    let month = parse_month(&month)?;
    Ok(Json(state.ledger.close_month(month).await?))
}

/// GET /api/expenses/:id
pub async fn get_expense(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ExpenseRecord>> {
    Ok(Json(state.ledger.expense(id).await?))
}

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<AppState>,
    Json(input): Json<NewExpense>,
) -> ApiResult<(StatusCode, Json<ExpenseRecord>)> {
    let record = state.ledger.add_expense(&input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/expenses/:id
pub async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<NewExpense>,
) -> ApiResult<Json<ExpenseRecord>> {
    Ok(Json(state.ledger.update_expense(id, &input).await?))
}

/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.ledger.delete_expense(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/quick-entry
pub async fn quick_entry(
    State(state): State<AppState>,
    Json(req): Json<QuickEntryRequest>,
) -> ApiResult<Json<QuickEntryResponse>> {
    let (a, b) = state.ledger.parties().await?;
    let entry = state
        .parser
        .parse(
            &req.text,
            &a.name,
            &b.name,
            state.household.default_split(),
            state.today(),
        )
        .ok_or_else(|| CasaError::InvalidAmount(format!("no amount found in {:?}", req.text)))?;

    let expense = entry.to_new_expense(&a, &b);
    let saved = if req.save {
        let record = state.ledger.add_expense(&expense).await?;
        info!(id = record.id, "Quick entry saved");
        Some(record)
    } else {
        None
    };

    Ok(Json(QuickEntryResponse { entry, expense, saved }))
}

/// GET /api/categories
pub async fn get_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.ledger.categories().await?))
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<CategoryChange>)> {
    let changed = state.ledger.add_category(&req.name).await?;
    let categories = state.ledger.categories().await?;
    let status = if changed { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(CategoryChange { changed, categories })))
}

/// PUT /api/categories/:name
pub async fn rename_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<RenameCategoryRequest>,
) -> ApiResult<Json<CategoryChange>> {
    let changed = state.ledger.rename_category(&name, &req.new_name).await?;
    let categories = state.ledger.categories().await?;
    Ok(Json(CategoryChange { changed, categories }))
}

/// DELETE /api/categories/:name
pub async fn delete_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CategoryChange>> {
    let changed = state.ledger.delete_category(&name).await?;
    let categories = state.ledger.categories().await?;
    Ok(Json(CategoryChange { changed, categories }))
}

/// POST /api/categories/reset
pub async fn reset_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.ledger.reset_categories().await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
