//! Dashboard: Axum web server for the household.
//!
//! Serves the JSON API the month screen, expense forms and quick entry
//! talk to. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::{AppState, DashboardState, PASSWORD_HEADER};

/// Run the dashboard until `shutdown` resolves.
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard address {addr}"))?;
    info!(%addr, "Dashboard listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server error")?;

    info!("Dashboard stopped");
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(PASSWORD_HEADER)]);

    let api = Router::new()
        .route("/api/parties", get(routes::get_parties))
        .route("/api/months", get(routes::get_months))
        .route("/api/months/:month/summary", get(routes::get_month_summary))
        .route("/api/months/:month/expenses", get(routes::get_month_report))
        .route(
            "/api/months/:month/settlement",
            get(routes::get_settlement).post(routes::close_month),
        )
        .route("/api/expenses", post(routes::create_expense))
        .route(
            "/api/expenses/:id",
            get(routes::get_expense)
                .put(routes::update_expense)
                .delete(routes::delete_expense),
        )
        .route("/api/quick-entry", post(routes::quick_entry))
        .route(
            "/api/categories",
            get(routes::get_categories).post(routes::create_category),
        )
        .route("/api/categories/reset", post(routes::reset_categories))
        .route(
            "/api/categories/:name",
            put(routes::rename_category).delete(routes::delete_category),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_password,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(api)
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
