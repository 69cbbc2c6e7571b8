//! Casa Split: two-party household expense splitter.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ledger database (seeding parties and categories on first
//! start), and serves the dashboard until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use casa_split::config::{self, AppConfig};
use casa_split::dashboard::{self, DashboardState};
use casa_split::engine::ledger::Ledger;
use casa_split::storage::sqlite::SqliteStore;
use casa_split::types::YearMonth;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default(CONFIG_PATH)?;
    init_logging();

    info!(
        party_a = %cfg.household.party_a_name,
        party_b = %cfg.household.party_b_name,
        default_split_a = cfg.household.default_split_a,
        "Casa Split starting up"
    );

    // -- Storage and ledger ----------------------------------------------

    let database_url = cfg.database_url();
    let store = SqliteStore::connect(&database_url).await?;
    let ledger = Ledger::new(Arc::new(store))
        .with_default_categories(cfg.household.default_categories.clone());

    let (party_a, party_b) = ledger
        .bootstrap(&cfg.household.party_a_name, &cfg.household.party_b_name)
        .await?;
    info!(%party_a, %party_b, "Household ready");

    let month = YearMonth::containing(chrono::Local::now().date_naive());
    let summary = ledger.month_summary(month).await?;
    info!(%month, %summary, "Current month");

    // -- Dashboard -------------------------------------------------------

    let mut state = DashboardState::new(ledger, cfg.household.clone())?;
    match cfg.dashboard_password() {
        Some(password) => state = state.with_password(password),
        None => warn!(
            env = ?cfg.dashboard.password_env,
            "No dashboard password set, the API is open to anyone who can reach it"
        ),
    }

    info!("Press Ctrl+C to stop.");
    dashboard::serve(
        Arc::new(state),
        &cfg.dashboard.host,
        cfg.dashboard.port,
        shutdown_signal(),
    )
    .await?;

    info!("Casa Split shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("casa_split=info"));

    let json_logging = std::env::var(config::LOG_JSON_ENV).is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
