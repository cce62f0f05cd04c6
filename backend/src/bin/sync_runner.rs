//! Sync Runner - one-shot forced reconciliation sweep
//!
//! Connects to the database, forces every managed switch port onto its
//! desired state, and exits. Meant for system cron or manual recovery
//! while the API process is down; the running backend performs the same
//! sweep at startup and every minute on its own.
//!
//! Environment variables:
//!   DATABASE_URL - PostgreSQL connection string (required)
//!   TIMEZONE     - IANA zone for schedule evaluation (default America/New_York)

use std::env;
use std::sync::Arc;

// Import from the library crate
use backend::db;
use backend::integrations::{SwitchDriver, WebSmartClient};
use backend::services::clock::{Clock, SystemClock};
use backend::services::reconciler::Reconciler;
use backend::services::store::{PgStore, Store};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            log::error!("DATABASE_URL environment variable is not set");
            std::process::exit(1);
        }
    };

    let pool = db::init_pool(&database_url);

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::from_env());
    let driver: Arc<dyn SwitchDriver> = Arc::new(WebSmartClient::new());
    let reconciler = Reconciler::new(store, driver, clock);

    log::info!("Running one-shot reconciliation sweep...");
    let summary = reconciler.startup_sync().await;

    if summary.failed > 0 {
        log::error!("Sweep finished with {} failure(s)", summary.failed);
        std::process::exit(1);
    }
}
