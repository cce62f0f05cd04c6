use actix_cors::Cors;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

mod api;
mod db;
mod error;
mod integrations;
mod models;
mod schema;
mod services;

use integrations::{SwitchDriver, WebSmartClient};
use services::auth;
use services::clock::{Clock, SystemClock};
use services::reconciler::Reconciler;
use services::store::{PgStore, Store};

#[get("/")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "Killswitch Backend",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // DB Pool initialization
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::init_pool(&database_url);

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::from_env());
    let driver: Arc<dyn SwitchDriver> = Arc::new(WebSmartClient::new());

    auth::ensure_admin_password(store.as_ref()).expect("Failed to seed admin password");

    let reconciler = Arc::new(Reconciler::new(store.clone(), driver, clock.clone()));

    // Ground the observed state before the tick or the API can act
    reconciler.startup_sync().await;

    // Reconcile every minute on the minute
    let sched = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");
    let tick_reconciler = reconciler.clone();
    let tick_job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let reconciler = tick_reconciler.clone();
        Box::pin(async move {
            reconciler.reconcile_all(false).await;
        })
    })
    .expect("Failed to create reconcile job");
    sched
        .add(tick_job)
        .await
        .expect("Failed to add reconcile job");
    sched.start().await.expect("Failed to start scheduler");
    log::info!("Reconciliation tick scheduled every minute");

    let store_data: web::Data<dyn Store> = web::Data::from(store);
    let clock_data: web::Data<dyn Clock> = web::Data::from(clock);
    let reconciler_data = web::Data::from(reconciler);

    log::info!("Starting Killswitch Backend at http://0.0.0.0:8080");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(store_data.clone())
            .app_data(clock_data.clone())
            .app_data(reconciler_data.clone())
            .service(health_check)
            .configure(api::config)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
