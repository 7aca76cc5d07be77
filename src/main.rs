use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use spacebook::clock::SystemClock;
use spacebook::config::AppConfig;
use spacebook::db;
use spacebook::handlers;
use spacebook::services::{rate_limit, sweep};
use spacebook::state::AppState;

fn spawn_sweeper(state: Arc<AppState>) {
    let secs = state.config.completion_sweep_secs;
    if secs == 0 {
        tracing::info!("completion sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        loop {
            interval.tick().await;
            let now = state.local_now();
            let db = match state.db() {
                Ok(db) => db,
                Err(e) => {
                    tracing::error!(error = %e, "sweep skipped");
                    continue;
                }
            };
            if let Err(e) = sweep::complete_elapsed(&db, now) {
                tracing::error!(error = %e, "completion sweep failed");
            }
            if let Err(e) = rate_limit::cleanup(&db, now) {
                tracing::error!(error = %e, "rate limit cleanup failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.payment_webhook_secret.is_empty() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, payment webhooks will not be verified");
    }

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        clock: Box::new(SystemClock),
    });

    spawn_sweeper(state.clone());

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
