use std::sync::Arc;

use recharge_dispatch::config::DispatchConfig;
use recharge_dispatch::dispatch::{Dispatcher, spawn_reconcile_ticker};
use recharge_dispatch::error::Result;
use recharge_dispatch::routes::dispatch_routes;
use recharge_dispatch::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DispatchConfig::from_env()?;

    eprintln!("Recharge Dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── Dispatcher ───────────────────────────────────────────────────────
    let port = config.http_port;
    let reconcile_interval = config.reconcile_interval;
    let dispatcher = Arc::new(Dispatcher::new(db, config));

    match reconcile_interval {
        Some(interval) => {
            let _reconcile_handle = spawn_reconcile_ticker(Arc::clone(&dispatcher), interval);
            eprintln!("   Reconcile: every {}s", interval.as_secs());
        }
        None => eprintln!("   Reconcile: disabled"),
    }

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = dispatch_routes(dispatcher);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "Dispatch server started");
    axum::serve(listener, app).await?;

    Ok(())
}
