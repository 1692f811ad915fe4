// MeetPing server - update webhook plus the background scheduler

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use meetping::{
    app_state::AppState,
    config::Config,
    infrastructure::{initialize_logging, LogMessenger},
    web::create_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    initialize_logging()?;

    let config = Config::from_env()?;
    let app_state = AppState::new(config.clone(), Arc::new(LogMessenger)).await?;

    let scheduler = app_state.scheduler.clone().start();
    let app = create_router(app_state);

    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 MeetPing listening on http://{}", addr);
    if config.server.webhook_secret.is_some() {
        info!("  POST /webhook/{{secret}}  - inbound updates");
    } else {
        info!("  POST /webhook           - inbound updates");
    }
    info!("  GET  /health            - store round-trip");
    info!("  GET  /admin/stats       - user, event and action counts");

    // In-flight updates finish before serve returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown(Duration::from_secs(5)).await;
    info!("MeetPing stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight updates");
}
