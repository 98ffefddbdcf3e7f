use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use sarpras_api::config::{init_tracing, load_config};
use sarpras_api::db::{establish_connection_from_app_config, run_migrations};
use sarpras_api::events::{process_events, EventSender};
use sarpras_api::handlers::AppServices;
use sarpras_api::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        host = %config.host,
        port = config.port,
        "Starting sarpras-api"
    );

    let db = Arc::new(
        establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to the database")?,
    );
    if config.auto_migrate {
        run_migrations(&db)
            .await
            .context("failed to run migrations")?;
        info!("Migrations applied");
    }

    let (event_sender, event_rx) = EventSender::channel(1024);
    tokio::spawn(process_events(event_rx));

    let services = AppServices::new(db.clone(), event_sender.clone(), config.reservation.clone());

    // Periodic sweep flipping expired holds; the endpoint-facing lazy
    // projection covers the window between ticks. Zero disables the loop.
    if config.sweep_interval_secs > 0 {
        let markings = services.markings.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match markings.expire_sweep().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Sweep expired markings"),
                    Err(err) => error!(error = %err, "Marking sweep failed"),
                }
            }
        });
    }

    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };
    let app = app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
