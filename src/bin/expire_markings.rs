//! One-shot sweep of expired holds, intended for cron.
//!
//! Prints the number of flipped rows and always exits zero; a row lost to a
//! concurrent convert or cancel is skipped, and a failed sweep is logged and
//! reported as zero.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use sarpras_api::config::{init_tracing, load_config};
use sarpras_api::db::{establish_connection_from_app_config, run_migrations};
use sarpras_api::events::{process_events, EventSender};
use sarpras_api::services::markings::MarkingService;

#[derive(Parser)]
#[command(
    name = "expire-markings",
    about = "Flip active markings past their expiry to expired"
)]
struct Cli {
    /// Override the configured database URL.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    init_tracing(config.log_level(), config.log_json);

    let db = Arc::new(
        establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to the database")?,
    );
    if config.auto_migrate {
        run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }

    let (event_sender, event_rx) = EventSender::channel(64);
    let consumer = tokio::spawn(process_events(event_rx));

    let markings = MarkingService::new(db, event_sender, config.reservation.clone());

    // A failed sweep is logged and reported as zero; the next run catches up.
    let count = match markings.expire_sweep().await {
        Ok(count) => count,
        Err(err) => {
            error!(error = %err, "Sweep failed");
            0
        }
    };

    info!(count, "Sweep finished");
    println!("{}", count);

    drop(markings);
    let _ = consumer.await;
    Ok(())
}
