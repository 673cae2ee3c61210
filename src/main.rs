//! guild-ledger: persistent state engine for community bots
//!
//! Loads every ledger, serves the liveness endpoint and accepts commands as
//! JSON lines on stdin, writing one JSON reply per line to stdout. Logs go
//! to stderr.

use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guild_ledger::{console, server, Args, Dispatcher, Ledgers, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // stdout carries replies, so logs go to stderr
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("guild_ledger={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  guild-ledger {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Data dir: {}", args.data_dir.display());
    info!("Listen: {}", args.listen);

    let ledgers = Ledgers::open(&args.ledger_config()).await;
    let mirrored = ledgers.mirrored_domains();
    if mirrored.is_empty() {
        info!("Mirror: none (local-only)");
    } else {
        let names: Vec<&str> = mirrored.iter().map(|d| d.name).collect();
        info!("Mirror: {}", names.join(", "));
    }
    info!("======================================");

    let listen = args.listen;
    tokio::spawn(async move {
        if let Err(e) = server::serve(listen).await {
            error!(error = %e, "Liveness endpoint stopped");
        }
    });

    let (handle, dispatcher) =
        Dispatcher::new(ledgers, Arc::new(SystemClock)).spawn(args.queue_size);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Signal handler failed");
        }
    };
    console::run(
        &handle,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await;

    // Closing the queue makes the dispatcher flush and exit
    drop(handle);
    dispatcher.await?;
    info!("Shutdown complete");

    Ok(())
}
