use clap::Parser;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ledger_reckoning::stores::{SqliteStore, Stores};
use ledger_reckoning::{run, Engine, Settings, SnapshotUpdater};

#[derive(Parser, Debug)]
#[command(name = "ledger-reckoning", version, about = "Replays an operation script against the ledger and prints account balances", long_about = None)]
struct Cli {
    /// Path to the operation script CSV
    #[arg(value_name = "FILE")]
    script: PathBuf,

    /// Optional TOML settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = start(Cli::parse()).await {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

async fn start(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    let settings = Settings::load(cli.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let stores = match &settings.storage.sqlite_path {
        Some(path) => Stores::sqlite(SqliteStore::new(path)?),
        None => Stores::in_memory(),
    };
    let engine = Arc::new(Engine::new(stores, settings.derive_options()));
    let updater = Arc::new(SnapshotUpdater::new(
        engine.balances(),
        settings.snapshot.page_size,
    ));

    let (stop, shutdown) = watch::channel(false);
    let background = settings
        .snapshot
        .enabled
        .then(|| updater.clone().spawn(settings.snapshot_interval(), shutdown));

    let outcome = run(&cli.script, engine, updater, io::stdout()).await;

    // The receiver is gone once the updater has exited on its own.
    let _ = stop.send(true);
    if let Some(handle) = background {
        handle.await?;
    }
    outcome
}
