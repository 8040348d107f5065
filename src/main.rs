use std::env;
use std::process;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use census_sync::{
    setup_database, CsvWorkbook, FileOutbox, Scheduler, Settings, SyncOrchestrator,
};

const DEFAULT_SETTINGS_PATH: &str = "census-sync.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    let settings_path = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(DEFAULT_SETTINGS_PATH);

    let settings = Settings::from_file(settings_path)?;

    let conn = Connection::open(&settings.database)
        .with_context(|| format!("opening database {:?}", settings.database))?;
    setup_database(&conn)?;

    let source = CsvWorkbook::new(&settings.workbook_dir);
    let sender = FileOutbox::new(&settings.outbox_dir);
    let orchestrator = SyncOrchestrator::new(
        conn,
        source,
        sender,
        settings.batch_size,
        settings.occupancy_threshold,
        settings.alert_recipient.clone(),
    );

    match command {
        // One-shot runs, for cron-style deployments and manual operation.
        "sync" => orchestrator.sync()?,
        "alert" => orchestrator.alert()?,
        // Long-running mode with both cadences on an internal loop.
        "run" => {
            Scheduler::from_settings(&settings)
                .run(|| orchestrator.sync(), || orchestrator.alert())
                .await
        }
        other => {
            eprintln!("unknown command: {}", other);
            eprintln!("usage: census-sync [sync|alert|run] [settings.json]");
            process::exit(2);
        }
    }

    Ok(())
}
