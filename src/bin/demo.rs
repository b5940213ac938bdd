use anyhow::Result;
use clap::Parser;
use delta_table_utils::config::AppConfig;
use delta_table_utils::generator::generate;
use delta_table_utils::logging::build_dispatch;
use delta_table_utils::storage;
use delta_table_utils::table::{TableReader, TableWriter, WriteMode};
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "delta-demo",
    about = "Write synthetic rows to a partitioned Delta table and read them back"
)]
struct Cli {
    /// Path to config file; settings are read from `DELTA_UTILS__*` variables when omitted
    config: Option<String>,

    /// Number of rows to generate
    #[arg(long, default_value_t = 10)]
    rows: i64,

    /// Seed for reproducible rows
    #[arg(long)]
    seed: Option<u64>,

    /// Replace the table contents instead of appending
    #[arg(long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;

    let dispatch = build_dispatch(&config.logging.level, config.logging.format);
    tracing::dispatcher::set_global_default(dispatch.clone())?;

    match &cli.config {
        Some(path) => tracing::info!("Configuration '{}' loaded successfully", path),
        None => tracing::info!("Configuration loaded from environment"),
    }

    let storage = storage::connect(&config.storage).await?;
    storage.ensure_bucket(config.bucket()).await?;

    let location = config.table_location()?;
    let writer = TableWriter::new(storage.clone())
        .with_date_column(&config.table.date_column)
        .with_dispatch(dispatch.clone());
    let reader = TableReader::new(storage).with_dispatch(dispatch);

    let rows = generate(cli.rows, cli.seed)?;
    let mode = if cli.overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::Append
    };
    let outcome = writer.write(&location, &rows, mode).await?;

    let read_back = reader.read_rows(&location, None).await?;
    tracing::info!(
        "Wrote {} rows at version {}, table now holds {} rows ({}ms)",
        outcome.rows_written,
        outcome.version,
        read_back.len(),
        now.elapsed().as_millis()
    );

    Ok(())
}
