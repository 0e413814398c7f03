use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use revsink::model::temperature::TemperatureParams;
use revsink::provider::load_history;
use revsink::repository::Database;
use revsink::repository::ingest::{IngestConfig, Ingestor};
use revsink::util::format::format_timestamp;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (history_path, db_path) = match (args.next(), args.next()) {
        (Some(history), Some(db)) => (PathBuf::from(history), db),
        _ => {
            eprintln!("usage: revsink <history.json> <db-path> [start-rev] [end-rev]");
            std::process::exit(2);
        }
    };
    let start: i64 = args
        .next()
        .map(|arg| arg.parse())
        .transpose()
        .context("invalid start revision")?
        .unwrap_or(0);
    let end: i64 = args
        .next()
        .map(|arg| arg.parse())
        .transpose()
        .context("invalid end revision")?
        .unwrap_or(0);

    let provider = load_history(&history_path)?;

    let db = Database::new(&db_path).await?;
    db.init_schema().await?;

    let ingestor = Ingestor::new(provider, IngestConfig::default());
    let summary = ingestor.run_range(&db, start, end).await?;

    eprintln!(
        "Ingested {} revisions ({} change records, {} anomalies), store at r{}",
        summary.revisions, summary.records, summary.anomalies, summary.last_revno
    );

    // Quick readout over the freshly committed checkpoints.
    if let Some(last) = db.revision(summary.last_revno).await? {
        let hot = db.top_hot_files(10, last.commit_ts, &TemperatureParams::default()).await?;
        if !hot.is_empty() {
            eprintln!("Hottest files as of {}:", format_timestamp(last.commit_ts));
            for (path, temperature) in hot {
                eprintln!("  {:>8.2}  {}", temperature, path);
            }
        }
    }

    Ok(())
}
