use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use playmarket_ingest::load_apps_csv;
use playmarket_pipeline::prepare;
use playmarket_report::{render_brief, ReportConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "playmarket")]
#[command(about = "Clean a Play Store app listing export and print the market brief")]
struct Cli {
    /// CSV file with one app listing per row.
    input: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PLAYMARKET_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = ReportConfig::from_env();

    let raw = load_apps_csv(&cli.input)
        .with_context(|| format!("loading app dataset {}", cli.input.display()))?;
    let prepared = prepare(&raw)
        .with_context(|| format!("preparing app dataset {}", cli.input.display()))?;
    info!(
        cleaned = prepared.summary.cleaned_rows,
        raw = prepared.summary.raw_rows,
        "dataset prepared"
    );

    println!("{}", render_brief(&prepared.table, &prepared.summary, &config));
    Ok(())
}
