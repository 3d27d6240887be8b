use anyhow::{Context, Result};
use clap::Parser;
use rds_extract::config::CompressionType;
use rds_extract::{load_credentials, Connector, ExportConfig, Exporter, PostgresDriver};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rds-extract")]
#[command(about = "Export a PostgreSQL table to CSV", long_about = None)]
struct Cli {
    /// Credentials YAML file
    #[arg(long, default_value = "credentials.yaml")]
    credentials: PathBuf,

    /// Table to extract, optionally schema-qualified
    #[arg(long, default_value = "loan_payments", conflicts_with = "query")]
    table: String,

    /// Query SQL or SQL file path, used instead of --table
    #[arg(long)]
    query: Option<String>,

    /// Output file
    #[arg(short, long, default_value = "loan_payments.csv")]
    output: PathBuf,

    /// Field delimiter
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Omit the header row
    #[arg(long)]
    no_header: bool,

    /// Output compression
    #[arg(long, value_enum, default_value = "none")]
    compression: CompressionType,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// `--query` takes SQL text, or the path of a file holding it.
fn resolve_query(input: &str) -> Result<String> {
    match fs::metadata(input) {
        Ok(meta) if meta.is_file() => {
            debug!(path = input, "reading query from file");
            let sql = fs::read_to_string(input)
                .with_context(|| format!("Failed to read query file {input}"))?;
            Ok(sql.trim().to_owned())
        }
        _ => Ok(input.to_owned()),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(path = %cli.credentials.display(), "loading credentials");
    let credentials = load_credentials(&cli.credentials).context("Failed to load credentials")?;

    let connector = Connector::new(PostgresDriver, &credentials)
        .context("Failed to connect to PostgreSQL database")?;
    info!("connected");

    let result = match &cli.query {
        Some(query) => {
            let sql = resolve_query(query)?;
            connector.fetch_data(&sql).context("Failed to run query")?
        }
        None => connector
            .extract_table(&cli.table)
            .with_context(|| format!("Failed to extract table {}", cli.table))?,
    };

    let export_config = ExportConfig {
        output_file: cli.output,
        delimiter: cli.delimiter,
        include_header: !cli.no_header,
        compression: cli.compression,
    };
    let stats = Exporter::new(export_config)
        .export(&result)
        .context("Failed to write output file")?;

    stats.print_summary();

    Ok(())
}
