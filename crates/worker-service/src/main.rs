use anyhow::{anyhow, Context, Result};
use cipher_worker_core::config::{ENV_REPORT_ERRORS, ENV_TIMEOUT_SECS};
use cipher_worker_core::{CipherView, CryptoWorker, InitPayload, StreamPort, WorkerConfig};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cipher decryption worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the worker protocol over stdin/stdout (one JSON message per line)
    Run {
        /// Post an errorResponse when a request fails
        #[arg(long, env = ENV_REPORT_ERRORS, action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
        report_errors: bool,
    },
    /// Decrypt a payload file once and print the views as JSON
    Decrypt {
        #[arg(long)]
        payload: PathBuf,
        #[arg(long, env = ENV_TIMEOUT_SECS)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { report_errors } => run_command(report_errors).await,
        Commands::Decrypt {
            payload,
            timeout_secs,
            pretty,
        } => decrypt_command(payload, timeout_secs, pretty).await,
    }
}

async fn run_command(report_errors: bool) -> Result<()> {
    let mut config = WorkerConfig::from_env()?;
    config.report_errors |= report_errors;
    let worker = CryptoWorker::new(config);
    let mut port = StreamPort::new(tokio::io::stdin(), tokio::io::stdout());

    info!("worker started");
    tokio::select! {
        result = worker.run(&mut port) => result?,
        _ = signal::ctrl_c() => info!("interrupted"),
    }
    info!("worker stopped");
    Ok(())
}

async fn decrypt_command(path: PathBuf, timeout_secs: Option<u64>, pretty: bool) -> Result<()> {
    let mut config = WorkerConfig::from_env()?;
    if let Some(secs) = timeout_secs {
        config.response_timeout_secs = secs;
    }
    config.validate()?;

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("read payload {}", path.display()))?;
    let payload: InitPayload = serde_json::from_str(&raw).context("payload file")?;
    let worker = CryptoWorker::with_payload(config.clone(), &payload)?;

    let serialized = tokio::time::timeout(config.response_timeout(), worker.decrypt_all())
        .await
        .map_err(|_| anyhow!("decryption timed out after {}s", config.response_timeout_secs))??;
    let views = serialized
        .iter()
        .map(|view| serde_json::from_str::<CipherView>(view))
        .collect::<Result<Vec<_>, _>>()?;

    let out = if pretty {
        serde_json::to_string_pretty(&views)?
    } else {
        serde_json::to_string(&views)?
    };
    println!("{out}");
    info!(count = views.len(), "decrypt complete");
    Ok(())
}
