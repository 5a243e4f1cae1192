mod input;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use promptml_notifier::config::parse_bool_flag;
use promptml_notifier::{HeadlessShell, NotifierConfig, PanelSnapshot, ReconciliationEngine};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "promptml-sidecar")]
struct Args {
    /// NDJSON input file; stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    resolve_delay_ms: Option<u64>,
    #[arg(long)]
    resolve_attempts: Option<u32>,
    /// Snapshots before a created tab becomes visible.
    #[arg(long, default_value_t = 0)]
    creation_lag: u64,
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct SidecarReport {
    generated_at: DateTime<Utc>,
    applied: usize,
    skipped: usize,
    #[serde(flatten)]
    snapshot: PanelSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = resolve_config(&args, NotifierConfig::from_env());
    info!(
        event = "sidecar_start",
        region = %config.dock_region,
        resolve_delay_ms = config.resolution.initial_delay.as_millis() as u64,
        attempts = config.resolution.max_attempts,
        diff_policy = config.diff_policy.as_str()
    );

    let shell = HeadlessShell::new().with_creation_lag(args.creation_lag);
    let mut engine = ReconciliationEngine::new(config, shell);
    let stats = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open {}", path.display()))?;
            input::process(&mut engine, BufReader::new(file)).await?
        }
        None => input::process(&mut engine, BufReader::new(tokio::io::stdin())).await?,
    };

    let report = SidecarReport {
        generated_at: Utc::now(),
        applied: stats.applied,
        skipped: stats.skipped,
        snapshot: engine.snapshot(),
    };
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");
    Ok(())
}

fn resolve_config(args: &Args, mut config: NotifierConfig) -> NotifierConfig {
    if let Some(region) = args.region.as_deref().map(str::trim) {
        if !region.is_empty() {
            config.dock_region = region.to_string();
        }
    }
    if let Some(ms) = args.resolve_delay_ms {
        config.resolution.initial_delay = Duration::from_millis(ms);
    }
    if let Some(attempts) = args.resolve_attempts.filter(|attempts| *attempts > 0) {
        config.resolution.max_attempts = attempts;
    }
    config
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_enabled = std::env::var("PROMPTML_LOG_STDERR")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);
    if stderr_enabled {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
