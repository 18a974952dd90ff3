//! Offline cleanup sweep for leftover queue state.
//!
//! When a close hook never runs (process crash, lost lifecycle event),
//! a scope's keys linger in the store. This tool enumerates scopes and
//! purges them, with a dry-run mode that only counts. Output is JSON
//! for scripting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use anteroom_core::{
    load_config, run_cleanup, CleanupPlan, CleanupTarget, MemoryQueueStore, QueueStore,
    ScopeCleanup, ScopeId, SqliteQueueStore, StoreBackend,
};

#[derive(Parser)]
#[command(name = "anteroom-sweep")]
#[command(about = "Purge leftover queue state for closed performances")]
struct Cli {
    /// Path to the server config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Sweep every scope in the store
    #[arg(long, conflicts_with = "scope")]
    all: bool,

    /// Sweep a single scope, as "<show_id>:<sched_id>"
    #[arg(long)]
    scope: Option<String>,

    /// Count keys without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Confirm a destructive sweep
    #[arg(long)]
    yes: bool,
}

#[derive(Serialize)]
struct SweepOutput {
    success: bool,
    dry_run: bool,
    scopes: Vec<ScopeCleanup>,
    total_keys: u64,
    failures: u64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let target = match (&cli.scope, cli.all) {
        (Some(raw), false) => {
            let scope: ScopeId = raw
                .parse()
                .with_context(|| format!("invalid scope {:?}", raw))?;
            CleanupTarget::Scope(scope)
        }
        (None, true) => CleanupTarget::All,
        (None, false) => bail!("nothing to sweep: pass --all or --scope <show_id>:<sched_id>"),
        (Some(_), true) => unreachable!("clap rejects --all with --scope"),
    };

    if !cli.dry_run && !cli.yes {
        bail!("a sweep deletes queue state; re-run with --yes to confirm, or use --dry-run");
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    let store: Arc<dyn QueueStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryQueueStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteQueueStore::new(&config.store.path).context("Failed to open queue store")?,
        ),
    };

    let plan = CleanupPlan {
        target,
        dry_run: cli.dry_run,
    };
    let report = run_cleanup(store.as_ref(), None, &plan);

    let output = SweepOutput {
        success: !report.has_failures(),
        dry_run: report.dry_run,
        scopes: report.scopes,
        total_keys: report.total_keys,
        failures: report.failures,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if output.failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
