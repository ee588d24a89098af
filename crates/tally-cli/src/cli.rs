use std::path::PathBuf;

use anyhow::bail;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tally",
    about = "Tally: reconcile a source ledger into a sink ledger without duplicates",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "tally.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one sync: login, import, push
    Sync(SyncArgs),
    /// Show what a sync would change without changing anything
    Plan(PlanArgs),
    /// Sync periodically
    Watch(WatchArgs),
}

#[derive(Args)]
pub struct SyncArgs {
    /// Source export (JSON)
    #[arg(short, long)]
    pub source: PathBuf,
    /// First date to import (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last date to import (YYYY-MM-DD); defaults to today when --from is set
    #[arg(long)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[arg(short, long)]
    pub source: PathBuf,
    #[arg(long)]
    pub from: Option<NaiveDate>,
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Args)]
pub struct WatchArgs {
    #[arg(short, long)]
    pub source: PathBuf,
    /// Days between runs; the first run covers this many days
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub every_days: u32,
}

/// Resolve `--from`/`--to` into an inclusive range. `None` imports everything.
pub fn date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> anyhow::Result<Option<(NaiveDate, NaiveDate)>> {
    let (start, end) = match (from, to) {
        (None, None) => return Ok(None),
        (Some(start), None) => (start, today),
        (None, Some(end)) => (NaiveDate::MIN, end),
        (Some(start), Some(end)) => (start, end),
    };
    if start > end {
        bail!("--from {start} is after --to {end}");
    }
    Ok(Some((start, end)))
}
