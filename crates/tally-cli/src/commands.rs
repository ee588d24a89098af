use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Days, Local, NaiveDate};
use colored::Colorize;
use tracing::{error, info};

use tally_ledger::Converter;
use tally_sync::{InMemorySink, PushReport, Reconciler, SinkSnapshot, SourceExport, SourceLedger};

use crate::cli::*;
use crate::config::TallyConfig;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = TallyConfig::load(&cli.config)?;
    let today = Local::now().date_naive();
    match cli.command {
        Command::Sync(args) => {
            let range = date_range(args.from, args.to, today)?;
            let dry_run = args.dry_run || config.sync.dry_run;
            let report = run_once(&config, &args.source, range, dry_run).await?;
            print_report(&report);
            Ok(())
        }
        Command::Plan(args) => {
            let range = date_range(args.from, args.to, today)?;
            let report = run_once(&config, &args.source, range, true).await?;
            print_plan(&report);
            Ok(())
        }
        Command::Watch(args) => cmd_watch(&config, &args).await,
    }
}

/// One full run: load the sink, attribute the source, login, import every
/// account, push, and save the sink unless this is a dry run.
pub async fn run_once(
    config: &TallyConfig,
    source: &Path,
    range: Option<(NaiveDate, NaiveDate)>,
    dry_run: bool,
) -> anyhow::Result<PushReport> {
    let converter: Arc<dyn Converter> = Arc::new(config.rate_table()?);
    let credentials = config.credentials()?;

    let export: SourceExport = read_json(source)?;
    let ledger = SourceLedger::from_export(converter.clone(), export, range)?;
    let sink = load_sink(config)?;

    let mut reconciler = Reconciler::new(sink, converter, config.sync_options());
    reconciler.login(&credentials).await?;
    for account in ledger.into_accounts() {
        reconciler.import_account(account).await?;
    }
    let report = reconciler.push(dry_run).await?;

    if !dry_run {
        save_sink(reconciler.sink(), &config.sink.snapshot)?;
    }
    Ok(report)
}

async fn cmd_watch(config: &TallyConfig, args: &WatchArgs) -> anyhow::Result<()> {
    let period = Duration::from_secs(u64::from(args.every_days) * SECONDS_PER_DAY);
    let mut interval = tokio::time::interval(period);
    let mut last_sync: Option<NaiveDate> = None;

    println!(
        "Watching {} every {} day(s). Press Ctrl-C to stop.",
        args.source.display().to_string().bold(),
        args.every_days
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }

        let today = Local::now().date_naive();
        let window = watch_window(today, last_sync, args.every_days, config.sync.overlap_days);
        info!(from = %window.0, to = %window.1, "periodic sync starting");
        match run_once(config, &args.source, Some(window), config.sync.dry_run).await {
            Ok(report) => {
                print_report(&report);
                last_sync = Some(today);
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(error = %reason, "periodic sync failed");
            }
        }
    }
}

/// Dates a periodic run covers. Every run starts `overlap_days` before the
/// previous successful sync; the first run treats `every_days` ago as that.
pub fn watch_window(
    today: NaiveDate,
    last_sync: Option<NaiveDate>,
    every_days: u32,
    overlap_days: u32,
) -> (NaiveDate, NaiveDate) {
    let (anchor, back) = match last_sync {
        Some(previous) => (previous, u64::from(overlap_days)),
        None => (today, u64::from(every_days) + u64::from(overlap_days)),
    };
    let start = anchor
        .checked_sub_days(Days::new(back))
        .unwrap_or(NaiveDate::MIN)
        .min(today);
    (start, today)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Open the offline sink. A new sink starts with the configured category
/// group so transactions can be categorised.
fn load_sink(config: &TallyConfig) -> anyhow::Result<InMemorySink> {
    let path = &config.sink.snapshot;
    if path.exists() {
        let snapshot: SinkSnapshot = read_json(path)?;
        return Ok(InMemorySink::from_snapshot(snapshot));
    }
    info!(path = %path.display(), "no sink snapshot, starting empty");
    let sink = InMemorySink::new();
    sink.add_category_group(&config.sync.category_group)?;
    Ok(sink)
}

fn save_sink(sink: &InMemorySink, path: &Path) -> anyhow::Result<()> {
    let snapshot = sink.snapshot()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_report(report: &PushReport) {
    let mode = if report.dry_run { "Dry run".yellow().bold() } else { "Synced".green().bold() };
    println!("{} {} change(s)", "✓".green().bold(), report.mutation_count());
    println!("  Mode: {mode}");
    println!("  Accounts created: {}", report.accounts_created.to_string().cyan());
    println!("  Categories created: {}", report.categories_created.to_string().cyan());
    println!("  Transactions created: {}", report.transactions_created.to_string().cyan());
    println!("  Transactions updated: {}", report.transactions_updated.to_string().cyan());
}

fn print_plan(report: &PushReport) {
    if report.is_empty() {
        println!("{} Nothing to do.", "✓".green().bold());
        return;
    }
    for action in &report.actions {
        println!("  {} {}", "+".yellow(), action);
    }
    println!("{} planned change(s)", report.mutation_count().to_string().bold());
}
