//! retention-runner: headless driver for the classification engine.
//!
//! Usage:
//!   retention-runner import  --namespace shop-1 --file dataset.json [--db retention.db]
//!   retention-runner analyze --namespace shop-1 [--reference-date 2024-06-30]
//!   retention-runner sweep   [--namespace shop-1] [--now 2024-07-01T09:00:00Z]
//!   retention-runner serve   [--interval-secs 60]
//!   retention-runner log     --namespace shop-1 [--mark-seen]
//!
//! Every command accepts `--config engine.json`; defaults apply otherwise.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use retention_core::{
    clock::{Clock, ManualClock, SystemClock},
    config::EngineConfig,
    contract::Notifier,
    error::EngineResult,
    event::NotificationEvent,
    record::Dataset,
    scheduler::{NotificationScheduler, SweepOutcome},
    compute_analysis, NamespaceStore, ValidatedConfig,
};
use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Writes each event as one JSON line on stdout.
struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn deliver(&self, event: &NotificationEvent) -> EngineResult<()> {
        let line = serde_json::json!({
            "event":   event,
            "message": event.message(),
        });
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}").map_err(anyhow::Error::from)?;
        stdout.flush().map_err(anyhow::Error::from)?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let db = flag(&args, "--db").unwrap_or("retention.db");

    let config = match flag(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    }
    .validate()?;

    let store = Arc::new(NamespaceStore::open_migrated(db)?);

    match command {
        "import"  => import(&args, &store),
        "analyze" => analyze(&args, &store, &config),
        "sweep"   => sweep(&args, store, config),
        "serve"   => serve(&args, store, config),
        "log"     => journal(&args, &store),
        _ => {
            eprintln!("usage: retention-runner <import|analyze|sweep|serve|log> [flags]");
            Ok(())
        }
    }
}

fn import(args: &[String], store: &NamespaceStore) -> Result<()> {
    let namespace = required(args, "--namespace")?;
    let path = required(args, "--file")?;
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let dataset: Dataset =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;

    let summary = store.replace_dataset(namespace, &dataset)?;
    println!("=== IMPORT ===");
    println!("  namespace:    {namespace}");
    println!("  customers:    {}", summary.customers);
    println!("  transactions: {}", summary.transactions);
    println!("  skipped:      {}", summary.skipped);
    println!("  pruned:       {}", summary.pruned);
    Ok(())
}

fn analyze(args: &[String], store: &NamespaceStore, config: &ValidatedConfig) -> Result<()> {
    use retention_core::contract::DatasetSource;

    let namespace = required(args, "--namespace")?;
    let reference_date = flag(args, "--reference-date")
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--reference-date must be YYYY-MM-DD")?;

    let dataset = store.load_dataset(namespace)?;
    let analysis = compute_analysis(&dataset, reference_date, config);
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn sweep(args: &[String], store: Arc<NamespaceStore>, config: ValidatedConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = match flag(args, "--now") {
        Some(s) => {
            let at = DateTime::parse_from_rfc3339(s)
                .context("--now must be an RFC 3339 timestamp")?
                .with_timezone(&Utc);
            Arc::new(ManualClock::new(at))
        }
        None => Arc::new(SystemClock),
    };
    let scheduler = build_scheduler(store, config, clock);

    let outcomes = match flag(args, "--namespace") {
        Some(namespace) => vec![SweepOutcome::Completed(scheduler.run_sweep(namespace)?)],
        None => scheduler.run_all()?,
    };
    print_outcomes(&outcomes);
    Ok(())
}

fn serve(args: &[String], store: Arc<NamespaceStore>, config: ValidatedConfig) -> Result<()> {
    let interval = parse_arg(args, "--interval-secs", config.notifications.sweep_interval_secs);
    if interval == 0 {
        bail!("--interval-secs must be at least 1");
    }
    let overridden = interval != config.notifications.sweep_interval_secs;
    let scheduler = Arc::new(build_scheduler(store, config, Arc::new(SystemClock)));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let handle = if overridden {
            scheduler.spawn_every(Duration::from_secs(interval))
        } else {
            scheduler.spawn()
        };
        log::info!("scheduler started, sweeping every {interval}s");
        tokio::signal::ctrl_c().await?;
        handle.abort();
        log::info!("scheduler stopped");
        Ok::<(), anyhow::Error>(())
    })
}

fn journal(args: &[String], store: &NamespaceStore) -> Result<()> {
    let namespace = required(args, "--namespace")?;
    for entry in store.notification_log(namespace)? {
        let seen = if entry.seen { "seen" } else { "new " };
        println!("  #{:<5} {seen} {} {}", entry.id, entry.sent_at, entry.event.message());
    }
    if args.iter().any(|a| a == "--mark-seen") {
        let marked = store.mark_notifications_seen(namespace)?;
        println!("  marked {marked} notifications as seen");
    }
    Ok(())
}

fn build_scheduler(
    store: Arc<NamespaceStore>,
    config: ValidatedConfig,
    clock: Arc<dyn Clock>,
) -> NotificationScheduler {
    NotificationScheduler::new(
        config,
        store.clone(),
        store,
        Arc::new(StdoutNotifier),
        clock,
    )
}

fn print_outcomes(outcomes: &[SweepOutcome]) {
    eprintln!("=== SWEEP SUMMARY ===");
    for outcome in outcomes {
        match outcome {
            SweepOutcome::Completed(r) => eprintln!(
                "  {:<20} customers={} alerts={} status_updates={} failures={}",
                r.namespace,
                r.customers,
                r.delivered.len(),
                r.status_updates,
                r.failures.len(),
            ),
            SweepOutcome::Skipped { namespace } => eprintln!("  {namespace:<20} skipped (busy)"),
            SweepOutcome::Failed { namespace, error } => eprintln!("  {namespace:<20} failed: {error}"),
        }
    }
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    flag(args, name).with_context(|| format!("missing {name}"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
