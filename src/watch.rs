//! Ingest cycles and the watch loop.
//!
//! A cycle is one inbox sweep followed by observing whatever it archived.
//! The watch loop runs cycles back to back with `interval` between them and
//! only checks for shutdown while waiting, so a cycle always completes.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use tabvault_core::store::MetadataStore;

use crate::config::Config;
use crate::ingest::{IngestStats, Ingestor, SweepReport};
use crate::observer::{BatchReport, Observer};
use crate::sqlite_store::SqliteStore;

pub struct CycleReport {
    pub sweep: SweepReport,
    pub batch: BatchReport,
}

/// Sweep the inbox once and observe the newly archived sessions.
pub async fn run_cycle<S>(
    ingestor: &Ingestor,
    store: &S,
    observer: &mut Observer,
) -> Result<CycleReport>
where
    S: MetadataStore + ?Sized,
{
    let sweep = ingestor.sweep(store).await?;
    let batch = observer.observe_batch(&sweep.archived)?;
    Ok(CycleReport { sweep, batch })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: usize,
    pub stats: IngestStats,
    pub observed: usize,
}

/// Run cycles until `shutdown` resolves.
///
/// Items still in the inbox when shutdown arrives are picked up by the next
/// run; dedup makes resuming idempotent.
pub async fn run_watch<S, F>(
    ingestor: &Ingestor,
    store: &S,
    observer: &mut Observer,
    interval: Duration,
    shutdown: F,
) -> Result<WatchSummary>
where
    S: MetadataStore + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut summary = WatchSummary::default();

    loop {
        let cycle = run_cycle(ingestor, store, observer).await?;
        summary.cycles += 1;
        summary.stats.merge(&cycle.sweep.stats);
        summary.observed += cycle.batch.observed;

        if cycle.sweep.stats.total() > 0 {
            let s = cycle.sweep.stats;
            println!(
                "processed {} | duplicates {} | quarantined {} | errored {}",
                s.processed, s.duplicates, s.quarantined, s.errored
            );
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(cycles = summary.cycles, "watch stopped");
    Ok(summary)
}

/// Run the watch command until Ctrl-C.
pub async fn run(config: &Config, interval_secs: Option<u64>) -> Result<()> {
    let interval = interval_secs.unwrap_or(config.watch.interval_secs);
    if interval == 0 {
        anyhow::bail!("--interval must be > 0");
    }
    let ingestor = Ingestor::from_config(config)?;
    let mut observer = Observer::from_config(config)?;
    let store = SqliteStore::open(config).await?;

    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        ingestor.inbox().display(),
        interval
    );
    let summary = run_watch(
        &ingestor,
        &store,
        &mut observer,
        Duration::from_secs(interval),
        shutdown_signal(),
    )
    .await?;
    store.close().await;

    println!(
        "Watch stopped after {} cycles: processed {}, duplicates {}, quarantined {}, errored {}",
        summary.cycles,
        summary.stats.processed,
        summary.stats.duplicates,
        summary.stats.quarantined,
        summary.stats.errored
    );
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
