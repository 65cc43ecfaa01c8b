// =============================================================================
// bookpulse — Liquidity-Dislocation Signal Pipeline
// =============================================================================
//
// Ingests Level-II depth and time-and-sales events, maintains per-symbol
// book state, and emits human-executable trade blueprints when transient
// liquidity dislocations pass scoring, gating, and scarcity rules. The
// engine never places orders.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod clock;
mod coordinator;
mod journal;
mod market_data;
mod metrics;
mod runtime_config;
mod signals;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::coordinator::{SignalAlert, SignalCoordinator};
use crate::journal::DecisionJournal;
use crate::runtime_config::RuntimeConfig;
use crate::types::FeedEvent;

/// Journal drain deadline on shutdown.
const JOURNAL_DRAIN_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("bookpulse starting up");

    let config_path =
        std::env::var("BOOKPULSE_CONFIG").unwrap_or_else(|_| "runtime_config.json".into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("BOOKPULSE_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    info!(
        symbols = ?config.symbols,
        trading_mode = %config.trading_mode,
        journal = %config.journal.path,
        "configuration resolved"
    );

    let config = Arc::new(config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── 2. Decision journal ──────────────────────────────────────────────
    let (journal, journal_handle) = DecisionJournal::spawn(
        &config.journal.path,
        config.journal.queue_capacity,
        clock.clone(),
    )?;

    // ── 3. Signal sink ───────────────────────────────────────────────────
    // Downstream consumers (execution subsystem, notifications) attach here;
    // the default consumer surfaces accepted blueprints in the log.
    let (signal_tx, mut signal_rx) = tokio::sync::mpsc::unbounded_channel::<SignalAlert>();
    tokio::spawn(async move {
        while let Some(alert) = signal_rx.recv().await {
            info!(
                decision_id = %alert.decision_id,
                symbol = %alert.blueprint.symbol,
                direction = %alert.blueprint.direction,
                entry = %alert.blueprint.entry,
                stop = %alert.blueprint.stop,
                target = %alert.blueprint.target,
                size = alert.blueprint.position_size,
                score = alert.blueprint.score,
                "signal emitted"
            );
        }
    });

    // ── 4. Coordinator & feed boundary ───────────────────────────────────
    let coordinator =
        SignalCoordinator::start(config.clone(), journal.clone(), signal_tx, clock.clone());
    let feed = coordinator.handle();

    // Optional deterministic replay: a JSONL file of feed events driven
    // through the full pipeline instead of a live broker client.
    if let Ok(replay_path) = std::env::var("BOOKPULSE_REPLAY") {
        let replay_feed = feed.clone();
        tokio::spawn(async move {
            match std::fs::read_to_string(&replay_path) {
                Ok(content) => {
                    let mut count = 0u64;
                    let mut bad = 0u64;
                    for line in content.lines().filter(|l| !l.trim().is_empty()) {
                        match serde_json::from_str::<FeedEvent>(line) {
                            Ok(event) => {
                                replay_feed.on_event(event).await;
                                count += 1;
                            }
                            Err(e) => {
                                bad += 1;
                                warn!(error = %e, "skipping malformed replay line");
                            }
                        }
                    }
                    info!(path = %replay_path, count, bad, "replay complete");
                }
                Err(e) => error!(path = %replay_path, error = %e, "failed to read replay file"),
            }
        });
    }

    info!("all subsystems running; press Ctrl+C to stop");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, draining");

    drop(feed);
    coordinator.shutdown().await;

    let dropped = journal.dropped_count();
    if dropped > 0 {
        warn!(dropped, "journal records dropped this session");
    }
    drop(journal);

    match tokio::time::timeout(
        tokio::time::Duration::from_secs(JOURNAL_DRAIN_SECS),
        journal_handle,
    )
    .await
    {
        Ok(Ok(())) => info!("journal drained and synced"),
        Ok(Err(e)) => error!(error = %e, "journal writer task failed"),
        Err(_) => warn!(deadline_secs = JOURNAL_DRAIN_SECS, "journal drain deadline hit"),
    }

    info!("bookpulse shut down complete");
    Ok(())
}
