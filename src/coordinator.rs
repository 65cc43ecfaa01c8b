// =============================================================================
// Signal Coordinator — shard-per-symbol pipeline driver
// =============================================================================
//
// Events shard by symbol hash onto a bounded worker pool; one worker owns all
// state for its symbols, so the hot path takes no locks. Each feed event runs
// the full pipeline: book/tracker updates, the metrics gate, trigger
// evaluation, validation, blueprint generation, scarcity, and journaling.
// Nothing propagates back to the feed; every failure becomes a journal record
// at most.
// =============================================================================

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::journal::{DecisionJournal, DecisionRecord, SessionMeta, SystemMetrics, UniverseUpdateInfo};
use crate::market_data::{
    BookInvalidReason, DepthDeltaTracker, OrderBook, SessionStats, WallTracker, TOP_K_LEVELS,
};
use crate::metrics::{MetricSnapshot, MetricsEngine};
use crate::runtime_config::RuntimeConfig;
use crate::signals::validator::tape_readiness;
use crate::signals::{
    Blueprint, BlueprintGenerator, Candidate, RejectReason, ScarcityController, SignalValidator,
    TraceEntry, Verdict,
};
use crate::types::{normalize_symbol, DepthOp, DepthUpdate, FeedEvent, Trade};

/// Per-shard event queue depth; the feed awaits when a shard lags.
const SHARD_QUEUE_CAPACITY: usize = 4_096;

/// Heartbeat cadence.
const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Upper bound on the worker pool.
const MAX_SHARDS: usize = 16;

// ---------------------------------------------------------------------------
// Outbound signal payload
// ---------------------------------------------------------------------------

/// Delivered to the downstream signal bus once per accepted signal.
#[derive(Debug, Clone)]
pub struct SignalAlert {
    pub decision_id: String,
    pub blueprint: Blueprint,
    pub snapshot: MetricSnapshot,
}

/// What one event produced, if anything.
pub enum PipelineOutput {
    Rejection(DecisionRecord),
    Signal {
        record: DecisionRecord,
        alert: SignalAlert,
    },
}

// ---------------------------------------------------------------------------
// Per-symbol pipeline
// ---------------------------------------------------------------------------

/// Everything one symbol needs, owned exclusively by its shard worker.
pub struct SymbolPipeline {
    symbol: String,
    book: OrderBook,
    deltas: DepthDeltaTracker,
    walls: WallTracker,
    stats: SessionStats,
    latest_snapshot: Option<MetricSnapshot>,
    config: Arc<RuntimeConfig>,
    scarcity: Arc<ScarcityController>,
    session: SessionMeta,
    clock: Arc<dyn Clock>,
}

impl SymbolPipeline {
    pub fn new(
        symbol: impl Into<String>,
        config: Arc<RuntimeConfig>,
        scarcity: Arc<ScarcityController>,
        session: SessionMeta,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            book: OrderBook::new(symbol.clone()),
            symbol,
            deltas: DepthDeltaTracker::new(),
            walls: WallTracker::new(),
            stats: SessionStats::new(),
            latest_snapshot: None,
            config,
            scarcity,
            session,
            clock,
        }
    }

    pub fn latest_snapshot(&self) -> Option<&MetricSnapshot> {
        self.latest_snapshot.as_ref()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn seed_avg_volume(&mut self, twenty_day_avg_volume: rust_decimal::Decimal) {
        self.stats.seed_avg_volume(twenty_day_avg_volume);
    }

    /// Apply one feed event and run the decision pipeline.
    pub fn handle_event(&mut self, event: &FeedEvent) -> Option<PipelineOutput> {
        let now_ms = match event {
            FeedEvent::Depth(update) => {
                self.apply_depth(update);
                update.ts_ms
            }
            FeedEvent::Trade(trade) => {
                self.book.apply_trade(trade.clone());
                self.stats.on_trade(trade);
                trade.ts_ms
            }
            FeedEvent::ConnectionState { connected, detail } => {
                info!(symbol = %self.symbol, connected, detail = %detail, "feed connection state");
                return None;
            }
            FeedEvent::Error { detail } => {
                warn!(symbol = %self.symbol, detail = %detail, "feed error event");
                return None;
            }
        };

        self.evaluate(now_ms)
    }

    fn apply_depth(&mut self, update: &DepthUpdate) {
        // For deletes the level leaves the ladder, so rank it first.
        let in_top_k = match update.op {
            DepthOp::Delete => self.book.is_within_top(update.side, update.price, TOP_K_LEVELS),
            DepthOp::Insert | DepthOp::Update => false,
        };
        self.book.apply_depth(update);
        let in_top_k = in_top_k
            || self.book.is_within_top(update.side, update.price, TOP_K_LEVELS);

        if in_top_k {
            self.deltas.record(update);
        }
        self.walls.observe(update);
    }

    /// Steps 2..7 of the pipeline at the driving event's timestamp.
    fn evaluate(&mut self, now_ms: i64) -> Option<PipelineOutput> {
        let decision_ts = self.clock.now_ms();

        // ── Gate: book validity ──────────────────────────────────────────
        let snapshot = match MetricsEngine::compute(
            &self.book,
            &mut self.deltas,
            &self.walls,
            now_ms,
            &self.config.book,
        ) {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                self.latest_snapshot = None;
                debug!(symbol = %self.symbol, reason = %reason, "book not measurable");
                if !self.config.journal.emit_gate_rejections {
                    return None;
                }
                // a symbol that never saw depth has no book context at all
                let reject_reason = if reason == BookInvalidReason::NoBook
                    && self.book.last_depth_ms() == 0
                {
                    RejectReason::MissingBookContext
                } else {
                    RejectReason::from_book(reason)
                };
                let trace = [TraceEntry::fail("book_valid", reason.as_str())];
                let record = DecisionRecord::rejection(
                    &self.session,
                    &self.symbol,
                    None,
                    reject_reason,
                    &trace,
                    Some(MetricSnapshot::zeroed(&self.symbol, now_ms)),
                    now_ms,
                    decision_ts,
                )
                .with_quality_flag(reason.as_str());
                return Some(PipelineOutput::Rejection(record));
            }
        };

        if let Some(spread) = self.book.spread() {
            self.stats.on_spread_sample(spread);
        }
        let previous_spread = self.latest_snapshot.as_ref().map(|s| s.spread);
        self.latest_snapshot = Some(snapshot.clone());

        // ── Gate: tape readiness ─────────────────────────────────────────
        let readiness = tape_readiness(&self.book, now_ms, &self.config);
        if !readiness.warmed_up || readiness.stale {
            let reason = if !readiness.warmed_up {
                RejectReason::NotReadyTapeNotWarmedUp
            } else {
                RejectReason::NotReadyTapeStale
            };
            if !self.config.journal.emit_gate_rejections {
                return None;
            }
            let trace = [TraceEntry::fail("tape_ready", reason.as_str())];
            let record = DecisionRecord::rejection(
                &self.session,
                &self.symbol,
                None,
                reason,
                &trace,
                Some(snapshot),
                now_ms,
                decision_ts,
            )
            .with_quality_flag(reason.as_str())
            .with_inputs(json!({
                "trades_in_warmup_window": readiness.trades_in_warmup_window,
                "warmed_up": readiness.warmed_up,
            }));
            return Some(PipelineOutput::Rejection(record));
        }

        // ── Trigger ──────────────────────────────────────────────────────
        let direction = MetricsEngine::directional_trigger(&snapshot, &self.config.metrics)?;

        // ── Validate ─────────────────────────────────────────────────────
        let candidate = Candidate {
            book: &self.book,
            snapshot: &snapshot,
            direction,
            previous_spread,
            vwap_reclaimed: self.stats.vwap_reclaimed(),
        };
        let (score, mut trace) = match SignalValidator::validate(&candidate, &self.config) {
            Verdict::Accept { score, trace } => (score, trace),
            Verdict::Reject { reason, trace } => {
                let record = DecisionRecord::rejection(
                    &self.session,
                    &self.symbol,
                    Some(direction),
                    reason,
                    &trace,
                    Some(snapshot),
                    now_ms,
                    decision_ts,
                );
                return Some(PipelineOutput::Rejection(record));
            }
        };

        // ── Blueprint ────────────────────────────────────────────────────
        let blueprint = match BlueprintGenerator::generate(
            &self.book,
            &snapshot,
            direction,
            score.total,
            &self.stats,
            &self.config.risk,
        ) {
            Ok(blueprint) => {
                trace.push(TraceEntry::pass("blueprint", "levels computed"));
                blueprint
            }
            Err(reason) => {
                trace.push(TraceEntry::fail("blueprint", reason.as_str()));
                let record = DecisionRecord::rejection(
                    &self.session,
                    &self.symbol,
                    Some(direction),
                    reason,
                    &trace,
                    Some(snapshot),
                    now_ms,
                    decision_ts,
                );
                return Some(PipelineOutput::Rejection(record));
            }
        };

        // ── Scarcity ─────────────────────────────────────────────────────
        if let Err(reason) = self.scarcity.admit(&self.symbol, now_ms) {
            trace.push(TraceEntry::fail("scarcity", reason.as_str()));
            let record = DecisionRecord::rejection(
                &self.session,
                &self.symbol,
                Some(direction),
                reason,
                &trace,
                Some(snapshot),
                now_ms,
                decision_ts,
            );
            return Some(PipelineOutput::Rejection(record));
        }
        trace.push(TraceEntry::pass("scarcity", "caps clear"));

        info!(
            symbol = %self.symbol,
            direction = %direction,
            score = score.total,
            entry = %blueprint.entry,
            stop = %blueprint.stop,
            target = %blueprint.target,
            size = blueprint.position_size,
            "signal accepted"
        );

        let record = DecisionRecord::signal(
            &self.session,
            snapshot.clone(),
            blueprint.clone(),
            &trace,
            decision_ts,
        );
        let alert = SignalAlert {
            decision_id: record.decision_id.clone(),
            blueprint,
            snapshot,
        };
        Some(PipelineOutput::Signal { record, alert })
    }
}

// ---------------------------------------------------------------------------
// Shard workers and the inbound handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SymbolLiveness {
    last_depth_ms: i64,
    last_tape_ms: i64,
}

enum ShardMsg {
    Event(FeedEvent),
    /// Retain only the given symbols; drop everything else.
    Universe(Arc<HashSet<String>>),
    WarmupVolume {
        symbol: String,
        twenty_day_avg_volume: rust_decimal::Decimal,
    },
}

/// Inbound interface handed to the feed collaborators.
#[derive(Clone)]
pub struct FeedHandle {
    shards: Arc<Vec<mpsc::Sender<ShardMsg>>>,
    shared: Arc<Shared>,
}

struct Shared {
    config: Arc<RuntimeConfig>,
    journal: DecisionJournal,
    session: SessionMeta,
    clock: Arc<dyn Clock>,
    universe: RwLock<HashSet<String>>,
    liveness: Arc<RwLock<HashMap<String, SymbolLiveness>>>,
}

impl FeedHandle {
    fn shard_for(&self, symbol: &str) -> &mpsc::Sender<ShardMsg> {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub async fn on_depth_update(&self, mut update: DepthUpdate) {
        update.symbol = normalize_symbol(&update.symbol);
        let shard = self.shard_for(&update.symbol);
        if shard.send(ShardMsg::Event(FeedEvent::Depth(update))).await.is_err() {
            warn!("depth update dropped: shard worker gone");
        }
    }

    pub async fn on_trade(&self, mut trade: Trade) {
        trade.symbol = normalize_symbol(&trade.symbol);
        let shard = self.shard_for(&trade.symbol);
        if shard.send(ShardMsg::Event(FeedEvent::Trade(trade))).await.is_err() {
            warn!("trade dropped: shard worker gone");
        }
    }

    /// Route any feed event, including connection-state notices.
    pub async fn on_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Depth(update) => self.on_depth_update(update).await,
            FeedEvent::Trade(trade) => self.on_trade(trade).await,
            other => {
                // no symbol affinity; the first shard logs it
                if let Some(shard) = self.shards.first() {
                    let _ = shard.send(ShardMsg::Event(other)).await;
                }
            }
        }
    }

    /// Replace the active subscription set. Evicted symbols drop their state
    /// after the replacement is journaled.
    pub async fn on_universe(&self, symbols: HashSet<String>) {
        let keep: Arc<HashSet<String>> =
            Arc::new(symbols.iter().map(|s| normalize_symbol(s)).collect());

        let (added, removed) = {
            let mut current = self.shared.universe.write();
            let added: Vec<String> = keep.difference(&current).cloned().collect();
            let removed: Vec<String> = current.difference(&keep).cloned().collect();
            *current = (*keep).clone();
            (added, removed)
        };

        info!(
            total = keep.len(),
            added = added.len(),
            removed = removed.len(),
            "universe replaced"
        );

        let info = UniverseUpdateInfo {
            added,
            removed,
            total: keep.len(),
        };
        self.shared.journal.enqueue(DecisionRecord::universe_update(
            &self.shared.session,
            info,
            self.shared.clock.now_ms(),
        ));

        for shard in self.shards.iter() {
            let _ = shard.send(ShardMsg::Universe(keep.clone())).await;
        }
    }

    /// Seed a symbol's 20-day average volume for relative-volume context.
    pub async fn on_warmup_volume(&self, symbol: &str, twenty_day_avg_volume: rust_decimal::Decimal) {
        let symbol = normalize_symbol(symbol);
        let shard = self.shard_for(&symbol);
        let _ = shard
            .send(ShardMsg::WarmupVolume {
                symbol,
                twenty_day_avg_volume,
            })
            .await;
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct SignalCoordinator {
    shards: Arc<Vec<mpsc::Sender<ShardMsg>>>,
    workers: Vec<JoinHandle<()>>,
    heartbeat: JoinHandle<()>,
    shared: Arc<Shared>,
}

impl SignalCoordinator {
    /// Spawn shard workers and the heartbeat task.
    pub fn start(
        config: Arc<RuntimeConfig>,
        journal: DecisionJournal,
        signal_tx: mpsc::UnboundedSender<SignalAlert>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shard_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_SHARDS);

        let session = SessionMeta::new(config.trading_mode);
        let scarcity = Arc::new(ScarcityController::new(config.scarcity.clone()));
        let liveness: Arc<RwLock<HashMap<String, SymbolLiveness>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let shared = Arc::new(Shared {
            config: config.clone(),
            journal: journal.clone(),
            session: session.clone(),
            clock: clock.clone(),
            universe: RwLock::new(config.symbols.iter().map(|s| normalize_symbol(s)).collect()),
            liveness: liveness.clone(),
        });

        let mut senders = Vec::with_capacity(shard_count);
        let mut workers = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let (tx, rx) = mpsc::channel(SHARD_QUEUE_CAPACITY);
            senders.push(tx);
            workers.push(tokio::spawn(shard_worker(
                shard_id,
                rx,
                config.clone(),
                scarcity.clone(),
                session.clone(),
                clock.clone(),
                journal.clone(),
                signal_tx.clone(),
                liveness.clone(),
            )));
        }

        info!(shard_count, session_id = %session.session_id, "signal coordinator started");

        let heartbeat = tokio::spawn(heartbeat_loop(shared.clone()));

        Self {
            shards: Arc::new(senders),
            workers,
            heartbeat,
            shared,
        }
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            shards: self.shards.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Stop accepting events, let workers drain, stop heartbeats.
    pub async fn shutdown(self) {
        drop(self.shards);
        self.heartbeat.abort();
        let _ = self.heartbeat.await;
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("signal coordinator drained");
    }
}

#[allow(clippy::too_many_arguments)]
async fn shard_worker(
    shard_id: usize,
    mut rx: mpsc::Receiver<ShardMsg>,
    config: Arc<RuntimeConfig>,
    scarcity: Arc<ScarcityController>,
    session: SessionMeta,
    clock: Arc<dyn Clock>,
    journal: DecisionJournal,
    signal_tx: mpsc::UnboundedSender<SignalAlert>,
    liveness: Arc<RwLock<HashMap<String, SymbolLiveness>>>,
) {
    let mut pipelines: HashMap<String, SymbolPipeline> = HashMap::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            ShardMsg::Event(event) => {
                let Some(symbol) = event.symbol().map(str::to_string) else {
                    // connection-state / error events carry no symbol
                    if let FeedEvent::Error { detail } = &event {
                        warn!(shard_id, detail = %detail, "feed error");
                    }
                    continue;
                };

                let pipeline = pipelines.entry(symbol.clone()).or_insert_with(|| {
                    SymbolPipeline::new(
                        symbol.clone(),
                        config.clone(),
                        scarcity.clone(),
                        session.clone(),
                        clock.clone(),
                    )
                });

                // A pipeline failure never reaches the feed; the event is
                // journaled as InternalError and dropped.
                let output = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    pipeline.handle_event(&event)
                })) {
                    Ok(output) => output,
                    Err(_) => {
                        let trace = [TraceEntry::fail("pipeline", "component panicked")];
                        let record = DecisionRecord::rejection(
                            &session,
                            &symbol,
                            None,
                            RejectReason::InternalError,
                            &trace,
                            None,
                            event.ts_ms().unwrap_or_else(|| clock.now_ms()),
                            clock.now_ms(),
                        );
                        warn!(
                            shard_id,
                            symbol = %symbol,
                            decision_id = %record.decision_id,
                            "pipeline panicked, event dropped"
                        );
                        Some(PipelineOutput::Rejection(record))
                    }
                };

                liveness.write().insert(
                    symbol,
                    SymbolLiveness {
                        last_depth_ms: pipeline.book().last_depth_ms(),
                        last_tape_ms: pipeline.book().last_tape_ms(),
                    },
                );

                match output {
                    Some(PipelineOutput::Rejection(record)) => journal.enqueue(record),
                    Some(PipelineOutput::Signal { record, alert }) => {
                        journal.enqueue(record);
                        if signal_tx.send(alert).is_err() {
                            warn!(shard_id, "signal sink closed");
                        }
                    }
                    None => {}
                }
            }
            ShardMsg::Universe(keep) => {
                let evicted: Vec<String> = pipelines
                    .keys()
                    .filter(|symbol| !keep.contains(*symbol))
                    .cloned()
                    .collect();
                if !evicted.is_empty() {
                    let mut live = liveness.write();
                    for symbol in &evicted {
                        pipelines.remove(symbol);
                        live.remove(symbol);
                        scarcity.forget_symbol(symbol);
                    }
                    debug!(
                        shard_id,
                        dropped = evicted.len(),
                        "evicted symbols after universe update"
                    );
                }
            }
            ShardMsg::WarmupVolume {
                symbol,
                twenty_day_avg_volume,
            } => {
                pipelines
                    .entry(symbol.clone())
                    .or_insert_with(|| {
                        SymbolPipeline::new(
                            symbol,
                            config.clone(),
                            scarcity.clone(),
                            session.clone(),
                            clock.clone(),
                        )
                    })
                    .seed_avg_volume(twenty_day_avg_volume);
            }
        }
    }

    debug!(shard_id, "shard worker drained");
}

/// Enqueue a heartbeat every minute with liveness aggregates.
async fn heartbeat_loop(shared: Arc<Shared>) {
    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    interval.tick().await; // immediate first tick consumed

    loop {
        interval.tick().await;
        let now_ms = shared.clock.now_ms();

        let (active, min_depth_age, min_tape_age) = {
            let live = shared.liveness.read();
            let min_depth_age = live
                .values()
                .filter(|l| l.last_depth_ms > 0)
                .map(|l| now_ms - l.last_depth_ms)
                .min();
            let min_tape_age = live
                .values()
                .filter(|l| l.last_tape_ms > 0)
                .map(|l| now_ms - l.last_tape_ms)
                .min();
            (live.len(), min_depth_age, min_tape_age)
        };

        let tape_recent = min_tape_age
            .map(|age| age <= shared.config.tape.stale_ms)
            .unwrap_or(false);

        let metrics = SystemMetrics {
            universe_count: shared.universe.read().len(),
            active_subscriptions: active,
            min_depth_age_ms: min_depth_age,
            min_tape_age_ms: min_tape_age,
            tape_recent,
        };
        shared
            .journal
            .enqueue(DecisionRecord::heartbeat(&shared.session, metrics, now_ms));
    }
}
