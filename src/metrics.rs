// =============================================================================
// Metrics Engine — microstructure snapshot from book + deltas + tape
// =============================================================================
//
// Pure function of (book, delta tracker, wall tracker, event timestamp).
// Hard gate: an invalid book produces no metrics. Time is always the driving
// event's timestamp, never the wall clock, so replaying a feed yields
// identical snapshots.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::market_data::{
    BookInvalidReason, DepthDeltaSnapshot, DepthDeltaTracker, OrderBook, WallTracker,
};
use crate::runtime_config::{BookConfig, MetricsConfig};
use crate::types::{Direction, Side};

/// Levels summed for the queue-imbalance ratio.
const IMBALANCE_TOP_N: usize = 4;

/// Lookback for the absorption rates.
const ABSORPTION_WINDOW_MS: i64 = 1_000;

/// Lookback and minimum sample count for the spoof score.
const SPOOF_WINDOW_MS: i64 = 5_000;
const SPOOF_MIN_TRADES: usize = 5;

/// Half-window for tape acceleration (current vs prior).
const ACCEL_WINDOW_MS: i64 = 3_000;

/// Immutable microstructure snapshot for one symbol at one event.
///
/// A zeroed snapshot (imbalance, acceleration and spread all zero) marks an
/// invalid book; consumers must not score it.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub symbol: String,
    pub ts_ms: i64,
    pub queue_imbalance: f64,
    pub bid_wall_age_ms: i64,
    pub ask_wall_age_ms: i64,
    pub bid_absorption_rate: Decimal,
    pub ask_absorption_rate: Decimal,
    pub spoof_score: f64,
    pub tape_acceleration: f64,
    pub trades_in_3s: u32,
    pub spread: Decimal,
    pub mid_price: Decimal,
    pub depth_deltas_1s: DepthDeltaSnapshot,
}

impl MetricSnapshot {
    /// Placeholder emitted alongside gate rejections.
    pub fn zeroed(symbol: impl Into<String>, ts_ms: i64) -> Self {
        Self {
            symbol: symbol.into(),
            ts_ms,
            queue_imbalance: 0.0,
            bid_wall_age_ms: 0,
            ask_wall_age_ms: 0,
            bid_absorption_rate: Decimal::ZERO,
            ask_absorption_rate: Decimal::ZERO,
            spoof_score: 0.0,
            tape_acceleration: 0.0,
            trades_in_3s: 0,
            spread: Decimal::ZERO,
            mid_price: Decimal::ZERO,
            depth_deltas_1s: DepthDeltaSnapshot::default(),
        }
    }

    pub fn is_zeroed(&self) -> bool {
        self.queue_imbalance == 0.0 && self.tape_acceleration == 0.0 && self.spread.is_zero()
    }

    pub fn prints_per_sec(&self) -> f64 {
        self.trades_in_3s as f64 / (ACCEL_WINDOW_MS as f64 / 1_000.0)
    }
}

/// Stateless snapshot builder; all inputs are passed per call.
pub struct MetricsEngine;

impl MetricsEngine {
    /// Build a snapshot at the driving event's timestamp, or report why the
    /// book is not in a measurable state.
    pub fn compute(
        book: &OrderBook,
        deltas: &mut DepthDeltaTracker,
        walls: &WallTracker,
        now_ms: i64,
        book_config: &BookConfig,
    ) -> Result<MetricSnapshot, BookInvalidReason> {
        book.is_valid(now_ms, book_config)?;

        // is_valid guarantees both sides are present past this point.
        let (best_bid, bid_level) = book.best_bid().ok_or(BookInvalidReason::NoBook)?;
        let (best_ask, ask_level) = book.best_ask().ok_or(BookInvalidReason::NoBook)?;

        let bid_top = book.top_n_size(Side::Bid, IMBALANCE_TOP_N);
        let ask_top = book.top_n_size(Side::Ask, IMBALANCE_TOP_N);
        let queue_imbalance = if ask_top.is_zero() {
            f64::INFINITY
        } else {
            (bid_top / ask_top).to_f64().unwrap_or(0.0)
        };

        let bid_wall_age_ms = walls
            .level_age_ms(Side::Bid, best_bid, now_ms)
            .unwrap_or_else(|| (now_ms - bid_level.first_seen_ms).max(0));
        let ask_wall_age_ms = walls
            .level_age_ms(Side::Ask, best_ask, now_ms)
            .unwrap_or_else(|| (now_ms - ask_level.first_seen_ms).max(0));

        let (bid_absorption_rate, ask_absorption_rate) =
            absorption_rates(book, best_bid, best_ask, now_ms);

        let spoof_score = spoof_score(book, now_ms);
        let (tape_acceleration, trades_in_3s) = tape_acceleration(book, now_ms);

        let spread = best_ask - best_bid;
        let mid_price = (best_bid + best_ask) / Decimal::TWO;

        Ok(MetricSnapshot {
            symbol: book.symbol().to_string(),
            ts_ms: now_ms,
            queue_imbalance,
            bid_wall_age_ms,
            ask_wall_age_ms,
            bid_absorption_rate,
            ask_absorption_rate,
            spoof_score,
            tape_acceleration,
            trades_in_3s,
            spread,
            mid_price,
            depth_deltas_1s: deltas.combined_1s(now_ms),
        })
    }

    /// Directional liquidity-failure trigger, if armed.
    pub fn directional_trigger(
        snapshot: &MetricSnapshot,
        config: &MetricsConfig,
    ) -> Option<Direction> {
        if snapshot.is_zeroed() {
            return None;
        }

        let accelerated = snapshot.tape_acceleration >= config.tape_acceleration_threshold;

        if snapshot.queue_imbalance >= config.queue_imbalance_buy
            && snapshot.bid_wall_age_ms >= config.wall_persistence_ms
            && accelerated
        {
            return Some(Direction::Buy);
        }

        if snapshot.queue_imbalance <= config.queue_imbalance_sell
            && snapshot.ask_wall_age_ms >= config.wall_persistence_ms
            && accelerated
        {
            return Some(Direction::Sell);
        }

        None
    }
}

/// Volume traded into each best level over the last second: prints priced at
/// or through best bid (bid side) / best ask (ask side).
fn absorption_rates(
    book: &OrderBook,
    best_bid: Decimal,
    best_ask: Decimal,
    now_ms: i64,
) -> (Decimal, Decimal) {
    let mut bid_absorbed = Decimal::ZERO;
    let mut ask_absorbed = Decimal::ZERO;
    for trade in book.trades_within(now_ms, ABSORPTION_WINDOW_MS) {
        if trade.price <= best_bid {
            bid_absorbed += trade.size;
        }
        if trade.price >= best_ask {
            ask_absorbed += trade.size;
        }
    }
    (bid_absorbed, ask_absorbed)
}

/// clamp(2 - max/mean, 0, 1) over the last five seconds of prints; 0.5 when
/// fewer than five prints are available.
fn spoof_score(book: &OrderBook, now_ms: i64) -> f64 {
    let mut count = 0usize;
    let mut sum = Decimal::ZERO;
    let mut max = Decimal::ZERO;
    for trade in book.trades_within(now_ms, SPOOF_WINDOW_MS) {
        count += 1;
        sum += trade.size;
        max = max.max(trade.size);
    }

    if count < SPOOF_MIN_TRADES || sum.is_zero() {
        return 0.5;
    }

    let mean = sum.to_f64().unwrap_or(0.0) / count as f64;
    if mean <= 0.0 {
        return 0.5;
    }
    let ratio = max.to_f64().unwrap_or(0.0) / mean;
    (2.0 - ratio).clamp(0.0, 1.0)
}

/// Prints in (now-3s, now] over prints in (now-6s, now-3s].
fn tape_acceleration(book: &OrderBook, now_ms: i64) -> (f64, u32) {
    let mut current = 0u32;
    let mut prior = 0u32;
    for trade in book.trades_within(now_ms, 2 * ACCEL_WINDOW_MS) {
        if trade.ts_ms > now_ms - ACCEL_WINDOW_MS {
            current += 1;
        } else {
            prior += 1;
        }
    }

    let accel = if (current + prior) < 2 {
        0.0
    } else if prior == 0 {
        1.0
    } else {
        current as f64 / prior as f64
    };

    (accel, current)
}
