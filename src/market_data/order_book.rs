// =============================================================================
// Order Book — per-symbol depth ladders and tape ring
// =============================================================================
//
// Authoritative per-symbol state maintained from depth deltas. Ladders are
// BTreeMaps keyed by price: bids iterate descending, asks ascending. A level
// with zero size is never stored. Crossed books are not auto-repaired; they
// fail validity until the next update resolves them.
// =============================================================================

use std::collections::{BTreeMap, VecDeque};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::runtime_config::BookConfig;
use crate::types::{DepthOp, DepthUpdate, Side, Trade};

/// Capacity of the recent-trades ring.
const TRADE_RING_CAPACITY: usize = 1024;

/// One price level of a ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub size: Decimal,
    pub first_seen_ms: i64,
    pub last_update_ms: i64,
}

/// Why a book currently fails validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookInvalidReason {
    NoBook,
    Crossed,
    SpreadWide,
    DepthStale,
    ZeroSize,
}

impl BookInvalidReason {
    /// Stable tag used in journal records and traces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoBook => "NoBook",
            Self::Crossed => "Crossed",
            Self::SpreadWide => "SpreadWide",
            Self::DepthStale => "DepthStale",
            Self::ZeroSize => "ZeroSize",
        }
    }
}

impl std::fmt::Display for BookInvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol order-book and tape state.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Decimal, Level>,
    asks: BTreeMap<Decimal, Level>,
    recent_trades: VecDeque<Trade>,
    last_depth_ms: i64,
    last_tape_ms: i64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            recent_trades: VecDeque::with_capacity(TRADE_RING_CAPACITY),
            last_depth_ms: 0,
            last_tape_ms: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Apply a depth delta to the matching ladder.
    ///
    /// Insert at an existing price overwrites the size (levels are
    /// aggregates); `first_seen_ms` is preserved across overwrites. A size of
    /// zero removes the level. Out-of-order timestamps are accepted but the
    /// level's `last_update_ms` never moves backwards.
    pub fn apply_depth(&mut self, update: &DepthUpdate) {
        let ladder = match update.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        match update.op {
            DepthOp::Insert | DepthOp::Update => {
                if update.size.is_zero() {
                    ladder.remove(&update.price);
                } else {
                    ladder
                        .entry(update.price)
                        .and_modify(|level| {
                            level.size = update.size;
                            level.last_update_ms = level.last_update_ms.max(update.ts_ms);
                        })
                        .or_insert(Level {
                            size: update.size,
                            first_seen_ms: update.ts_ms,
                            last_update_ms: update.ts_ms,
                        });
                }
            }
            DepthOp::Delete => {
                ladder.remove(&update.price);
            }
        }

        self.last_depth_ms = self.last_depth_ms.max(update.ts_ms);
    }

    /// Push a print into the tape ring, evicting the oldest when full.
    pub fn apply_trade(&mut self, trade: Trade) {
        self.last_tape_ms = self.last_tape_ms.max(trade.ts_ms);
        if self.recent_trades.len() == TRADE_RING_CAPACITY {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back(trade);
    }

    pub fn best_bid(&self) -> Option<(Decimal, &Level)> {
        self.bids.iter().next_back().map(|(p, l)| (*p, l))
    }

    pub fn best_ask(&self) -> Option<(Decimal, &Level)> {
        self.asks.iter().next().map(|(p, l)| (*p, l))
    }

    /// Sum of the top `n` level sizes on one side.
    pub fn top_n_size(&self, side: Side, n: usize) -> Decimal {
        match side {
            Side::Bid => self.bids.values().rev().take(n).map(|l| l.size).sum(),
            Side::Ask => self.asks.values().take(n).map(|l| l.size).sum(),
        }
    }

    /// Whether `price` sits within the top `k` levels of `side`.
    pub fn is_within_top(&self, side: Side, price: Decimal, k: usize) -> bool {
        match side {
            Side::Bid => self.bids.keys().rev().take(k).any(|p| *p == price),
            Side::Ask => self.asks.keys().take(k).any(|p| *p == price),
        }
    }

    /// `best_ask - best_bid`; None when either side is empty.
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        Some(ask - bid)
    }

    pub fn recent_trades(&self) -> &VecDeque<Trade> {
        &self.recent_trades
    }

    pub fn last_depth_ms(&self) -> i64 {
        self.last_depth_ms
    }

    pub fn last_tape_ms(&self) -> i64 {
        self.last_tape_ms
    }

    /// Prints whose `ts_ms` falls in `(now - window_ms, now]`.
    pub fn trades_within(&self, now_ms: i64, window_ms: i64) -> impl Iterator<Item = &Trade> {
        let cutoff = now_ms - window_ms;
        self.recent_trades
            .iter()
            .rev()
            .take_while(move |t| t.ts_ms > cutoff)
    }

    /// Full validity predicate for metric computation.
    pub fn is_valid(&self, now_ms: i64, config: &BookConfig) -> Result<(), BookInvalidReason> {
        let (best_bid, bid_level) = self.best_bid().ok_or(BookInvalidReason::NoBook)?;
        let (best_ask, ask_level) = self.best_ask().ok_or(BookInvalidReason::NoBook)?;

        if best_bid >= best_ask {
            return Err(BookInvalidReason::Crossed);
        }

        let spread = best_ask - best_bid;
        if spread <= Decimal::ZERO || spread > config.max_spread_abs {
            return Err(BookInvalidReason::SpreadWide);
        }

        if now_ms - self.last_depth_ms > config.depth_stale_ms {
            return Err(BookInvalidReason::DepthStale);
        }

        if bid_level.size <= Decimal::ZERO || ask_level.size <= Decimal::ZERO {
            return Err(BookInvalidReason::ZeroSize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn depth(side: Side, op: DepthOp, price: Decimal, size: Decimal, ts_ms: i64) -> DepthUpdate {
        DepthUpdate {
            symbol: "AAPL".into(),
            side,
            op,
            price,
            size,
            prev_size: Decimal::ZERO,
            ts_ms,
        }
    }

    fn valid_book(ts_ms: i64) -> OrderBook {
        let mut book = OrderBook::new("AAPL");
        book.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(100.00), dec!(500), ts_ms));
        book.apply_depth(&depth(Side::Ask, DepthOp::Insert, dec!(100.02), dec!(400), ts_ms));
        book
    }

    #[test]
    fn insert_update_delete_lifecycle() {
        let mut book = OrderBook::new("AAPL");
        book.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(100.00), dec!(500), 1_000));
        assert_eq!(book.best_bid().unwrap().0, dec!(100.00));

        book.apply_depth(&depth(Side::Bid, DepthOp::Update, dec!(100.00), dec!(300), 2_000));
        let (_, level) = book.best_bid().unwrap();
        assert_eq!(level.size, dec!(300));
        assert_eq!(level.first_seen_ms, 1_000);
        assert_eq!(level.last_update_ms, 2_000);

        book.apply_depth(&depth(Side::Bid, DepthOp::Delete, dec!(100.00), dec!(0), 3_000));
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn update_to_zero_size_removes_level() {
        let mut book = OrderBook::new("AAPL");
        book.apply_depth(&depth(Side::Ask, DepthOp::Insert, dec!(100.02), dec!(400), 1_000));
        book.apply_depth(&depth(Side::Ask, DepthOp::Update, dec!(100.02), dec!(0), 2_000));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn out_of_order_timestamps_clamp_last_update() {
        let mut book = OrderBook::new("AAPL");
        book.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(100.00), dec!(500), 5_000));
        book.apply_depth(&depth(Side::Bid, DepthOp::Update, dec!(100.00), dec!(400), 4_000));
        let (_, level) = book.best_bid().unwrap();
        // accepted, but the level timestamp never moves backwards
        assert_eq!(level.size, dec!(400));
        assert_eq!(level.last_update_ms, 5_000);
        assert_eq!(book.last_depth_ms(), 5_000);
    }

    #[test]
    fn ladders_iterate_best_first() {
        let mut book = valid_book(1_000);
        book.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(99.99), dec!(200), 1_000));
        book.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(99.98), dec!(100), 1_000));
        book.apply_depth(&depth(Side::Ask, DepthOp::Insert, dec!(100.03), dec!(50), 1_000));

        assert_eq!(book.best_bid().unwrap().0, dec!(100.00));
        assert_eq!(book.best_ask().unwrap().0, dec!(100.02));
        assert_eq!(book.top_n_size(Side::Bid, 2), dec!(700));
        assert_eq!(book.top_n_size(Side::Ask, 4), dec!(450));
        assert!(book.is_within_top(Side::Bid, dec!(99.99), 2));
        assert!(!book.is_within_top(Side::Bid, dec!(99.98), 2));
    }

    #[test]
    fn determinism_same_sequence_same_ladders() {
        let updates = vec![
            depth(Side::Bid, DepthOp::Insert, dec!(100.00), dec!(500), 1_000),
            depth(Side::Ask, DepthOp::Insert, dec!(100.02), dec!(400), 1_001),
            depth(Side::Bid, DepthOp::Update, dec!(100.00), dec!(450), 1_002),
            depth(Side::Bid, DepthOp::Insert, dec!(99.99), dec!(200), 1_003),
            depth(Side::Ask, DepthOp::Delete, dec!(100.02), dec!(0), 1_004),
            depth(Side::Ask, DepthOp::Insert, dec!(100.01), dec!(300), 1_005),
        ];

        let mut a = OrderBook::new("AAPL");
        let mut b = OrderBook::new("AAPL");
        for u in &updates {
            a.apply_depth(u);
        }
        for u in &updates {
            b.apply_depth(u);
        }

        assert_eq!(a.bids, b.bids);
        assert_eq!(a.asks, b.asks);
        assert_eq!(a.last_depth_ms(), b.last_depth_ms());
    }

    #[test]
    fn trade_ring_evicts_oldest_at_capacity() {
        let mut book = OrderBook::new("AAPL");
        for i in 0..(TRADE_RING_CAPACITY + 10) {
            book.apply_trade(Trade {
                symbol: "AAPL".into(),
                price: dec!(100.00),
                size: dec!(1),
                ts_ms: i as i64,
            });
        }
        assert_eq!(book.recent_trades().len(), TRADE_RING_CAPACITY);
        assert_eq!(book.recent_trades().front().unwrap().ts_ms, 10);
        assert_eq!(book.last_tape_ms(), (TRADE_RING_CAPACITY + 9) as i64);
    }

    #[test]
    fn validity_reasons() {
        let config = BookConfig::default();

        let empty = OrderBook::new("AAPL");
        assert_eq!(empty.is_valid(1_000, &config), Err(BookInvalidReason::NoBook));

        let mut crossed = OrderBook::new("AAPL");
        crossed.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(100.05), dec!(100), 1_000));
        crossed.apply_depth(&depth(Side::Ask, DepthOp::Insert, dec!(100.00), dec!(100), 1_000));
        assert_eq!(crossed.is_valid(1_000, &config), Err(BookInvalidReason::Crossed));

        let mut wide = OrderBook::new("AAPL");
        wide.apply_depth(&depth(Side::Bid, DepthOp::Insert, dec!(100.00), dec!(100), 1_000));
        wide.apply_depth(&depth(Side::Ask, DepthOp::Insert, dec!(100.15), dec!(100), 1_000));
        assert_eq!(wide.is_valid(1_000, &config), Err(BookInvalidReason::SpreadWide));

        let stale = valid_book(1_000);
        assert_eq!(stale.is_valid(4_000, &config), Err(BookInvalidReason::DepthStale));

        let ok = valid_book(1_000);
        assert_eq!(ok.is_valid(2_500, &config), Ok(()));
    }

    #[test]
    fn trades_within_window() {
        let mut book = valid_book(1_000);
        for ts in [500, 1_200, 1_800, 2_400] {
            book.apply_trade(Trade {
                symbol: "AAPL".into(),
                price: dec!(100.01),
                size: dec!(10),
                ts_ms: ts,
            });
        }
        let count = book.trades_within(2_500, 1_000).count();
        assert_eq!(count, 2); // 1_800 and 2_400
    }
}
