// =============================================================================
// Session Stats — VWAP, spread history, relative volume
// =============================================================================
//
// Per-symbol accumulators maintained from the tape and from valid spread
// observations. VWAP runs from session start; the spread ring backs the
// 95th-percentile check in blueprint generation.
// =============================================================================

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::Trade;

/// Spread samples retained for the percentile computation.
const SPREAD_RING_CAPACITY: usize = 2_048;

/// Minimum samples before the percentile check applies.
pub const SPREAD_P95_MIN_SAMPLES: usize = 30;

/// Session-scope accumulators for one symbol.
#[derive(Debug, Default)]
pub struct SessionStats {
    vwap_notional: Decimal,
    vwap_volume: Decimal,
    last_trade_price: Option<Decimal>,
    spread_samples: VecDeque<Decimal>,
    twenty_day_avg_volume: Option<Decimal>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_trade(&mut self, trade: &Trade) {
        self.vwap_notional += trade.price * trade.size;
        self.vwap_volume += trade.size;
        self.last_trade_price = Some(trade.price);
    }

    /// Record a spread observation from a valid book.
    pub fn on_spread_sample(&mut self, spread: Decimal) {
        if self.spread_samples.len() == SPREAD_RING_CAPACITY {
            self.spread_samples.pop_front();
        }
        self.spread_samples.push_back(spread);
    }

    /// Seed the 20-day average volume used for relative-volume gating.
    pub fn seed_avg_volume(&mut self, twenty_day_avg_volume: Decimal) {
        self.twenty_day_avg_volume = Some(twenty_day_avg_volume);
    }

    /// Session volume-weighted average price; None before the first print.
    pub fn vwap(&self) -> Option<Decimal> {
        if self.vwap_volume.is_zero() {
            None
        } else {
            Some(self.vwap_notional / self.vwap_volume)
        }
    }

    /// True when the last print sits strictly above the session VWAP.
    pub fn vwap_reclaimed(&self) -> bool {
        match (self.last_trade_price, self.vwap()) {
            (Some(last), Some(vwap)) => last > vwap,
            _ => false,
        }
    }

    /// Rolling 95th-percentile spread; None with fewer than
    /// [`SPREAD_P95_MIN_SAMPLES`] observations.
    pub fn spread_p95(&self) -> Option<Decimal> {
        if self.spread_samples.len() < SPREAD_P95_MIN_SAMPLES {
            return None;
        }
        let mut sorted: Vec<Decimal> = self.spread_samples.iter().copied().collect();
        sorted.sort();
        let idx = ((sorted.len() as f64) * 0.95).floor() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Session volume relative to the seeded 20-day average.
    pub fn relative_volume(&self) -> Option<f64> {
        let avg = self.twenty_day_avg_volume?;
        if avg.is_zero() {
            return None;
        }
        (self.vwap_volume / avg).to_f64()
    }

    pub fn session_volume(&self) -> Decimal {
        self.vwap_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, size: Decimal, ts_ms: i64) -> Trade {
        Trade {
            symbol: "AAPL".into(),
            price,
            size,
            ts_ms,
        }
    }

    #[test]
    fn vwap_accumulates_from_tape() {
        let mut stats = SessionStats::new();
        assert!(stats.vwap().is_none());

        stats.on_trade(&trade(dec!(100.00), dec!(100), 1_000));
        stats.on_trade(&trade(dec!(102.00), dec!(300), 2_000));

        // (100*100 + 102*300) / 400 = 101.5
        assert_eq!(stats.vwap().unwrap(), dec!(101.5));
        assert_eq!(stats.session_volume(), dec!(400));
    }

    #[test]
    fn vwap_reclaim_requires_last_print_above_vwap() {
        let mut stats = SessionStats::new();
        stats.on_trade(&trade(dec!(100.00), dec!(100), 1_000));
        stats.on_trade(&trade(dec!(99.00), dec!(100), 2_000));
        assert!(!stats.vwap_reclaimed());

        stats.on_trade(&trade(dec!(101.00), dec!(100), 3_000));
        assert!(stats.vwap_reclaimed());
    }

    #[test]
    fn spread_percentile_needs_min_samples() {
        let mut stats = SessionStats::new();
        for _ in 0..(SPREAD_P95_MIN_SAMPLES - 1) {
            stats.on_spread_sample(dec!(0.02));
        }
        assert!(stats.spread_p95().is_none());

        stats.on_spread_sample(dec!(0.02));
        assert_eq!(stats.spread_p95().unwrap(), dec!(0.02));
    }

    #[test]
    fn spread_percentile_tracks_upper_tail() {
        let mut stats = SessionStats::new();
        for _ in 0..95 {
            stats.on_spread_sample(dec!(0.02));
        }
        for _ in 0..5 {
            stats.on_spread_sample(dec!(0.10));
        }
        let p95 = stats.spread_p95().unwrap();
        assert!(p95 >= dec!(0.02));
        assert!(p95 <= dec!(0.10));
    }

    #[test]
    fn relative_volume_from_seed() {
        let mut stats = SessionStats::new();
        assert!(stats.relative_volume().is_none());

        stats.seed_avg_volume(dec!(1000));
        stats.on_trade(&trade(dec!(100.00), dec!(250), 1_000));
        let rel = stats.relative_volume().unwrap();
        assert!((rel - 0.25).abs() < 1e-9);
    }
}
