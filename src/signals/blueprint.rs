// =============================================================================
// Blueprint Generator — price levels and size for human execution
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::market_data::{OrderBook, SessionStats};
use crate::metrics::MetricSnapshot;
use crate::runtime_config::RiskConfig;
use crate::signals::validator::RejectReason;
use crate::types::Direction;

/// Stop distance in spread multiples; target is twice that (2:1 reward/risk).
const STOP_SPREAD_MULT: Decimal = Decimal::from_parts(4, 0, 0, false, 0);
const TARGET_SPREAD_MULT: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

/// An executable plan emitted with an accepted signal.
#[derive(Debug, Clone, Serialize)]
pub struct Blueprint {
    pub symbol: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
    pub score: f64,
    pub position_size: u64,
    pub ts_ms: i64,
}

pub struct BlueprintGenerator;

impl BlueprintGenerator {
    /// Build a blueprint from an accepted snapshot, or reject when the
    /// context argues against execution.
    pub fn generate(
        book: &OrderBook,
        snapshot: &MetricSnapshot,
        direction: Direction,
        score: f64,
        stats: &SessionStats,
        risk: &RiskConfig,
    ) -> Result<Blueprint, RejectReason> {
        let (best_bid, _) = book.best_bid().ok_or(RejectReason::NotReadyNoDepth)?;
        let (best_ask, _) = book.best_ask().ok_or(RejectReason::NotReadyNoDepth)?;

        let entry = match direction {
            Direction::Buy => best_ask,
            Direction::Sell => best_bid,
        };

        // A plan that enters on the wrong side of VWAP is not worth waking a
        // human for.
        if let Some(vwap) = stats.vwap() {
            let wrong_side = match direction {
                Direction::Buy => entry <= vwap,
                Direction::Sell => entry >= vwap,
            };
            if wrong_side {
                return Err(RejectReason::NotAboveVwap);
            }
        }

        if let Some(p95) = stats.spread_p95() {
            if snapshot.spread > p95 {
                return Err(RejectReason::SpreadExceedsHistorical);
            }
        }

        let risk_per_share = snapshot.spread * STOP_SPREAD_MULT;
        let reward = snapshot.spread * TARGET_SPREAD_MULT;
        let (stop, target) = match direction {
            Direction::Buy => (entry - risk_per_share, entry + reward),
            Direction::Sell => (entry + risk_per_share, entry - reward),
        };

        let max_risk = risk.account_equity * risk.per_trade_pct;
        let position_size = if risk_per_share > Decimal::ZERO {
            (max_risk / risk_per_share)
                .floor()
                .to_u64()
                .unwrap_or(0)
        } else {
            0
        };
        if position_size == 0 {
            return Err(RejectReason::SizeTooSmall);
        }

        Ok(Blueprint {
            symbol: snapshot.symbol.clone(),
            direction,
            entry,
            stop,
            target,
            score,
            position_size,
            ts_ms: snapshot.ts_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DepthOp, DepthUpdate, Side, Trade};
    use rust_decimal_macros::dec;

    fn book_with(bid: Decimal, ask: Decimal) -> OrderBook {
        let mut book = OrderBook::new("AAPL");
        for (side, price) in [(Side::Bid, bid), (Side::Ask, ask)] {
            book.apply_depth(&DepthUpdate {
                symbol: "AAPL".into(),
                side,
                op: DepthOp::Insert,
                price,
                size: dec!(500),
                prev_size: Decimal::ZERO,
                ts_ms: 1_000,
            });
        }
        book
    }

    fn snapshot(spread: Decimal) -> MetricSnapshot {
        let mut snap = MetricSnapshot::zeroed("AAPL", 2_000);
        snap.spread = spread;
        snap.queue_imbalance = 3.3;
        snap.tape_acceleration = 2.5;
        snap
    }

    fn stats_below(entry: Decimal) -> SessionStats {
        // one print well below entry keeps VWAP below it
        let mut stats = SessionStats::new();
        stats.on_trade(&Trade {
            symbol: "AAPL".into(),
            price: entry - dec!(0.50),
            size: dec!(100),
            ts_ms: 1_000,
        });
        stats
    }

    #[test]
    fn buy_blueprint_levels_and_size() {
        let book = book_with(dec!(100.00), dec!(100.02));
        let snap = snapshot(dec!(0.02));
        let stats = stats_below(dec!(100.02));
        let risk = RiskConfig::default(); // 25k equity, 0.25% risk

        let bp = BlueprintGenerator::generate(
            &book,
            &snap,
            Direction::Buy,
            8.0,
            &stats,
            &risk,
        )
        .unwrap();

        assert_eq!(bp.entry, dec!(100.02));
        assert_eq!(bp.stop, dec!(99.94)); // entry - 4 * 0.02
        assert_eq!(bp.target, dec!(100.18)); // entry + 8 * 0.02
        // 25_000 * 0.0025 / 0.08 = 781.25 -> 781 shares
        assert_eq!(bp.position_size, 781);
        assert!(bp.stop < bp.entry && bp.entry < bp.target);
    }

    #[test]
    fn sell_blueprint_mirrors_levels() {
        let book = book_with(dec!(100.00), dec!(100.02));
        let snap = snapshot(dec!(0.02));
        // VWAP above entry for a sell
        let mut stats = SessionStats::new();
        stats.on_trade(&Trade {
            symbol: "AAPL".into(),
            price: dec!(100.50),
            size: dec!(100),
            ts_ms: 1_000,
        });

        let bp = BlueprintGenerator::generate(
            &book,
            &snap,
            Direction::Sell,
            8.0,
            &stats,
            &RiskConfig::default(),
        )
        .unwrap();

        assert_eq!(bp.entry, dec!(100.00));
        assert!(bp.target < bp.entry && bp.entry < bp.stop);
    }

    #[test]
    fn rejects_entry_below_vwap() {
        let book = book_with(dec!(100.00), dec!(100.02));
        let snap = snapshot(dec!(0.02));
        let mut stats = SessionStats::new();
        stats.on_trade(&Trade {
            symbol: "AAPL".into(),
            price: dec!(101.00), // VWAP above the ask
            size: dec!(100),
            ts_ms: 1_000,
        });

        let err = BlueprintGenerator::generate(
            &book,
            &snap,
            Direction::Buy,
            8.0,
            &stats,
            &RiskConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, RejectReason::NotAboveVwap);
    }

    #[test]
    fn rejects_spread_above_historical_p95() {
        let book = book_with(dec!(100.00), dec!(100.06));
        let snap = snapshot(dec!(0.06));
        let mut stats = stats_below(dec!(100.06));
        for _ in 0..40 {
            stats.on_spread_sample(dec!(0.02));
        }

        let err = BlueprintGenerator::generate(
            &book,
            &snap,
            Direction::Buy,
            8.0,
            &stats,
            &RiskConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, RejectReason::SpreadExceedsHistorical);
    }

    #[test]
    fn rejects_zero_position_size() {
        let book = book_with(dec!(100.00), dec!(100.02));
        let snap = snapshot(dec!(0.02));
        let stats = stats_below(dec!(100.02));
        let risk = RiskConfig {
            account_equity: dec!(10), // 10 * 0.0025 = 0.025, under the 0.08/share risk
            per_trade_pct: dec!(0.0025),
        };

        let err = BlueprintGenerator::generate(
            &book,
            &snap,
            Direction::Buy,
            8.0,
            &stats,
            &risk,
        )
        .unwrap_err();
        assert_eq!(err, RejectReason::SizeTooSmall);
    }
}
