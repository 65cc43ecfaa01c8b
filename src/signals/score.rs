// =============================================================================
// Liquidity Score — additive 0..10 score with penalty caps
// =============================================================================

use rust_decimal::Decimal;
use serde::Serialize;

use crate::metrics::MetricSnapshot;
use crate::types::Direction;

/// Spread at or below this earns the tight-spread bonus.
const SPREAD_TIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 2); // 0.03
/// Spread above this caps the score at 2.
const SPREAD_WIDE: Decimal = Decimal::from_parts(6, 0, 0, false, 2); // 0.06

const MAX_SCORE: f64 = 10.0;
const WEAK_RATIO_CAP: f64 = 3.0;
const WIDE_SPREAD_CAP: f64 = 2.0;

/// One additive component of the final score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub points: f64,
}

/// Final score with its per-component breakdown for the journal.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub components: Vec<ScoreComponent>,
}

/// Score a triggered candidate.
///
/// The imbalance ratio is direction-adjusted: Sell candidates invert the
/// bid/ask queue imbalance so one curve serves both directions.
pub fn liquidity_score(
    snapshot: &MetricSnapshot,
    direction: Direction,
    vwap_reclaimed: bool,
) -> ScoreBreakdown {
    let ratio = directional_ratio(snapshot, direction);
    let prints_per_sec = snapshot.prints_per_sec();

    let mut components = Vec::new();
    let mut total: f64 = 0.0;

    if snapshot.spread <= SPREAD_TIGHT {
        components.push(ScoreComponent { name: "tight_spread", points: 2.0 });
        total += 2.0;
    }
    if ratio >= 3.0 {
        components.push(ScoreComponent { name: "imbalance", points: 3.0 });
        total += 3.0;
    }
    if prints_per_sec >= 5.0 {
        components.push(ScoreComponent { name: "tape_rate", points: 2.0 });
        total += 2.0;
    }
    if vwap_reclaimed {
        components.push(ScoreComponent { name: "vwap_reclaim", points: 2.0 });
        total += 2.0;
    }
    if ratio > 1.0 {
        components.push(ScoreComponent { name: "queue_edge", points: 1.0 });
        total += 1.0;
    }

    // Penalty caps applied after the additive pass.
    if ratio < 1.0 {
        total = total.min(WEAK_RATIO_CAP);
    }
    if snapshot.spread > SPREAD_WIDE {
        total = total.min(WIDE_SPREAD_CAP);
    }

    ScoreBreakdown {
        total: total.min(MAX_SCORE),
        components,
    }
}

/// Queue imbalance seen from the candidate's side.
pub fn directional_ratio(snapshot: &MetricSnapshot, direction: Direction) -> f64 {
    match direction {
        Direction::Buy => snapshot.queue_imbalance,
        Direction::Sell => {
            if snapshot.queue_imbalance > 0.0 {
                1.0 / snapshot.queue_imbalance
            } else {
                f64::INFINITY
            }
        }
    }
}
