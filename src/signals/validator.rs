// =============================================================================
// Signal Validator — ordered gates from candidate to verdict
// =============================================================================
//
// Checks run in a fixed order; the first failure rejects with a stable
// reason tag. Every check appends to the decision trace whether it passed or
// not, so a journaled rejection always shows the full path taken.
// =============================================================================

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::market_data::{BookInvalidReason, OrderBook};
use crate::metrics::MetricSnapshot;
use crate::runtime_config::RuntimeConfig;
use crate::signals::score::{directional_ratio, liquidity_score, ScoreBreakdown};
use crate::signals::window::{threshold_for, within_operating_window};
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Reasons and traces
// ---------------------------------------------------------------------------

/// Stable rejection tags written to the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    #[serde(rename = "NotReady_NoDepth")]
    NotReadyNoDepth,
    #[serde(rename = "NotReady_DepthStale")]
    NotReadyDepthStale,
    #[serde(rename = "NotReady_Crossed")]
    NotReadyCrossed,
    #[serde(rename = "NotReady_SpreadWide")]
    NotReadySpreadWide,
    #[serde(rename = "NotReady_ZeroSize")]
    NotReadyZeroSize,
    MissingBookContext,
    #[serde(rename = "NotReady_TapeNotWarmedUp")]
    NotReadyTapeNotWarmedUp,
    #[serde(rename = "NotReady_TapeStale")]
    NotReadyTapeStale,
    Spoof,
    Replenishment,
    SpreadBlowout,
    OutsideWindow,
    LowScore,
    NotAboveVwap,
    SpreadExceedsHistorical,
    SizeTooSmall,
    CooldownSymbol,
    RateLimitHour,
    DailyCap,
    JournalDropped,
    InternalError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReadyNoDepth => "NotReady_NoDepth",
            Self::NotReadyDepthStale => "NotReady_DepthStale",
            Self::NotReadyCrossed => "NotReady_Crossed",
            Self::NotReadySpreadWide => "NotReady_SpreadWide",
            Self::NotReadyZeroSize => "NotReady_ZeroSize",
            Self::MissingBookContext => "MissingBookContext",
            Self::NotReadyTapeNotWarmedUp => "NotReady_TapeNotWarmedUp",
            Self::NotReadyTapeStale => "NotReady_TapeStale",
            Self::Spoof => "Spoof",
            Self::Replenishment => "Replenishment",
            Self::SpreadBlowout => "SpreadBlowout",
            Self::OutsideWindow => "OutsideWindow",
            Self::LowScore => "LowScore",
            Self::NotAboveVwap => "NotAboveVwap",
            Self::SpreadExceedsHistorical => "SpreadExceedsHistorical",
            Self::SizeTooSmall => "SizeTooSmall",
            Self::CooldownSymbol => "CooldownSymbol",
            Self::RateLimitHour => "RateLimitHour",
            Self::DailyCap => "DailyCap",
            Self::JournalDropped => "JournalDropped",
            Self::InternalError => "InternalError",
        }
    }

    /// Map a book gate failure onto its NotReady tag.
    pub fn from_book(reason: BookInvalidReason) -> Self {
        match reason {
            BookInvalidReason::NoBook => Self::NotReadyNoDepth,
            BookInvalidReason::Crossed => Self::NotReadyCrossed,
            BookInvalidReason::SpreadWide => Self::NotReadySpreadWide,
            BookInvalidReason::DepthStale => Self::NotReadyDepthStale,
            BookInvalidReason::ZeroSize => Self::NotReadyZeroSize,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check's outcome within a decision trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub check: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TraceEntry {
    pub fn pass(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            detail: Some(detail.into()),
        }
    }

    pub fn fail(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            detail: Some(detail.into()),
        }
    }

    /// Trace tags as journaled (`check:ok` / `check:fail`).
    pub fn tag(&self) -> String {
        if self.passed {
            format!("{}:ok", self.check)
        } else {
            format!("{}:fail", self.check)
        }
    }
}

/// Validator output: a scored acceptance or a tagged rejection, either way
/// with the ordered trace of checks performed.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accept {
        score: ScoreBreakdown,
        trace: Vec<TraceEntry>,
    },
    Reject {
        reason: RejectReason,
        trace: Vec<TraceEntry>,
    },
}

// ---------------------------------------------------------------------------
// Readiness (gate-level, evaluated before any trigger)
// ---------------------------------------------------------------------------

/// Tape readiness relative to the warmup window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TapeReadiness {
    pub trades_in_warmup_window: usize,
    pub warmed_up: bool,
    pub stale: bool,
}

/// Evaluate tape warmup and staleness at the event time.
pub fn tape_readiness(book: &OrderBook, now_ms: i64, config: &RuntimeConfig) -> TapeReadiness {
    let trades_in_warmup_window = book
        .trades_within(now_ms, config.tape.warmup_window_ms)
        .count();
    let warmed_up = trades_in_warmup_window >= config.tape.warmup_min_trades;
    let stale =
        book.last_tape_ms() == 0 || now_ms - book.last_tape_ms() > config.tape.stale_ms;
    TapeReadiness {
        trades_in_warmup_window,
        warmed_up,
        stale,
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Everything the validator needs about one triggered candidate.
pub struct Candidate<'a> {
    pub book: &'a OrderBook,
    pub snapshot: &'a MetricSnapshot,
    pub direction: Direction,
    /// Spread of the previous non-zeroed snapshot for this symbol.
    pub previous_spread: Option<Decimal>,
    pub vwap_reclaimed: bool,
}

pub struct SignalValidator;

impl SignalValidator {
    /// Run checks 1..7 in order; first failure rejects.
    pub fn validate(candidate: &Candidate<'_>, config: &RuntimeConfig) -> Verdict {
        let mut trace = Vec::with_capacity(8);
        let snapshot = candidate.snapshot;
        let now_ms = snapshot.ts_ms;

        // 1. Book validity.
        match candidate.book.is_valid(now_ms, &config.book) {
            Ok(()) => trace.push(TraceEntry::pass("book_valid", "book valid")),
            Err(reason) => {
                trace.push(TraceEntry::fail("book_valid", reason.as_str()));
                return Verdict::Reject {
                    reason: RejectReason::from_book(reason),
                    trace,
                };
            }
        }

        // 2. Tape warmup and staleness.
        let readiness = tape_readiness(candidate.book, now_ms, config);
        if !readiness.warmed_up {
            trace.push(TraceEntry::fail(
                "tape_warmup",
                format!(
                    "{} trades in {}ms window",
                    readiness.trades_in_warmup_window, config.tape.warmup_window_ms
                ),
            ));
            return Verdict::Reject {
                reason: RejectReason::NotReadyTapeNotWarmedUp,
                trace,
            };
        }
        if readiness.stale {
            trace.push(TraceEntry::fail(
                "tape_fresh",
                format!("last print older than {}ms", config.tape.stale_ms),
            ));
            return Verdict::Reject {
                reason: RejectReason::NotReadyTapeStale,
                trace,
            };
        }
        trace.push(TraceEntry::pass(
            "tape_warmup",
            format!("{} trades in window", readiness.trades_in_warmup_window),
        ));

        // 3. Spoof rejection: cancel-heavy book with a silent tape.
        let cancel_ratio = snapshot.depth_deltas_1s.cancel_to_add_ratio;
        if cancel_ratio >= 3.0 && snapshot.trades_in_3s == 0 {
            trace.push(TraceEntry::fail(
                "spoof",
                format!("cancel_to_add {cancel_ratio:.2} with silent tape"),
            ));
            return Verdict::Reject {
                reason: RejectReason::Spoof,
                trace,
            };
        }
        trace.push(TraceEntry::pass(
            "spoof",
            format!("cancel_to_add {cancel_ratio:.2}"),
        ));

        // 4. Replenishment: the far side refills faster than prints consume.
        let ratio = directional_ratio(snapshot, candidate.direction);
        let prints_per_sec = snapshot.prints_per_sec();
        if ratio < 1.0 && prints_per_sec < 1.0 {
            trace.push(TraceEntry::fail(
                "replenishment",
                format!("ratio {ratio:.2}, {prints_per_sec:.2} prints/s"),
            ));
            return Verdict::Reject {
                reason: RejectReason::Replenishment,
                trace,
            };
        }
        trace.push(TraceEntry::pass(
            "replenishment",
            format!("ratio {ratio:.2}, {prints_per_sec:.2} prints/s"),
        ));

        // 5. Spread blowout since the previous snapshot.
        if let Some(prev) = candidate.previous_spread {
            let blowout_at = prev * Decimal::new(15, 1); // 1.5x
            if !prev.is_zero() && snapshot.spread >= blowout_at {
                trace.push(TraceEntry::fail(
                    "spread_stable",
                    format!("spread {} vs previous {}", snapshot.spread, prev),
                ));
                return Verdict::Reject {
                    reason: RejectReason::SpreadBlowout,
                    trace,
                };
            }
        }
        trace.push(TraceEntry::pass("spread_stable", "no blowout"));

        // 6. Operating window.
        if !within_operating_window(now_ms, &config.operating_window) {
            trace.push(TraceEntry::fail(
                "operating_window",
                format!(
                    "outside {}..{} ET",
                    config.operating_window.start_et, config.operating_window.end_et
                ),
            ));
            return Verdict::Reject {
                reason: RejectReason::OutsideWindow,
                trace,
            };
        }
        trace.push(TraceEntry::pass("operating_window", "inside window"));

        // 7. Liquidity score against the time-of-day threshold.
        let score = liquidity_score(snapshot, candidate.direction, candidate.vwap_reclaimed);
        let threshold = threshold_for(now_ms, &config.score);
        if score.total < threshold {
            trace.push(TraceEntry::fail(
                "score",
                format!("{:.1} < {threshold:.1}", score.total),
            ));
            return Verdict::Reject {
                reason: RejectReason::LowScore,
                trace,
            };
        }
        trace.push(TraceEntry::pass(
            "score",
            format!("{:.1} >= {threshold:.1}", score.total),
        ));

        debug!(
            symbol = %snapshot.symbol,
            direction = %candidate.direction,
            score = score.total,
            threshold,
            "candidate passed validation"
        );

        Verdict::Accept { score, trace }
    }
}
