// =============================================================================
// Shared types crossing the feed boundary
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Book side an event applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "Bid"),
            Self::Ask => write!(f, "Ask"),
        }
    }
}

/// Ladder operation carried by a depth update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthOp {
    Insert,
    Update,
    Delete,
}

/// A single Level-II depth delta for one price level.
///
/// `prev_size` is the last-known size at that price (zero on Insert); the
/// delta tracker uses it to attribute canceled size on Delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub symbol: String,
    pub side: Side,
    pub op: DepthOp,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub prev_size: Decimal,
    pub ts_ms: i64,
}

/// A time-and-sales print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
    pub ts_ms: i64,
}

/// Tagged event variant delivered by the feed collaborators.
///
/// The core depends only on this enum; broker wire protocols stay outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    Depth(DepthUpdate),
    Trade(Trade),
    ConnectionState { connected: bool, detail: String },
    Error { detail: String },
}

impl FeedEvent {
    /// Symbol the event pertains to, when it has one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Depth(u) => Some(&u.symbol),
            Self::Trade(t) => Some(&t.symbol),
            Self::ConnectionState { .. } | Self::Error { .. } => None,
        }
    }

    /// Market timestamp of the event, when it has one.
    pub fn ts_ms(&self) -> Option<i64> {
        match self {
            Self::Depth(u) => Some(u.ts_ms),
            Self::Trade(t) => Some(t.ts_ms),
            Self::ConnectionState { .. } | Self::Error { .. } => None,
        }
    }
}

/// Direction of a liquidity-failure candidate and its blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Whether emitted blueprints are paper suggestions or live-reviewed.
///
/// The engine never places orders either way; the mode is stamped on every
/// journal record so downstream consumers know the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Paper,
    Live,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "Paper"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Case-fold a raw symbol into its canonical uppercase key.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_normalisation_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
        assert_eq!(normalize_symbol("Msft"), "MSFT");
    }

    #[test]
    fn feed_event_exposes_symbol_and_timestamp() {
        let ev = FeedEvent::Trade(Trade {
            symbol: "AAPL".into(),
            price: Decimal::new(10005, 2),
            size: Decimal::new(100, 0),
            ts_ms: 1_700_000_000_000,
        });
        assert_eq!(ev.symbol(), Some("AAPL"));
        assert_eq!(ev.ts_ms(), Some(1_700_000_000_000));

        let state = FeedEvent::ConnectionState {
            connected: true,
            detail: "depth feed up".into(),
        };
        assert_eq!(state.symbol(), None);
        assert_eq!(state.ts_ms(), None);
    }

    #[test]
    fn depth_update_deserialises_without_prev_size() {
        let json = r#"{
            "symbol": "AAPL", "side": "Bid", "op": "Insert",
            "price": 100.05, "size": 300, "ts_ms": 1700000000000
        }"#;
        let u: DepthUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(u.prev_size, Decimal::ZERO);
        assert_eq!(u.op, DepthOp::Insert);
    }
}
