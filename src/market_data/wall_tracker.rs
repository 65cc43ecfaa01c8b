// =============================================================================
// Wall Tracker — per-level lifetime and size envelope
// =============================================================================

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{DepthOp, DepthUpdate, Side};

/// Completed persistence records retained for diagnostics.
const COMPLETED_RING_CAPACITY: usize = 256;

/// Live stats for one (side, price) level.
#[derive(Debug, Clone)]
pub struct WallStats {
    pub first_seen_ms: i64,
    pub last_update_ms: i64,
    pub last_size: Decimal,
    pub min_size: Decimal,
    pub max_size: Decimal,
}

/// Emitted when a tracked level disappears.
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceRecord {
    pub side: Side,
    pub price: Decimal,
    pub duration_ms: i64,
    pub max_size: Decimal,
}

/// Tracks how long each price level has persisted and its size envelope.
/// Wall-persistence scoring asks `level_age_ms` for the best level.
#[derive(Debug, Default)]
pub struct WallTracker {
    levels: HashMap<(Side, Decimal), WallStats>,
    completed: VecDeque<PersistenceRecord>,
}

impl WallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one depth event into the per-level stats.
    pub fn observe(&mut self, update: &DepthUpdate) {
        let key = (update.side, update.price);

        let removed = update.op == DepthOp::Delete || update.size.is_zero();
        if removed {
            if let Some(stats) = self.levels.remove(&key) {
                let record = PersistenceRecord {
                    side: update.side,
                    price: update.price,
                    duration_ms: (update.ts_ms - stats.first_seen_ms).max(0),
                    max_size: stats.max_size,
                };
                if self.completed.len() == COMPLETED_RING_CAPACITY {
                    self.completed.pop_front();
                }
                self.completed.push_back(record);
            }
            return;
        }

        self.levels
            .entry(key)
            .and_modify(|stats| {
                stats.last_update_ms = stats.last_update_ms.max(update.ts_ms);
                stats.last_size = update.size;
                stats.min_size = stats.min_size.min(update.size);
                stats.max_size = stats.max_size.max(update.size);
            })
            .or_insert(WallStats {
                first_seen_ms: update.ts_ms,
                last_update_ms: update.ts_ms,
                last_size: update.size,
                min_size: update.size,
                max_size: update.size,
            });
    }

    /// Age of a still-present level, or None if it is not tracked.
    pub fn level_age_ms(&self, side: Side, price: Decimal, now_ms: i64) -> Option<i64> {
        self.levels
            .get(&(side, price))
            .map(|stats| (now_ms - stats.first_seen_ms).max(0))
    }

    pub fn stats(&self, side: Side, price: Decimal) -> Option<&WallStats> {
        self.levels.get(&(side, price))
    }

    pub fn completed(&self) -> &VecDeque<PersistenceRecord> {
        &self.completed
    }
}
