// =============================================================================
// Depth Delta Tracker — windowed add/cancel/update counters
// =============================================================================
//
// Sliding-window accounting of depth churn over 1 s / 3 s / 10 s, per side,
// restricted by the caller to events touching the top K levels. Counters are
// maintained incrementally; eviction happens at observation or insertion
// time and decrements the counters by the evicted fields.
// =============================================================================

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{DepthOp, DepthUpdate, Side};

/// Window durations maintained per side.
pub const WINDOW_DURATIONS_MS: [i64; 3] = [1_000, 3_000, 10_000];

/// Hard cap on buffered events per window; oldest dropped beyond this.
pub const MAX_WINDOW_EVENTS: usize = 16_384;

/// How many top levels of each side feed the tracker.
pub const TOP_K_LEVELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeltaKind {
    Add,
    Cancel,
    Update,
}

#[derive(Debug, Clone, Copy)]
struct DeltaEvent {
    ts_ms: i64,
    kind: DeltaKind,
    size: Decimal,
}

/// Aggregated window state exposed to the metrics engine and journal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DepthDeltaSnapshot {
    pub window_ms: i64,
    pub add_count: u64,
    pub cancel_count: u64,
    pub update_count: u64,
    pub total_added_size: Decimal,
    pub total_canceled_size: Decimal,
    pub total_abs_delta: Decimal,
    /// Count-based: cancel_count / add_count, +inf when cancels occur
    /// against zero adds, 0.0 when both are zero. The size totals above
    /// carry the size-based view.
    pub cancel_to_add_ratio: f64,
}

#[derive(Debug)]
struct DeltaWindow {
    window_ms: i64,
    events: VecDeque<DeltaEvent>,
    add_count: u64,
    cancel_count: u64,
    update_count: u64,
    added_size: Decimal,
    canceled_size: Decimal,
    abs_delta: Decimal,
}

impl DeltaWindow {
    fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            events: VecDeque::new(),
            add_count: 0,
            cancel_count: 0,
            update_count: 0,
            added_size: Decimal::ZERO,
            canceled_size: Decimal::ZERO,
            abs_delta: Decimal::ZERO,
        }
    }

    fn push(&mut self, event: DeltaEvent) {
        self.evict(event.ts_ms);

        if self.events.len() == MAX_WINDOW_EVENTS {
            if let Some(oldest) = self.events.pop_front() {
                self.decrement(&oldest);
            }
        }

        match event.kind {
            DeltaKind::Add => {
                self.add_count += 1;
                self.added_size += event.size;
            }
            DeltaKind::Cancel => {
                self.cancel_count += 1;
                self.canceled_size += event.size;
            }
            DeltaKind::Update => {
                self.update_count += 1;
            }
        }
        self.abs_delta += event.size;
        self.events.push_back(event);
    }

    fn evict(&mut self, now_ms: i64) {
        while let Some(front) = self.events.front() {
            if now_ms - front.ts_ms < self.window_ms {
                break;
            }
            let evicted = self.events.pop_front().unwrap();
            self.decrement(&evicted);
        }
    }

    fn decrement(&mut self, event: &DeltaEvent) {
        match event.kind {
            DeltaKind::Add => {
                self.add_count -= 1;
                self.added_size -= event.size;
            }
            DeltaKind::Cancel => {
                self.cancel_count -= 1;
                self.canceled_size -= event.size;
            }
            DeltaKind::Update => {
                self.update_count -= 1;
            }
        }
        self.abs_delta -= event.size;
    }

    fn snapshot(&mut self, now_ms: i64) -> DepthDeltaSnapshot {
        self.evict(now_ms);

        let ratio = if self.add_count > 0 {
            self.cancel_count as f64 / self.add_count as f64
        } else if self.cancel_count > 0 {
            f64::INFINITY
        } else {
            0.0
        };

        DepthDeltaSnapshot {
            window_ms: self.window_ms,
            add_count: self.add_count,
            cancel_count: self.cancel_count,
            update_count: self.update_count,
            total_added_size: self.added_size,
            total_canceled_size: self.canceled_size,
            total_abs_delta: self.abs_delta,
            cancel_to_add_ratio: ratio,
        }
    }
}

/// Per-symbol depth churn tracker (one window set per side).
#[derive(Debug)]
pub struct DepthDeltaTracker {
    bid_windows: Vec<DeltaWindow>,
    ask_windows: Vec<DeltaWindow>,
}

impl DepthDeltaTracker {
    pub fn new() -> Self {
        Self {
            bid_windows: WINDOW_DURATIONS_MS.iter().map(|w| DeltaWindow::new(*w)).collect(),
            ask_windows: WINDOW_DURATIONS_MS.iter().map(|w| DeltaWindow::new(*w)).collect(),
        }
    }

    /// Record one depth event. The caller has already established that the
    /// event touches a top-K level of its side.
    pub fn record(&mut self, update: &DepthUpdate) {
        let (kind, size) = match update.op {
            DepthOp::Insert => (DeltaKind::Add, update.size),
            DepthOp::Delete => (DeltaKind::Cancel, update.prev_size),
            DepthOp::Update => {
                let delta = (update.size - update.prev_size).abs();
                (DeltaKind::Update, delta)
            }
        };
        let event = DeltaEvent {
            ts_ms: update.ts_ms,
            kind,
            size,
        };

        let windows = match update.side {
            Side::Bid => &mut self.bid_windows,
            Side::Ask => &mut self.ask_windows,
        };
        for window in windows.iter_mut() {
            window.push(event);
        }
    }

    /// Snapshot of one side's window with the given duration.
    pub fn snapshot(&mut self, side: Side, window_ms: i64, now_ms: i64) -> DepthDeltaSnapshot {
        let windows = match side {
            Side::Bid => &mut self.bid_windows,
            Side::Ask => &mut self.ask_windows,
        };
        windows
            .iter_mut()
            .find(|w| w.window_ms == window_ms)
            .map(|w| w.snapshot(now_ms))
            .unwrap_or_default()
    }

    /// Both sides of the 1 s window merged — the view attached to metric
    /// snapshots and consumed by the spoof gate.
    pub fn combined_1s(&mut self, now_ms: i64) -> DepthDeltaSnapshot {
        let bid = self.snapshot(Side::Bid, 1_000, now_ms);
        let ask = self.snapshot(Side::Ask, 1_000, now_ms);

        let add_count = bid.add_count + ask.add_count;
        let cancel_count = bid.cancel_count + ask.cancel_count;
        let ratio = if add_count > 0 {
            cancel_count as f64 / add_count as f64
        } else if cancel_count > 0 {
            f64::INFINITY
        } else {
            0.0
        };

        DepthDeltaSnapshot {
            window_ms: 1_000,
            add_count,
            cancel_count,
            update_count: bid.update_count + ask.update_count,
            total_added_size: bid.total_added_size + ask.total_added_size,
            total_canceled_size: bid.total_canceled_size + ask.total_canceled_size,
            total_abs_delta: bid.total_abs_delta + ask.total_abs_delta,
            cancel_to_add_ratio: ratio,
        }
    }

}

impl Default for DepthDeltaTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn update(side: Side, op: DepthOp, size: Decimal, prev: Decimal, ts_ms: i64) -> DepthUpdate {
        DepthUpdate {
            symbol: "AAPL".into(),
            side,
            op,
            price: dec!(100.00),
            size,
            prev_size: prev,
            ts_ms,
        }
    }

    #[test]
    fn counters_accumulate_per_kind() {
        let mut tracker = DepthDeltaTracker::new();
        tracker.record(&update(Side::Bid, DepthOp::Insert, dec!(100), dec!(0), 1_000));
        tracker.record(&update(Side::Bid, DepthOp::Update, dec!(80), dec!(100), 1_100));
        tracker.record(&update(Side::Bid, DepthOp::Delete, dec!(0), dec!(80), 1_200));

        let snap = tracker.snapshot(Side::Bid, 1_000, 1_200);
        assert_eq!(snap.add_count, 1);
        assert_eq!(snap.update_count, 1);
        assert_eq!(snap.cancel_count, 1);
        assert_eq!(snap.total_added_size, dec!(100));
        assert_eq!(snap.total_canceled_size, dec!(80));
        // 100 added + |80-100| updated + 80 canceled
        assert_eq!(snap.total_abs_delta, dec!(200));
        assert!((snap.cancel_to_add_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eviction_decrements_counters() {
        let mut tracker = DepthDeltaTracker::new();
        tracker.record(&update(Side::Ask, DepthOp::Insert, dec!(50), dec!(0), 1_000));
        tracker.record(&update(Side::Ask, DepthOp::Insert, dec!(60), dec!(0), 1_800));

        // at 2_100 the first event is >= 1s old in the 1s window
        let snap_1s = tracker.snapshot(Side::Ask, 1_000, 2_100);
        assert_eq!(snap_1s.add_count, 1);
        assert_eq!(snap_1s.total_added_size, dec!(60));

        // the 10s window still holds both
        let snap_10s = tracker.snapshot(Side::Ask, 10_000, 2_100);
        assert_eq!(snap_10s.add_count, 2);
        assert_eq!(snap_10s.total_added_size, dec!(110));
    }

    #[test]
    fn cancel_ratio_is_infinite_without_adds() {
        let mut tracker = DepthDeltaTracker::new();
        tracker.record(&update(Side::Bid, DepthOp::Delete, dec!(0), dec!(40), 1_000));
        let snap = tracker.snapshot(Side::Bid, 1_000, 1_000);
        assert!(snap.cancel_to_add_ratio.is_infinite());
    }

    #[test]
    fn combined_view_merges_sides() {
        let mut tracker = DepthDeltaTracker::new();
        tracker.record(&update(Side::Bid, DepthOp::Insert, dec!(10), dec!(0), 1_000));
        tracker.record(&update(Side::Ask, DepthOp::Delete, dec!(0), dec!(30), 1_000));
        tracker.record(&update(Side::Ask, DepthOp::Delete, dec!(0), dec!(20), 1_000));
        tracker.record(&update(Side::Ask, DepthOp::Delete, dec!(0), dec!(25), 1_000));

        let snap = tracker.combined_1s(1_000);
        assert_eq!(snap.add_count, 1);
        assert_eq!(snap.cancel_count, 3);
        assert_eq!(snap.total_canceled_size, dec!(75));
        assert!((snap.cancel_to_add_ratio - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hard_cap_drops_oldest() {
        let mut tracker = DepthDeltaTracker::new();
        // all within the 10s window so nothing evicts by age
        for i in 0..(MAX_WINDOW_EVENTS + 5) {
            tracker.record(&update(Side::Bid, DepthOp::Insert, dec!(1), dec!(0), i as i64 / 10_000));
        }
        let snap = tracker.snapshot(Side::Bid, 10_000, 1);
        assert_eq!(snap.add_count, MAX_WINDOW_EVENTS as u64);
    }
}
