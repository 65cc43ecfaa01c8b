// =============================================================================
// Operating Window — Eastern-time session gating and score thresholds
// =============================================================================

use chrono::{NaiveTime, TimeZone, Utc};
use chrono_tz::US::Eastern;
use tracing::warn;

use crate::runtime_config::{OperatingWindowConfig, ScoreConfig};

/// Eastern-time clock time for an epoch-millisecond timestamp.
///
/// Falls back to UTC when the millisecond value cannot be resolved to a
/// calendar instant; window gating then still behaves deterministically.
pub fn eastern_time_of_day(ts_ms: i64) -> NaiveTime {
    match Utc.timestamp_millis_opt(ts_ms).single() {
        Some(utc) => utc.with_timezone(&Eastern).time(),
        None => {
            warn!(ts_ms, "timestamp outside representable range, using UTC midnight");
            NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default()
        }
    }
}

/// Parse an "HH:MM" config string; None on malformed input.
pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let (h, m) = raw.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Whether the event time falls inside the configured ET operating window.
///
/// A malformed window bound disables that bound rather than rejecting every
/// event.
pub fn within_operating_window(ts_ms: i64, config: &OperatingWindowConfig) -> bool {
    let tod = eastern_time_of_day(ts_ms);

    if let Some(start) = parse_hhmm(&config.start_et) {
        if tod < start {
            return false;
        }
    }
    if let Some(end) = parse_hhmm(&config.end_et) {
        if tod > end {
            return false;
        }
    }
    true
}

/// Score acceptance threshold for the event's ET time of day.
pub fn threshold_for(ts_ms: i64, config: &ScoreConfig) -> f64 {
    let tod = eastern_time_of_day(ts_ms);
    for window in &config.time_windows {
        if let (Some(start), Some(end)) = (parse_hhmm(&window.start_et), parse_hhmm(&window.end_et))
        {
            if tod >= start && tod <= end {
                return window.threshold;
            }
        }
    }
    config.accept_threshold
}
