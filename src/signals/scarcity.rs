// =============================================================================
// Scarcity Controller — three emission throttles
// =============================================================================
//
// Throttles, checked in order with short-circuit:
//   1. Per-symbol cooldown  — one signal per symbol per cooldown window.
//   2. Hourly cap           — sliding 60-minute window across all symbols.
//   3. Daily cap            — accepted signals since the last UTC midnight.
//
// All state sits behind a single mutex; trims are O(1) amortised.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::runtime_config::ScarcityConfig;
use crate::signals::validator::RejectReason;

const HOUR_MS: i64 = 3_600_000;

struct Inner {
    last_accept_by_symbol: HashMap<String, i64>,
    hourly_accepts: VecDeque<i64>,
    daily_count: u32,
    daily_date: String,
}

/// Process-wide accept-rate limiter.
pub struct ScarcityController {
    inner: Mutex<Inner>,
    config: ScarcityConfig,
}

impl ScarcityController {
    pub fn new(config: ScarcityConfig) -> Self {
        info!(
            cooldown_ms = config.symbol_cooldown_ms,
            per_hour = config.max_alerts_per_hour,
            per_day = config.max_alerts_per_day,
            "scarcity controller initialised"
        );
        Self {
            inner: Mutex::new(Inner {
                last_accept_by_symbol: HashMap::new(),
                hourly_accepts: VecDeque::new(),
                daily_count: 0,
                daily_date: String::new(),
            }),
            config,
        }
    }

    /// Admit or throttle an accepted candidate. On admit the timestamp is
    /// recorded before returning, so concurrent callers observe it.
    pub fn admit(&self, symbol: &str, now_ms: i64) -> Result<(), RejectReason> {
        let mut inner = self.inner.lock();

        Self::maybe_reset_daily(&mut inner, now_ms);
        while let Some(front) = inner.hourly_accepts.front() {
            if now_ms - front < HOUR_MS {
                break;
            }
            inner.hourly_accepts.pop_front();
        }

        if let Some(last) = inner.last_accept_by_symbol.get(symbol) {
            if now_ms - last < self.config.symbol_cooldown_ms {
                debug!(symbol, since_ms = now_ms - last, "symbol still cooling down");
                return Err(RejectReason::CooldownSymbol);
            }
        }

        if inner.hourly_accepts.len() >= self.config.max_alerts_per_hour {
            debug!(symbol, "hourly alert cap reached");
            return Err(RejectReason::RateLimitHour);
        }

        if inner.daily_count >= self.config.max_alerts_per_day {
            debug!(symbol, "daily alert cap reached");
            return Err(RejectReason::DailyCap);
        }

        inner
            .last_accept_by_symbol
            .insert(symbol.to_string(), now_ms);
        inner.hourly_accepts.push_back(now_ms);
        inner.daily_count += 1;
        Ok(())
    }

    /// Accepted signals so far in the current UTC day.
    pub fn accepted_today(&self) -> u32 {
        self.inner.lock().daily_count
    }

    /// Forget a symbol entirely (universe eviction).
    pub fn forget_symbol(&self, symbol: &str) {
        self.inner.lock().last_accept_by_symbol.remove(symbol);
    }

    fn maybe_reset_daily(inner: &mut Inner, now_ms: i64) {
        let today = match Utc.timestamp_millis_opt(now_ms).single() {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => return,
        };
        if inner.daily_date != today {
            if !inner.daily_date.is_empty() {
                info!(
                    old_date = %inner.daily_date,
                    new_date = %today,
                    "date rolled, resetting daily signal counter"
                );
            }
            inner.daily_date = today;
            inner.daily_count = 0;
        }
    }
}
