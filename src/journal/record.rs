// =============================================================================
// Decision Records — schema-versioned journal entries
// =============================================================================
//
// Every decision the pipeline makes becomes exactly one append-only record.
// Records are immutable after construction; the writer task only stamps the
// journal-write timestamp.
// =============================================================================

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::metrics::MetricSnapshot;
use crate::signals::{Blueprint, RejectReason, TraceEntry};
use crate::types::{Direction, TradingMode};

/// Wire version of the journal schema.
pub const SCHEMA_VERSION: u32 = 2;

/// Identifies the emitting process on every record.
pub const SOURCE: &str = "bookpulse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryType {
    Signal,
    Rejection,
    Heartbeat,
    UniverseUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionOutcome {
    Accepted,
    Rejected,
    Cancelled,
}

/// Liveness payload carried by heartbeat records.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub universe_count: usize,
    pub active_subscriptions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_depth_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tape_age_ms: Option<i64>,
    pub tape_recent: bool,
}

/// Universe replacement summary.
#[derive(Debug, Clone, Serialize)]
pub struct UniverseUpdateInfo {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub total: usize,
}

/// Per-process identity stamped on every record.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub session_id: String,
    pub trading_mode: TradingMode,
}

impl SessionMeta {
    pub fn new(trading_mode: TradingMode) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            trading_mode,
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub schema_version: u32,
    pub decision_id: String,
    pub session_id: String,
    pub source: &'static str,
    pub entry_type: EntryType,
    pub market_timestamp_utc: String,
    pub decision_timestamp_utc: String,
    /// Stamped by the writer task; empty until written.
    pub journal_write_timestamp_utc: String,
    pub trading_mode: TradingMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_outcome: Option<DecisionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decision_trace: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data_quality_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_metrics: Option<MetricSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_inputs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<Blueprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_metrics: Option<SystemMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universe_update: Option<UniverseUpdateInfo>,

    /// Millisecond originals kept for the writer's monotonic clamp.
    #[serde(skip)]
    pub market_ts_ms: i64,
    #[serde(skip)]
    pub decision_ts_ms: i64,
}

/// RFC 3339 with millisecond precision; epoch on out-of-range input.
pub fn rfc3339_ms(ts_ms: i64) -> String {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl DecisionRecord {
    fn base(
        session: &SessionMeta,
        entry_type: EntryType,
        market_ts_ms: i64,
        decision_ts_ms: i64,
    ) -> Self {
        // market time never exceeds decision time on the wire
        let decision_ts_ms = decision_ts_ms.max(market_ts_ms);
        Self {
            schema_version: SCHEMA_VERSION,
            decision_id: uuid::Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            source: SOURCE,
            entry_type,
            market_timestamp_utc: rfc3339_ms(market_ts_ms),
            decision_timestamp_utc: rfc3339_ms(decision_ts_ms),
            journal_write_timestamp_utc: String::new(),
            trading_mode: session.trading_mode,
            symbol: None,
            direction: None,
            decision_outcome: None,
            rejection_reason: None,
            decision_trace: Vec::new(),
            data_quality_flags: Vec::new(),
            observed_metrics: None,
            decision_inputs: None,
            blueprint: None,
            system_metrics: None,
            universe_update: None,
            market_ts_ms,
            decision_ts_ms,
        }
    }

    /// An accepted signal with its snapshot and blueprint.
    pub fn signal(
        session: &SessionMeta,
        snapshot: MetricSnapshot,
        blueprint: Blueprint,
        trace: &[TraceEntry],
        decision_ts_ms: i64,
    ) -> Self {
        let mut record = Self::base(session, EntryType::Signal, snapshot.ts_ms, decision_ts_ms);
        record.symbol = Some(snapshot.symbol.clone());
        record.direction = Some(blueprint.direction);
        record.decision_outcome = Some(DecisionOutcome::Accepted);
        record.decision_trace = trace.iter().map(TraceEntry::tag).collect();
        record.observed_metrics = Some(snapshot);
        record.blueprint = Some(blueprint);
        record
    }

    /// A rejected candidate or gate failure.
    pub fn rejection(
        session: &SessionMeta,
        symbol: &str,
        direction: Option<Direction>,
        reason: RejectReason,
        trace: &[TraceEntry],
        snapshot: Option<MetricSnapshot>,
        market_ts_ms: i64,
        decision_ts_ms: i64,
    ) -> Self {
        let mut record = Self::base(session, EntryType::Rejection, market_ts_ms, decision_ts_ms);
        record.symbol = Some(symbol.to_string());
        record.direction = direction;
        record.decision_outcome = Some(DecisionOutcome::Rejected);
        record.rejection_reason = Some(reason);
        record.decision_trace = trace.iter().map(TraceEntry::tag).collect();
        record.observed_metrics = snapshot;
        record
    }

    /// Periodic liveness record.
    pub fn heartbeat(session: &SessionMeta, metrics: SystemMetrics, now_ms: i64) -> Self {
        let mut record = Self::base(session, EntryType::Heartbeat, now_ms, now_ms);
        record.system_metrics = Some(metrics);
        record
    }

    /// Subscription-set replacement.
    pub fn universe_update(session: &SessionMeta, info: UniverseUpdateInfo, now_ms: i64) -> Self {
        let mut record = Self::base(session, EntryType::UniverseUpdate, now_ms, now_ms);
        record.universe_update = Some(info);
        record
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.decision_inputs = Some(inputs);
        self
    }

    pub fn with_quality_flag(mut self, flag: impl Into<String>) -> Self {
        self.data_quality_flags.push(flag.into());
        self
    }
}
