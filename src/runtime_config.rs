// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the signal pipeline. Configuration is
// read-only after startup; every field carries `#[serde(default)]` so that
// adding new fields never breaks loading an older config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TradingMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_accept_threshold() -> f64 {
    7.5
}

fn default_time_windows() -> Vec<TimeWindowThreshold> {
    vec![
        TimeWindowThreshold {
            start_et: "09:30".to_string(),
            end_et: "11:30".to_string(),
            threshold: 7.0,
        },
        TimeWindowThreshold {
            start_et: "12:00".to_string(),
            end_et: "14:00".to_string(),
            threshold: 8.0,
        },
    ]
}

fn default_depth_stale_ms() -> i64 {
    2_000
}

fn default_max_spread_abs() -> Decimal {
    // $0.10
    Decimal::new(10, 2)
}

fn default_warmup_min_trades() -> usize {
    5
}

fn default_warmup_window_ms() -> i64 {
    10_000
}

fn default_tape_stale_ms() -> i64 {
    5_000
}

fn default_wall_persistence_ms() -> i64 {
    1_000
}

fn default_queue_imbalance_buy() -> f64 {
    2.8
}

fn default_queue_imbalance_sell() -> f64 {
    0.35
}

fn default_tape_acceleration_threshold() -> f64 {
    2.0
}

fn default_symbol_cooldown_ms() -> i64 {
    600_000
}

fn default_max_alerts_per_hour() -> usize {
    3
}

fn default_max_alerts_per_day() -> u32 {
    36
}

fn default_account_equity() -> Decimal {
    Decimal::new(25_000, 0)
}

fn default_per_trade_pct() -> Decimal {
    // 0.25% of equity risked per blueprint
    Decimal::new(25, 4)
}

fn default_journal_path() -> String {
    "decisions.jsonl".to_string()
}

fn default_queue_capacity() -> usize {
    65_536
}

fn default_window_start() -> String {
    "09:25".to_string()
}

fn default_window_end() -> String {
    "15:45".to_string()
}

// =============================================================================
// Sections
// =============================================================================

/// One ET interval with its own score acceptance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindowThreshold {
    pub start_et: String,
    pub end_et: String,
    pub threshold: f64,
}

/// Score acceptance thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Threshold applied outside any configured time window.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,

    /// ET intervals with per-window thresholds.
    #[serde(default = "default_time_windows")]
    pub time_windows: Vec<TimeWindowThreshold>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            time_windows: default_time_windows(),
        }
    }
}

/// Order-book validity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Book is stale when no depth update arrived within this window.
    #[serde(default = "default_depth_stale_ms")]
    pub depth_stale_ms: i64,

    /// Maximum absolute spread for a valid book.
    #[serde(default = "default_max_spread_abs")]
    pub max_spread_abs: Decimal,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth_stale_ms: default_depth_stale_ms(),
            max_spread_abs: default_max_spread_abs(),
        }
    }
}

/// Tape readiness limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeConfig {
    /// Minimum prints inside the warmup window before candidates are scored.
    #[serde(default = "default_warmup_min_trades")]
    pub warmup_min_trades: usize,

    #[serde(default = "default_warmup_window_ms")]
    pub warmup_window_ms: i64,

    /// Tape is stale when the last print is older than this.
    #[serde(default = "default_tape_stale_ms")]
    pub stale_ms: i64,
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            warmup_min_trades: default_warmup_min_trades(),
            warmup_window_ms: default_warmup_window_ms(),
            stale_ms: default_tape_stale_ms(),
        }
    }
}

/// Directional trigger thresholds for the metrics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Minimum best-level age for a wall to count as persistent.
    #[serde(default = "default_wall_persistence_ms")]
    pub wall_persistence_ms: i64,

    /// Queue imbalance at or above this arms the Buy trigger.
    #[serde(default = "default_queue_imbalance_buy")]
    pub queue_imbalance_buy: f64,

    /// Queue imbalance at or below this arms the Sell trigger.
    #[serde(default = "default_queue_imbalance_sell")]
    pub queue_imbalance_sell: f64,

    #[serde(default = "default_tape_acceleration_threshold")]
    pub tape_acceleration_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            wall_persistence_ms: default_wall_persistence_ms(),
            queue_imbalance_buy: default_queue_imbalance_buy(),
            queue_imbalance_sell: default_queue_imbalance_sell(),
            tape_acceleration_threshold: default_tape_acceleration_threshold(),
        }
    }
}

/// Emission throttles keeping signals few and high-confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScarcityConfig {
    #[serde(default = "default_symbol_cooldown_ms")]
    pub symbol_cooldown_ms: i64,

    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: usize,

    #[serde(default = "default_max_alerts_per_day")]
    pub max_alerts_per_day: u32,
}

impl Default for ScarcityConfig {
    fn default() -> Self {
        Self {
            symbol_cooldown_ms: default_symbol_cooldown_ms(),
            max_alerts_per_hour: default_max_alerts_per_hour(),
            max_alerts_per_day: default_max_alerts_per_day(),
        }
    }
}

/// Position-sizing inputs for blueprint generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_account_equity")]
    pub account_equity: Decimal,

    /// Fraction of equity risked per blueprint (0.0025 = 0.25%).
    #[serde(default = "default_per_trade_pct")]
    pub per_trade_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_equity: default_account_equity(),
            per_trade_pct: default_per_trade_pct(),
        }
    }
}

/// Decision journal sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: String,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Emit a Rejection record for every gate-level (NotReady) failure.
    #[serde(default = "default_true")]
    pub emit_gate_rejections: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            queue_capacity: default_queue_capacity(),
            emit_gate_rejections: true,
        }
    }
}

/// Eastern-time window outside which candidates are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingWindowConfig {
    #[serde(default = "default_window_start")]
    pub start_et: String,

    #[serde(default = "default_window_end")]
    pub end_et: String,
}

impl Default for OperatingWindowConfig {
    fn default() -> Self {
        Self {
            start_et: default_window_start(),
            end_et: default_window_end(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the signal pipeline.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Stamped on every journal record.
    #[serde(default)]
    pub trading_mode: TradingMode,

    /// Initial subscription universe; replaced at runtime via `on_universe`.
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub score: ScoreConfig,

    #[serde(default)]
    pub book: BookConfig,

    #[serde(default)]
    pub tape: TapeConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub scarcity: ScarcityConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub operating_window: OperatingWindowConfig,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert!(cfg.symbols.is_empty());
        assert!((cfg.score.accept_threshold - 7.5).abs() < f64::EPSILON);
        assert_eq!(cfg.score.time_windows.len(), 2);
        assert_eq!(cfg.book.depth_stale_ms, 2_000);
        assert_eq!(cfg.book.max_spread_abs, Decimal::new(10, 2));
        assert_eq!(cfg.tape.warmup_min_trades, 5);
        assert_eq!(cfg.tape.warmup_window_ms, 10_000);
        assert_eq!(cfg.tape.stale_ms, 5_000);
        assert!((cfg.metrics.queue_imbalance_buy - 2.8).abs() < f64::EPSILON);
        assert!((cfg.metrics.queue_imbalance_sell - 0.35).abs() < f64::EPSILON);
        assert_eq!(cfg.scarcity.symbol_cooldown_ms, 600_000);
        assert_eq!(cfg.scarcity.max_alerts_per_hour, 3);
        assert_eq!(cfg.scarcity.max_alerts_per_day, 36);
        assert_eq!(cfg.risk.per_trade_pct, Decimal::new(25, 4));
        assert_eq!(cfg.journal.queue_capacity, 65_536);
        assert!(cfg.journal.emit_gate_rejections);
        assert_eq!(cfg.operating_window.start_et, "09:25");
        assert_eq!(cfg.operating_window.end_et, "15:45");
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert_eq!(cfg.book.depth_stale_ms, 2_000);
        assert_eq!(cfg.scarcity.max_alerts_per_hour, 3);
        assert_eq!(cfg.journal.path, "decisions.jsonl");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "trading_mode": "Live",
            "symbols": ["AAPL", "MSFT"],
            "scarcity": { "max_alerts_per_hour": 5 }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(cfg.scarcity.max_alerts_per_hour, 5);
        // untouched section keeps its defaults
        assert_eq!(cfg.scarcity.max_alerts_per_day, 36);
        assert_eq!(cfg.tape.warmup_min_trades, 5);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.book.max_spread_abs, cfg2.book.max_spread_abs);
        assert_eq!(cfg.score.time_windows.len(), cfg2.score.time_windows.len());
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
        assert_eq!(cfg.risk.account_equity, cfg2.risk.account_equity);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.symbols = vec!["NVDA".to_string()];
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, vec!["NVDA"]);
        assert_eq!(loaded.book.depth_stale_ms, 2_000);
    }
}
