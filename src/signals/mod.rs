// =============================================================================
// Signals Module
// =============================================================================
//
// Candidate-to-blueprint pipeline stages:
// - Ordered validation gates with decision traces
// - Liquidity scoring against time-of-day thresholds
// - Blueprint generation (entry/stop/target/size)
// - Scarcity throttles (cooldown, hourly, daily)

pub mod blueprint;
pub mod scarcity;
pub mod score;
pub mod validator;
pub mod window;

pub use blueprint::{Blueprint, BlueprintGenerator};
pub use scarcity::ScarcityController;
pub use score::{liquidity_score, ScoreBreakdown};
pub use validator::{Candidate, RejectReason, SignalValidator, TraceEntry, Verdict};
