pub mod record;
pub mod writer;

pub use record::{
    DecisionOutcome, DecisionRecord, EntryType, SessionMeta, SystemMetrics, UniverseUpdateInfo,
    SCHEMA_VERSION,
};
pub use writer::DecisionJournal;
