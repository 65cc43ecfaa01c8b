// =============================================================================
// Decision Journal — bounded-queue JSONL writer
// =============================================================================
//
// Producers enqueue without blocking; a single writer task owns the file.
// On queue overflow the record is dropped and counted, with a warning rate
// limited to one per minute — the feed path is never back-pressured by disk.
// Write timestamps are clamped monotonic within the session; the file is
// fsynced on graceful shutdown.
// =============================================================================

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::journal::record::{rfc3339_ms, DecisionRecord};
use crate::signals::RejectReason;

/// Minimum interval between overflow / write-failure warnings.
const WARN_INTERVAL_MS: i64 = 60_000;

/// Producer handle to the journal queue. Cheap to clone; the writer task
/// exits once every handle is dropped and the queue drains.
#[derive(Clone)]
pub struct DecisionJournal {
    tx: mpsc::Sender<DecisionRecord>,
    dropped: Arc<AtomicU64>,
    last_drop_warn_ms: Arc<AtomicI64>,
    clock: Arc<dyn Clock>,
}

impl DecisionJournal {
    /// Open (append) the journal file and spawn the writer task.
    pub fn spawn(
        path: impl AsRef<Path>,
        queue_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal at {}", path.display()))?;

        info!(path = %path.display(), queue_capacity, "decision journal opened");

        let (tx, rx) = mpsc::channel(queue_capacity);
        let writer_clock = clock.clone();
        let handle = tokio::spawn(writer_loop(file, rx, writer_clock));

        Ok((
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
                last_drop_warn_ms: Arc::new(AtomicI64::new(i64::MIN)),
                clock,
            },
            handle,
        ))
    }

    /// Non-blocking enqueue. Overflow drops the record.
    pub fn enqueue(&self, record: DecisionRecord) {
        if let Err(err) = self.tx.try_send(record) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let now = self.clock.now_ms();
            let last = self.last_drop_warn_ms.load(Ordering::Relaxed);
            if now - last >= WARN_INTERVAL_MS
                && self
                    .last_drop_warn_ms
                    .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
            {
                warn!(
                    reason = RejectReason::JournalDropped.as_str(),
                    dropped_total = total,
                    full = matches!(err, mpsc::error::TrySendError::Full(_)),
                    "journal queue overflow, dropping records"
                );
            }
        }
    }

    /// Records dropped so far due to back-pressure.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn writer_loop(
    file: File,
    mut rx: mpsc::Receiver<DecisionRecord>,
    clock: Arc<dyn Clock>,
) {
    let mut writer = BufWriter::new(file);
    let mut last_write_ms = i64::MIN;
    let mut write_failures = 0u64;
    let mut last_err_warn_ms = i64::MIN;

    while let Some(mut record) = rx.recv().await {
        // market_ts <= decision_ts <= journal_write_ts, clamped upward and
        // monotonic within the session.
        let write_ms = clock
            .now_ms()
            .max(record.decision_ts_ms)
            .max(last_write_ms);
        last_write_ms = write_ms;
        record.journal_write_timestamp_utc = rfc3339_ms(write_ms);

        match serde_json::to_string(&record) {
            Ok(line) => {
                let result = writeln!(writer, "{line}").and_then(|_| writer.flush());
                if let Err(e) = result {
                    write_failures += 1;
                    if write_ms - last_err_warn_ms >= WARN_INTERVAL_MS {
                        last_err_warn_ms = write_ms;
                        error!(
                            error = %e,
                            failures = write_failures,
                            "journal write failed"
                        );
                    }
                }
            }
            Err(e) => {
                // a record that cannot serialise is a bug, not a feed problem
                error!(error = %e, decision_id = %record.decision_id, "journal serialisation failed");
            }
        }
    }

    if let Err(e) = writer.flush() {
        error!(error = %e, "final journal flush failed");
    }
    if let Err(e) = writer.get_ref().sync_all() {
        error!(error = %e, "journal fsync failed");
    }
    info!(write_failures, "decision journal closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::journal::record::{SessionMeta, SystemMetrics};
    use crate::signals::RejectReason;
    use crate::types::TradingMode;

    fn session() -> SessionMeta {
        SessionMeta::new(TradingMode::Paper)
    }

    fn heartbeat(session: &SessionMeta, now_ms: i64) -> DecisionRecord {
        DecisionRecord::heartbeat(
            session,
            SystemMetrics {
                universe_count: 1,
                active_subscriptions: 1,
                min_depth_age_ms: None,
                min_tape_age_ms: None,
                tape_recent: false,
            },
            now_ms,
        )
    }

    #[tokio::test]
    async fn writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let clock = Arc::new(ManualClock::new(10_000));

        let (journal, handle) = DecisionJournal::spawn(&path, 64, clock).unwrap();
        let meta = session();
        journal.enqueue(heartbeat(&meta, 1_000));
        journal.enqueue(DecisionRecord::rejection(
            &meta,
            "AAPL",
            None,
            RejectReason::NotReadyCrossed,
            &[],
            None,
            1_500,
            1_500,
        ));
        drop(journal);
        handle.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert_eq!(line.trim_end(), *line, "no trailing whitespace");
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["schema_version"], 2);
            assert_eq!(value["source"], "bookpulse");
            assert!(value["journal_write_timestamp_utc"]
                .as_str()
                .unwrap()
                .ends_with('Z'));
        }
    }

    #[tokio::test]
    async fn write_timestamps_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        // a clock that goes backwards must not move write stamps backwards
        let clock = Arc::new(ManualClock::new(50_000));

        let (journal, handle) = DecisionJournal::spawn(&path, 64, clock.clone()).unwrap();
        let meta = session();
        journal.enqueue(heartbeat(&meta, 1_000));
        clock.set(40_000);
        journal.enqueue(heartbeat(&meta, 2_000));
        drop(journal);
        handle.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let stamps: Vec<String> = content
            .lines()
            .map(|l| {
                serde_json::from_str::<serde_json::Value>(l).unwrap()
                    ["journal_write_timestamp_utc"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[1] >= stamps[0]);
    }

    #[tokio::test]
    async fn overflow_drops_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let clock = Arc::new(ManualClock::new(10_000));

        let (journal, handle) = DecisionJournal::spawn(&path, 4, clock).unwrap();
        let meta = session();
        // current-thread runtime: the writer task cannot run until we await,
        // so pushes beyond the queue capacity must drop deterministically.
        for i in 0..10 {
            journal.enqueue(heartbeat(&meta, 1_000 + i));
        }
        assert_eq!(journal.dropped_count(), 6);

        drop(journal);
        handle.await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
    }
}
