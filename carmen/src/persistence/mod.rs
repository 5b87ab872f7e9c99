//! Best-effort run history.
//!
//! The executor hands every finished run to a [`RunRecorder`] on a spawned
//! task. Recording never affects the run itself; failures are logged and
//! dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::core::JsonObject;
use crate::pipeline::RunResult;

/// Errors raised while recording a run.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The store could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded or an existing line decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A finished run together with the input that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run.
    pub run: RunResult,
    /// Raw input text.
    pub input: String,
    /// Caller-supplied context.
    pub context: JsonObject,
    /// When the record was created.
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(run: RunResult, input: impl Into<String>, context: JsonObject) -> Self {
        Self {
            run,
            input: input.into(),
            context,
            recorded_at: Utc::now(),
        }
    }

    /// The run ID, used for deduplication.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run.run_id
    }
}

/// Append-only store for run records.
///
/// `append` is idempotent: appending a run ID that is already stored is a
/// no-op.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Stores `record` unless its run ID is already present.
    async fn append(&self, record: RunRecord) -> Result<(), RecorderError>;
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRunRecorder;

#[async_trait]
impl RunRecorder for NoOpRunRecorder {
    async fn append(&self, _record: RunRecord) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// In-memory recorder.
#[derive(Debug, Default)]
pub struct MemoryRunRecorder {
    records: Mutex<Vec<RunRecord>>,
}

impl MemoryRunRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored records in append order.
    #[must_use]
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RunRecorder for MemoryRunRecorder {
    async fn append(&self, record: RunRecord) -> Result<(), RecorderError> {
        let mut records = self.records.lock();
        if records.iter().all(|existing| existing.run_id() != record.run_id()) {
            records.push(record);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct StoredRunId {
    run: StoredRun,
}

#[derive(Deserialize)]
struct StoredRun {
    run_id: Uuid,
}

/// Number of recent run IDs a [`JsonlRunRecorder`] remembers for dedup.
pub const DEDUP_WINDOW: usize = 10_000;

/// The most recent run IDs, oldest evicted first.
#[derive(Debug)]
struct RecentIds {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if `id` is already remembered.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, id: &Uuid) {
        if self.ids.remove(id) {
            self.order.retain(|existing| existing != id);
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Recorder writing one JSON object per line to a file.
///
/// Duplicate appends are skipped for the last [`DEDUP_WINDOW`] run IDs;
/// older IDs are forgotten so memory stays bounded.
#[derive(Debug)]
pub struct JsonlRunRecorder {
    path: PathBuf,
    seen: Mutex<RecentIds>,
    write: tokio::sync::Mutex<()>,
}

impl JsonlRunRecorder {
    /// Opens (or prepares to create) the file at `path`.
    ///
    /// The most recent run IDs already in the file are loaded so they are
    /// not appended again. Lines that do not parse are ignored.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        Self::open_with_window(path, DEDUP_WINDOW).await
    }

    /// Like [`open`](Self::open), remembering at most `window` run IDs.
    pub async fn open_with_window(path: impl Into<PathBuf>, window: usize) -> Result<Self, RecorderError> {
        let path = path.into();
        let mut seen = RecentIds::new(window);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines().filter(|line| !line.trim().is_empty()) {
                    if let Ok(stored) = serde_json::from_str::<StoredRunId>(line) {
                        seen.insert(stored.run.run_id);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %path.display(), existing = seen.len(), "Opened run log");
        Ok(Self {
            path,
            seen: Mutex::new(seen),
            write: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back from the file.
    pub async fn read_all(&self) -> Result<Vec<RunRecord>, RecorderError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RecorderError::from))
            .collect()
    }
}

#[async_trait]
impl RunRecorder for JsonlRunRecorder {
    async fn append(&self, record: RunRecord) -> Result<(), RecorderError> {
        let run_id = record.run_id();
        if !self.seen.lock().insert(run_id) {
            debug!(run_id = %run_id, "Run already recorded");
            return Ok(());
        }

        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                self.seen.lock().remove(&run_id);
                return Err(e.into());
            }
        };
        line.push('\n');

        let _guard = self.write.lock().await;
        let written = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            self.seen.lock().remove(&run_id);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(run_id: Uuid) -> RunRecord {
        let run = RunResult::failed(run_id, "Input text must not be empty", 0, Utc::now());
        RunRecord::new(run, "", JsonObject::new())
    }

    #[tokio::test]
    async fn test_jsonl_appends_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let recorder = JsonlRunRecorder::open(&path).await.unwrap();

        let first = Uuid::new_v4();
        recorder.append(record(first)).await.unwrap();
        recorder.append(record(first)).await.unwrap();
        recorder.append(record(Uuid::new_v4())).await.unwrap();

        let records = recorder.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run_id(), first);
    }

    #[tokio::test]
    async fn test_jsonl_reopen_remembers_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let run_id = Uuid::new_v4();

        JsonlRunRecorder::open(&path)
            .await
            .unwrap()
            .append(record(run_id))
            .await
            .unwrap();

        let reopened = JsonlRunRecorder::open(&path).await.unwrap();
        reopened.append(record(run_id)).await.unwrap();
        assert_eq!(reopened.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_dedup_window_forgets_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let recorder = JsonlRunRecorder::open_with_window(&path, 2).await.unwrap();

        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        for id in ids {
            recorder.append(record(id)).await.unwrap();
        }
        recorder.append(record(ids[2])).await.unwrap();
        assert_eq!(recorder.read_all().await.unwrap().len(), 3);

        recorder.append(record(ids[0])).await.unwrap();
        assert_eq!(recorder.read_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_jsonl_reopen_loads_only_recent_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let recorder = JsonlRunRecorder::open(&path).await.unwrap();
        for id in ids {
            recorder.append(record(id)).await.unwrap();
        }

        let reopened = JsonlRunRecorder::open_with_window(&path, 2).await.unwrap();
        assert_eq!(reopened.seen.lock().len(), 2);
        reopened.append(record(ids[1])).await.unwrap();
        reopened.append(record(ids[0])).await.unwrap();
        assert_eq!(reopened.read_all().await.unwrap().len(), 4);
    }

    #[test]
    fn test_recent_ids_evicts_in_insertion_order() {
        let mut recent = RecentIds::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(recent.insert(a));
        assert!(recent.insert(b));
        assert!(!recent.insert(a));
        assert!(recent.insert(c));
        assert_eq!(recent.len(), 2);
        assert!(recent.insert(a));

        recent.remove(&c);
        assert_eq!(recent.len(), 1);
        assert!(recent.insert(c));
    }

    #[tokio::test]
    async fn test_jsonl_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRunRecorder::open(dir.path().join("absent.jsonl")).await.unwrap();
        assert!(recorder.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_recorder_dedups() {
        let recorder = MemoryRunRecorder::new();
        let run_id = Uuid::new_v4();
        recorder.append(record(run_id)).await.unwrap();
        recorder.append(record(run_id)).await.unwrap();
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_recorder() {
        assert!(NoOpRunRecorder.append(record(Uuid::new_v4())).await.is_ok());
    }
}
