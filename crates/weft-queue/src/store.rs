//! Durable on-disk queue store
//!
//! One JSON file per entry under the data directory, written to a
//! temporary file, fsynced, and atomically renamed into place. An
//! in-memory index mirrors the directory for ordering queries; the
//! directory is the source of truth and is rescanned on open.

use crate::{QueueError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use weft_core::{NodeName, Task, TaskId};

const DROP_LOG: &str = "dropped.jsonl";

/// A persisted task awaiting a reachable target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task: Task,

    /// Preferred target, if the caller had one. `None` means any node.
    pub target: Option<NodeName>,

    /// Replay attempts made so far
    pub retry_count: u32,

    pub enqueued_at: DateTime<Utc>,

    /// Message from the most recent failed replay
    pub last_error: Option<String>,
}

/// Audit record for an entry dropped after exhausting its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedEntry {
    pub task: Task,
    pub reason: String,
    pub retry_count: u32,
    pub dropped_at: DateTime<Utc>,
}

/// Outcome of charging a failed replay against an entry
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Entry kept; retries used so far
    Retained(u32),
    /// Retry budget exhausted; entry removed and audited
    Dropped,
}

/// Aggregate queue counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total_queued: usize,
    pub by_target: HashMap<String, usize>,
    pub by_priority: HashMap<i32, usize>,
}

/// Durable queue store
#[derive(Debug, Clone)]
pub struct QueueStore {
    data_dir: PathBuf,
    entries: Arc<DashMap<TaskId, QueueEntry>>,
}

impl QueueStore {
    /// Open (or create) a store rooted at `data_dir`, loading any entries
    /// a previous process left behind.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let entries = Arc::new(DashMap::new());
        let mut loaded = 0usize;

        let mut dir = tokio::fs::read_dir(&data_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(entry) => {
                    entries.insert(entry.task.id, entry);
                    loaded += 1;
                }
                Err(e) => {
                    // A torn write from a crash mid-rename; leave the file
                    // for inspection rather than deleting data.
                    warn!(path = %path.display(), error = %e, "Skipping unreadable queue entry");
                }
            }
        }

        if loaded > 0 {
            info!(count = loaded, dir = %data_dir.display(), "Recovered queued tasks");
        }

        Ok(Self { data_dir, entries })
    }

    /// Persist a task. Idempotent per task id: a task that already has an
    /// entry is not enqueued twice.
    pub async fn enqueue(&self, task: Task, target: Option<NodeName>) -> Result<bool> {
        if self.entries.contains_key(&task.id) {
            debug!(task = %task.id, "Task already queued");
            return Ok(false);
        }

        let entry = QueueEntry {
            task,
            target,
            retry_count: 0,
            enqueued_at: Utc::now(),
            last_error: None,
        };

        self.write_entry(&entry).await?;
        info!(task = %entry.task.id, priority = entry.task.priority, "Queued task for offline replay");
        self.entries.insert(entry.task.id, entry);
        Ok(true)
    }

    /// Remove an entry, deleting its backing file. Returns whether it existed.
    pub async fn remove(&self, id: &TaskId) -> Result<bool> {
        if self.entries.remove(id).is_none() {
            return Ok(false);
        }
        let path = self.entry_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(QueueError::Persistence(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Charge a failed replay against an entry. Once `retry_count` reaches
    /// the task's budget the entry is removed and an audit record written.
    pub async fn record_failure(&self, id: &TaskId, error: impl Into<String>) -> Result<RetryOutcome> {
        let error = error.into();

        let (entry, exhausted) = {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            entry.retry_count += 1;
            entry.last_error = Some(error.clone());
            let exhausted = entry.retry_count >= entry.task.max_retries;
            (entry.clone(), exhausted)
        };

        if exhausted {
            self.append_drop_record(&DroppedEntry {
                task: entry.task.clone(),
                reason: format!("max retries exceeded: {}", error),
                retry_count: entry.retry_count,
                dropped_at: Utc::now(),
            })
            .await?;
            self.remove(id).await?;
            warn!(task = %id, retries = entry.retry_count, "Dropped task after exhausting retries");
            return Ok(RetryOutcome::Dropped);
        }

        self.write_entry(&entry).await?;
        debug!(task = %id, retries = entry.retry_count, "Replay failed, task retained");
        Ok(RetryOutcome::Retained(entry.retry_count))
    }

    /// Look up an entry
    pub fn get(&self, id: &TaskId) -> Option<QueueEntry> {
        self.entries.get(id).map(|e| e.clone())
    }

    /// All entries ordered by `(priority desc, created_at asc)`
    pub fn entries(&self) -> Vec<QueueEntry> {
        let mut all: Vec<QueueEntry> = self.entries.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| {
            b.task
                .priority
                .cmp(&a.task.priority)
                .then(a.task.created_at.cmp(&b.task.created_at))
        });
        all
    }

    /// The top-K entries in replay order
    pub fn next_batch(&self, k: usize) -> Vec<QueueEntry> {
        let mut all = self.entries();
        all.truncate(k);
        all
    }

    /// Aggregate counts for observability
    pub fn status(&self) -> QueueStatus {
        let mut by_target: HashMap<String, usize> = HashMap::new();
        let mut by_priority: HashMap<i32, usize> = HashMap::new();

        for entry in self.entries.iter() {
            let target = entry
                .target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "any".to_string());
            *by_target.entry(target).or_insert(0) += 1;
            *by_priority.entry(entry.task.priority).or_insert(0) += 1;
        }

        QueueStatus {
            total_queued: self.entries.len(),
            by_target,
            by_priority,
        }
    }

    /// Read the drop audit log
    pub async fn dropped(&self) -> Result<Vec<DroppedEntry>> {
        let path = self.data_dir.join(DROP_LOG);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_path(&self, id: &TaskId) -> PathBuf {
        self.data_dir.join(format!("{}.json", id))
    }

    async fn read_entry(path: &Path) -> Result<QueueEntry> {
        let data = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write an entry durably: temp file, fsync, atomic rename.
    async fn write_entry(&self, entry: &QueueEntry) -> Result<()> {
        let data = serde_json::to_vec_pretty(entry)?;
        let path = self.entry_path(&entry.task.id);
        let temp = path.with_extension("json.tmp");

        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &path).await?;
            Ok::<(), std::io::Error>(())
        };

        write.await.map_err(|e| {
            QueueError::Persistence(format!("failed to persist {}: {}", path.display(), e))
        })
    }

    async fn append_drop_record(&self, record: &DroppedEntry) -> Result<()> {
        let path = self.data_dir.join(DROP_LOG);
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let append = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.sync_all().await?;
            Ok::<(), std::io::Error>(())
        };

        append.await.map_err(|e| {
            QueueError::Persistence(format!("failed to append drop record: {}", e))
        })
    }
}
