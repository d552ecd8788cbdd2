//! InteractionLog — append-only per-customer history with a JSONL mirror.
//!
//! The in-memory map is the source of truth for conversation context.
//! Every append is also written to an append-only newline-delimited JSON
//! file; write failures are logged and never undo the in-memory append.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;

/// Number of interactions used as conversation context.
pub const DEFAULT_CONTEXT_LEN: usize = 5;

/// Characters of each interaction shown in a rendered context block.
const CONTEXT_PREVIEW_CHARS: usize = 100;

/// Which way an interaction went, from our side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Customer → us.
    Incoming,
    /// Us → customer.
    Outgoing,
}

/// One recorded interaction. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub subject: String,
    pub content: String,
}

/// On-disk line format: the record plus the counterparty address.
#[derive(Debug, Serialize, Deserialize)]
struct StoredInteraction {
    email: String,
    #[serde(flatten)]
    record: InteractionRecord,
}

/// Shared interaction history, keyed by counterparty address.
///
/// Construct once and share via `Arc` between the send path, the poller
/// and the analyzer.
pub struct InteractionLog {
    history: RwLock<HashMap<String, Vec<InteractionRecord>>>,
    path: Option<PathBuf>,
    /// Serializes appends so file order matches in-memory order.
    append_lock: Mutex<()>,
}

impl InteractionLog {
    /// A log with no durable mirror.
    pub fn in_memory() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            path: None,
            append_lock: Mutex::new(()),
        }
    }

    /// Open a log mirrored to `path`, replaying any existing records.
    ///
    /// A missing file starts empty. Unreadable files and corrupt lines are
    /// logged and skipped.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut history: HashMap<String, Vec<InteractionRecord>> = HashMap::new();

        match replay(&path).await {
            Ok(stored) => {
                let count = stored.len();
                for entry in stored {
                    history.entry(entry.email).or_default().push(entry.record);
                }
                if count > 0 {
                    info!(path = %path.display(), count, "Replayed interaction history");
                }
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No interaction history yet");
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to replay interaction history");
            }
        }

        Self {
            history: RwLock::new(history),
            path: Some(path),
            append_lock: Mutex::new(()),
        }
    }

    /// Record an interaction under `address` and mirror it to disk.
    ///
    /// Appends are serialized: file order matches in-memory order. The
    /// history lock is released before the disk write, so readers never
    /// wait on file I/O.
    pub async fn append(
        &self,
        address: &str,
        direction: Direction,
        subject: &str,
        content: &str,
    ) -> InteractionRecord {
        let record = InteractionRecord {
            timestamp: Utc::now(),
            direction,
            subject: subject.to_string(),
            content: content.to_string(),
        };

        let _append = self.append_lock.lock().await;
        self.history
            .write()
            .await
            .entry(address.to_string())
            .or_default()
            .push(record.clone());

        if let Some(path) = &self.path
            && let Err(e) = persist(path, address, &record).await
        {
            error!(
                address = %address,
                path = %path.display(),
                error = %e,
                "Failed to persist interaction"
            );
        }

        record
    }

    /// The last `n` interactions for `address`, oldest first.
    pub async fn recent(&self, address: &str, n: usize) -> Vec<InteractionRecord> {
        let history = self.history.read().await;
        history
            .get(address)
            .map(|records| records[records.len().saturating_sub(n)..].to_vec())
            .unwrap_or_default()
    }

    /// Render recent history as a prompt context block.
    ///
    /// Empty string when there is no history for `address`.
    pub async fn render_context(&self, address: &str, n: usize) -> String {
        let recent = self.recent(address, n).await;
        if recent.is_empty() {
            return String::new();
        }

        let mut context = String::from("Previous customer interactions:\n");
        for record in &recent {
            let who = match record.direction {
                Direction::Incoming => "Customer",
                Direction::Outgoing => "Agent",
            };
            let preview: String = record.content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            let _ = writeln!(
                context,
                "[{}] {who}: {preview}...",
                record.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
        context
    }
}

async fn replay(path: &Path) -> Result<Vec<StoredInteraction>, StoreError> {
    let raw = tokio::fs::read(path).await?;
    let mut stored = Vec::new();
    // Decoded per line; an undecodable line is skipped like a corrupt one.
    for (lineno, bytes) in raw.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "Skipping non-UTF-8 interaction line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredInteraction>(line) {
            Ok(entry) => stored.push(entry),
            Err(e) => warn!(line = lineno + 1, error = %e, "Skipping corrupt interaction line"),
        }
    }
    Ok(stored)
}

async fn persist(path: &Path, address: &str, record: &InteractionRecord) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(&StoredInteraction {
        email: address.to_string(),
        record: record.clone(),
    })?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
