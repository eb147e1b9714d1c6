//! Incremental follower store
//!
//! Resolved followers live in one CSV file per target account. The file only
//! grows: each `append` adds a batch of rows in a single write, so a crash
//! loses at most the batch in flight and never rewrites earlier data.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::followers::core::{
    CollectorError, FileOperation, FollowerId, FollowerRecord, JoinedAt, Result,
};

/// Column order of the store file
pub const STORE_COLUMNS: [&str; 6] = [
    "timestamp",
    "id",
    "screen_name",
    "name",
    "followers_count",
    "created_at",
];

/// One CSV row; every column is text so ids and legacy values survive as-is
#[derive(Debug, Serialize, Deserialize)]
struct StoreRow {
    timestamp: String,
    id: String,
    screen_name: String,
    name: String,
    followers_count: String,
    created_at: String,
}

impl From<&FollowerRecord> for StoreRow {
    fn from(record: &FollowerRecord) -> Self {
        Self {
            timestamp: record.resolved_at_text(),
            id: record.id.to_string(),
            screen_name: record.screen_name.clone(),
            name: record.display_name.clone(),
            followers_count: record.followers_count.to_string(),
            created_at: record.joined_at.to_string(),
        }
    }
}

impl StoreRow {
    fn into_record(self) -> std::result::Result<FollowerRecord, String> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err("empty id".to_string());
        }
        let resolved_at = FollowerRecord::parse_resolved_at(&self.timestamp)
            .ok_or_else(|| format!("unreadable timestamp '{}'", self.timestamp))?;

        Ok(FollowerRecord {
            id: FollowerId::from(id),
            screen_name: self.screen_name,
            display_name: self.name,
            followers_count: parse_count(&self.followers_count),
            joined_at: JoinedAt::parse(&self.created_at),
            resolved_at,
        })
    }
}

/// Parse a count column; spreadsheet-edited files may hold `1234.0` or blanks
fn parse_count(raw: &str) -> u64 {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
        .unwrap_or(0)
}

/// Append-only, deduplicated follower store backed by a CSV file
#[derive(Debug, Clone)]
pub struct FollowerStore {
    path: PathBuf,
    // Serializes appends across clones
    write_lock: Arc<Mutex<()>>,
}

impl FollowerStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store for `handle` inside `data_dir`, named `{handle}_followers.csv`
    pub fn for_handle<P: AsRef<Path>>(data_dir: P, handle: &str) -> Self {
        Self::new(data_dir.as_ref().join(format!("{}_followers.csv", handle)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the store file exists yet
    pub async fn exists(&self) -> Result<bool> {
        fs::try_exists(&self.path).await.map_err(|e| self.io_error(FileOperation::Metadata, e))
    }

    /// Ids of every stored follower
    pub async fn load_known_ids(&self) -> Result<HashSet<FollowerId>> {
        Ok(self.load_all().await?.into_iter().map(|record| record.id).collect())
    }

    /// Every stored follower in file order, first occurrence winning on duplicate ids
    pub async fn load_all(&self) -> Result<Vec<FollowerRecord>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(FileOperation::Read, e)),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers = reader.headers().map_err(|e| self.format_error(e.to_string()))?;
        if !headers.iter().any(|h| h.trim() == "id") {
            return Err(self.format_error("header has no 'id' column".to_string()));
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<StoreRow>().enumerate() {
            // Row 1 is the header
            let line = index + 2;
            let record = match row.map_err(|e| e.to_string()).and_then(StoreRow::into_record) {
                Ok(record) => record,
                Err(reason) => {
                    warn!("Skipping malformed row {} in {}: {}", line, self.path.display(), reason);
                    continue;
                }
            };
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                debug!("Ignoring duplicate id {} on row {}", record.id, line);
            }
        }

        debug!("Loaded {} followers from {}", records.len(), self.path.display());
        Ok(records)
    }

    /// Durably append `records` in one write
    ///
    /// Either every row lands or, on failure, the file is cut back to its
    /// last complete row. The header is written only into an empty file.
    pub async fn append(&self, records: &[FollowerRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CollectorError::Persistence {
                    path: parent.to_path_buf(),
                    operation: FileOperation::CreateDir,
                    source: e,
                })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(FileOperation::Create, e))?;

        let previous_len = file
            .metadata()
            .await
            .map_err(|e| self.io_error(FileOperation::Metadata, e))?
            .len();

        // An interrupted run may have left a partial row, possibly inside an
        // open quote; it was never acknowledged, so drop it
        let kept_len = complete_rows_len(&mut file, previous_len)
            .await
            .map_err(|e| self.io_error(FileOperation::Read, e))?;
        if kept_len < previous_len {
            warn!(
                "Dropping {} bytes of an incomplete row at the end of {}",
                previous_len - kept_len,
                self.path.display()
            );
            file.set_len(kept_len)
                .await
                .map_err(|e| self.io_error(FileOperation::Truncate, e))?;
        }

        let payload = self.encode(records, kept_len == 0)?;

        if let Err(e) = write_synced(&mut file, &payload).await {
            warn!("Append to {} failed ({}), rolling back to {} bytes", self.path.display(), e, kept_len);
            file.set_len(kept_len)
                .await
                .map_err(|rollback| self.io_error(FileOperation::Truncate, rollback))?;
            return Err(self.io_error(FileOperation::Append, e));
        }

        debug!("Appended {} followers to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    fn encode(&self, records: &[FollowerRecord], with_header: bool) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .from_writer(Vec::new());
        for record in records {
            writer
                .serialize(StoreRow::from(record))
                .map_err(|e| self.format_error(e.to_string()))?;
        }
        writer.into_inner().map_err(|e| self.format_error(e.to_string()))
    }

    fn io_error(&self, operation: FileOperation, source: std::io::Error) -> CollectorError {
        CollectorError::Persistence {
            path: self.path.clone(),
            operation,
            source,
        }
    }

    fn format_error(&self, reason: String) -> CollectorError {
        CollectorError::StoreFormat {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Length of the file up to and including its last newline
async fn complete_rows_len(file: &mut File, len: u64) -> std::io::Result<u64> {
    const BLOCK: u64 = 8 * 1024;
    let mut buffer = vec![0u8; BLOCK as usize];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(BLOCK);
        let block = &mut buffer[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(block).await?;
        if let Some(pos) = block.iter().rposition(|b| *b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

async fn write_synced(file: &mut File, payload: &[u8]) -> std::io::Result<()> {
    file.write_all(payload).await?;
    file.flush().await?;
    file.sync_all().await
}
