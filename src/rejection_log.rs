//! Append-only record of rejected submissions.
//!
//! One JSON line per rejection: timestamp, rejection kind, reason, and the content as received.
//! Logging is best-effort: [`RejectionLog::log`] never fails the request, it reports sink
//! failures through the operational log instead.

use crate::error::Rejection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Single rejection record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RejectionRecord {
    pub timestamp: DateTime<Utc>,
    /// `shape`, `invariant` or `signature`.
    pub kind: String,
    pub reason: String,
    /// The rejected request (or payload, for signature rejections) as received.
    pub content: serde_json::Value,
}

impl RejectionRecord {
    pub fn now(rejection: &Rejection, content: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: rejection.kind().to_string(),
            reason: rejection.to_string(),
            content,
        }
    }

    fn to_line(&self) -> io::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Destination for rejection records.
pub trait RejectionLog: Send + Sync {
    fn append(&self, record: &RejectionRecord) -> io::Result<()>;

    /// Appends `record`, reporting (not returning) any failure.
    fn log(&self, record: &RejectionRecord) {
        if let Err(e) = self.append(record) {
            log::error!(
                "rejection log write failed kind={} reason={} error={}",
                record.kind,
                record.reason,
                e
            );
        }
    }
}

/// Appends to a file opened in append mode; each record is synced before returning.
#[derive(Debug)]
pub struct FileRejectionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileRejectionLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RejectionLog for FileRejectionLog {
    fn append(&self, record: &RejectionRecord) -> io::Result<()> {
        let line = record.to_line()?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "rejection log lock poisoned"))?;
        file.write_all(&line)?;
        file.sync_data()
    }
}

/// Writes one JSON line per record to stdout.
pub struct StdoutRejectionLog;

impl RejectionLog for StdoutRejectionLog {
    fn append(&self, record: &RejectionRecord) -> io::Result<()> {
        let line = record.to_line()?;
        let mut out = io::stdout().lock();
        out.write_all(&line)?;
        out.flush()
    }
}

/// In-memory log that stores records for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryRejectionLog {
    records: Arc<Mutex<Vec<RejectionRecord>>>,
}

impl InMemoryRejectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RejectionRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl RejectionLog for InMemoryRejectionLog {
    fn append(&self, record: &RejectionRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "rejection log lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
