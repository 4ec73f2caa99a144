//! Persisted run state: the transcript log and run summary records

use crate::composer::RunSummary;
use crate::conversation::Message;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Append-only JSONL log of transcript messages
#[derive(Debug, Clone)]
pub struct TranscriptJournal {
    path: PathBuf,
}

impl TranscriptJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one message as a JSON line
    pub async fn append(&self, message: &Message) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let line = serde_json::to_string(message)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    /// Every message recorded so far, skipping lines that fail to parse
    pub async fn load(&self) -> Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut messages = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping malformed transcript line {}: {}", number + 1, e),
            }
        }
        Ok(messages)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// JSON array of the most recent run summaries
#[derive(Debug, Clone)]
pub struct RunRecordStore {
    path: PathBuf,
    keep: usize,
}

impl RunRecordStore {
    pub fn new(path: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            path: path.into(),
            keep: keep.max(1),
        }
    }

    /// Add a record, dropping the oldest beyond the retention limit
    pub async fn append(&self, record: RunSummary) -> Result<()> {
        let mut records = self.load().await?;
        records.push(record);
        if records.len() > self.keep {
            let excess = records.len() - self.keep;
            records.drain(..excess);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&self.path, content).await?;
        debug!("Stored run summary ({} records kept)", records.len());
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<RunSummary>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
