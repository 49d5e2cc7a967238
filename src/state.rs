use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AutoReplyError, Result};
use crate::models::{IgnoredRecord, RepliedRecord};

/// The durable activity log: two ordered, append-only sequences.
///
/// The file is loaded fully and rewritten fully on every append
/// (read-modify-write, not a streaming append).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyLog {
    pub replied_mails: Vec<RepliedRecord>,
    pub ignored_mails: Vec<IgnoredRecord>,
}

impl ReplyLog {
    pub fn is_empty(&self) -> bool {
        self.replied_mails.is_empty() && self.ignored_mails.is_empty()
    }

    /// Load the log from disk; a missing file reads as an empty log.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No existing reply log at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let log: Self = serde_json::from_str(&json).map_err(|e| {
            AutoReplyError::StateError(format!("Failed to parse reply log {:?}: {}", path, e))
        })?;

        Ok(log)
    }

    /// Write the log to disk atomically (temp sibling, then rename).
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json).await?;
        tracing::debug!("Saved reply log to {:?}", path);
        Ok(())
    }

    /// Merge one cycle's records onto the persisted log, preserving the
    /// existing content as an unchanged prefix, and rewrite the file.
    /// Returns the merged log.
    pub async fn append_cycle(
        path: &Path,
        replied: Vec<RepliedRecord>,
        ignored: Vec<IgnoredRecord>,
    ) -> Result<Self> {
        let mut log = Self::load(path).await?;

        tracing::debug!(
            replied = replied.len(),
            ignored = ignored.len(),
            total_replied = log.replied_mails.len() + replied.len(),
            total_ignored = log.ignored_mails.len() + ignored.len(),
            "Appending cycle results to {:?}",
            path
        );

        log.replied_mails.extend(replied);
        log.ignored_mails.extend(ignored);
        log.save(path).await?;

        Ok(log)
    }
}

/// Coarse poller state, overwritten on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Stopped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// On-disk wrapper for the status flag: `{"status": "running"}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusFile {
    pub status: RunStatus,
}

/// Overwrite the status file; no merge, no history.
pub async fn set_status(path: &Path, status: RunStatus) -> Result<()> {
    let json = serde_json::to_string_pretty(&StatusFile { status })?;
    write_atomic(path, &json).await?;
    tracing::debug!("Set run status to {} in {:?}", status, path);
    Ok(())
}

/// Read the last persisted status; None when no status was ever written.
pub async fn load_status(path: &Path) -> Result<Option<RunStatus>> {
    if !path.exists() {
        return Ok(None);
    }

    let json = tokio::fs::read_to_string(path).await?;
    let file: StatusFile = serde_json::from_str(&json).map_err(|e| {
        AutoReplyError::StateError(format!("Failed to parse status file {:?}: {}", path, e))
    })?;

    Ok(Some(file.status))
}

/// Write `contents` to `path` via a temporary sibling file and an atomic
/// rename, so concurrent readers never observe a half-written file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = match path.file_name() {
        Some(name) => {
            let mut tmp_name = name.to_os_string();
            tmp_name.push(".tmp");
            path.with_file_name(tmp_name)
        }
        None => {
            return Err(AutoReplyError::StateError(format!(
                "Cannot write to path without a file name: {:?}",
                path
            )));
        }
    };

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
