//! Command-line history with JSON persistence and Up/Down recall.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::history_path;

/// A single history entry with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The command text as entered.
    pub command: String,
    /// When the command was run.
    pub timestamp: DateTime<Utc>,
    /// Database file the command ran against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl HistoryEntry {
    pub fn new(command: String, database: Option<String>) -> Self {
        Self {
            command,
            timestamp: Utc::now(),
            database,
        }
    }
}

/// The history file format.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    version: u32,
    entries: Vec<HistoryEntry>,
}

pub struct History {
    entries: Vec<HistoryEntry>,
    max_entries: usize,
    path: PathBuf,
    dirty: bool,
    /// Entry currently recalled into the command line, if any.
    cursor: Option<usize>,
}

impl History {
    /// Load history from the default path.
    pub fn load(max_entries: usize) -> Result<Self> {
        let path = history_path().context("Could not determine history path")?;
        Self::load_from_path(&path, max_entries)
    }

    /// Load history from a specific path.
    pub fn load_from_path(path: &Path, max_entries: usize) -> Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read history file: {}", path.display()))?;

            let file: HistoryFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse history file: {}", path.display()))?;

            file.entries
        } else {
            Vec::new()
        };

        let skip = entries.len().saturating_sub(max_entries);
        let entries = entries.into_iter().skip(skip).collect();

        Ok(Self {
            entries,
            max_entries,
            path: path.to_path_buf(),
            dirty: false,
            cursor: None,
        })
    }

    /// Create a history that is never written to disk.
    pub fn new_empty(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            path: PathBuf::new(),
            dirty: false,
            cursor: None,
        }
    }

    /// Save history to disk with a temp file + rename.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty || self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let parent = self
            .path
            .parent()
            .context("History path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let file = HistoryFile {
            version: 1,
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file).context("Failed to serialize history")?;

        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write temp history file")?;
        tmp.flush().context("Failed to flush temp history file")?;
        tmp.persist(&self.path)
            .map_err(|e| anyhow::anyhow!("Failed to persist history file: {}", e))?;

        self.dirty = false;
        Ok(())
    }

    /// Add a command to history. Repeating the last command is not recorded
    /// twice.
    pub fn push(&mut self, command: &str, database: Option<String>) {
        self.cursor = None;
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.entries.last().map(|e| e.command.as_str()) == Some(trimmed) {
            return;
        }

        self.entries
            .push(HistoryEntry::new(trimmed.to_string(), database));
        let excess = self.entries.len().saturating_sub(self.max_entries);
        self.entries.drain(..excess);
        self.dirty = true;
    }

    /// Get all history entries (oldest first).
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Step back to an older command (Up).
    pub fn older(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = match self.cursor {
            None => self.entries.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.cursor = Some(idx);
        Some(self.entries[idx].command.as_str())
    }

    /// Step forward to a newer command (Down). `None` means past the newest
    /// entry, back to an empty line.
    pub fn newer(&mut self) -> Option<&str> {
        match self.cursor {
            Some(i) if i + 1 < self.entries.len() => {
                self.cursor = Some(i + 1);
                Some(self.entries[i + 1].command.as_str())
            }
            _ => {
                self.cursor = None;
                None
            }
        }
    }

    pub fn reset_recall(&mut self) {
        self.cursor = None;
    }
}

impl Drop for History {
    fn drop(&mut self) {
        // Best effort; nothing useful to do with the error here.
        let _ = self.save();
    }
}
