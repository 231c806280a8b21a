//! Persisted cache ledger.
//!
//! Flat JSON mapping from cache key to completion status, one file per
//! target environment. Loaded at executor start and flushed after every
//! mutation through an atomic temp-file rename, so a crash mid-plan leaves
//! a ledger reflecting exactly the steps that truly completed. A single
//! provisioning run owns the ledger exclusively for its duration.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::errors::EngineError;
use crate::plan::StepId;

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    /// Step id recorded for diagnostics; the cache key is authoritative.
    pub step_id: StepId,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    entries: BTreeMap<String, LedgerEntry>,
}

/// Durable record of which steps have already completed for one target
/// environment.
#[derive(Debug)]
pub struct CacheLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl CacheLedger {
    /// Load the ledger at `path`, or start empty when the file does not
    /// exist yet. Unreadable or unparsable ledgers are fatal: the run must
    /// not operate blind.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                entries: BTreeMap::new(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| EngineError::LedgerIoFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let file: LedgerFile =
            serde_json::from_str(&content).map_err(|e| EngineError::LedgerIoFailure {
                path: path.to_path_buf(),
                message: format!("invalid ledger: {e}"),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            entries: file.entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, cache_key: &str) -> Option<&LedgerEntry> {
        self.entries.get(cache_key)
    }

    pub fn is_completed(&self, cache_key: &str) -> bool {
        matches!(
            self.get(cache_key),
            Some(LedgerEntry {
                status: StepStatus::Completed,
                ..
            })
        )
    }

    /// Record a status and flush immediately.
    pub fn set(
        &mut self,
        cache_key: &str,
        step_id: &StepId,
        status: StepStatus,
    ) -> Result<(), EngineError> {
        self.entries.insert(
            cache_key.to_string(),
            LedgerEntry {
                status,
                timestamp: Utc::now(),
                step_id: step_id.clone(),
            },
        );
        self.flush()
    }

    /// Drop every entry whose key is not reachable from the current plan,
    /// flushing if anything was removed. Returns the number of pruned
    /// entries.
    pub fn prune(&mut self, reachable: &HashSet<String>) -> Result<usize, EngineError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| reachable.contains(key));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            self.flush()?;
        }
        Ok(pruned)
    }

    /// Remove all entries and flush.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        self.entries.clear();
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Write the full ledger through a temp file and atomic rename.
    pub fn flush(&self) -> Result<(), EngineError> {
        let io_err = |message: String| EngineError::LedgerIoFailure {
            path: self.path.clone(),
            message,
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| io_err(e.to_string()))?;

        let file = LedgerFile {
            version: LEDGER_VERSION,
            entries: self.entries.clone(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|e| io_err(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| io_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| io_err(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(e.to_string()))?;

        Ok(())
    }
}

/// Default ledger file path for a (base image, target) pair under `dir`.
/// One file per target environment; the name embeds a digest so base
/// images with path-hostile ids stay distinct.
pub fn default_ledger_path(dir: &Path, base_image: &str, target: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(base_image.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let slug: String = base_image
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    dir.join(format!("{slug}-{}.json", &hash[..8]))
}
