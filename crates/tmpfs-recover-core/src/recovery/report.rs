//! Per-entry outcomes of a recovery run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::superblock::SuperblockCandidate;
use crate::error::Result;
use crate::forensics::{verify_file_integrity, FileHash, HashVerification};
use crate::FileType;

/// Why an entry was not written to the output tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The directory entry has no backing inode
    NoInode,
    /// Symlinks, device nodes, sockets and FIFOs are not recovered
    UnsupportedType(FileType),
    /// Empty, `.` or `..`
    InvalidName,
    /// The dentry was already reached through another path
    AlreadyVisited,
    DepthLimit,
    TooLarge { size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Recovered {
        bytes: u64,
        /// Page indexes zero-filled because they were not resident
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        missing_pages: Vec<u64>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        hashes: Vec<FileHash>,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    /// Output path (or the path it would have had)
    pub path: PathBuf,
    /// Address of the directory entry
    pub dentry: u64,
    pub file_type: Option<FileType>,
    pub status: EntryStatus,
}

impl EntryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self.status, EntryStatus::Recovered { .. })
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match &self.status {
            EntryStatus::Skipped(reason) => Some(reason),
            EntryStatus::Recovered { .. } => None,
        }
    }
}

/// Recovery report with detailed results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub superblock: SuperblockCandidate,
    pub output_directory: PathBuf,
    pub directories_recovered: usize,
    pub files_recovered: usize,
    pub entries_skipped: usize,
    pub bytes_recovered: u64,
    /// Directories whose deferred timestamps were applied
    pub directories_stamped: usize,
    pub entries: Vec<EntryOutcome>,
}

impl RecoveryReport {
    pub fn new(superblock: SuperblockCandidate, output_directory: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            superblock,
            output_directory: output_directory.to_path_buf(),
            directories_recovered: 0,
            files_recovered: 0,
            entries_skipped: 0,
            bytes_recovered: 0,
            directories_stamped: 0,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: EntryOutcome) {
        match &outcome.status {
            EntryStatus::Recovered { bytes, .. } => {
                if outcome.file_type == Some(FileType::Directory) {
                    self.directories_recovered += 1;
                } else {
                    self.files_recovered += 1;
                    self.bytes_recovered += bytes;
                }
            }
            EntryStatus::Skipped(reason) => {
                tracing::debug!("Skipped {}: {:?}", outcome.path.display(), reason);
                self.entries_skipped += 1;
            }
        }
        self.entries.push(outcome);
    }

    pub fn finish(&mut self, directories_stamped: usize) {
        self.directories_stamped = directories_stamped;
        self.finished_at = Some(Utc::now());
    }

    pub fn outcome(&self, path: &Path) -> Option<&EntryOutcome> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| !e.is_recovered())
    }

    /// Re-hash every recovered file on disk against its recorded digests
    pub fn verify(&self) -> Vec<HashVerification> {
        self.entries
            .iter()
            .filter_map(|e| match &e.status {
                EntryStatus::Recovered { hashes, .. } => Some((e, hashes)),
                EntryStatus::Skipped(_) => None,
            })
            .flat_map(|(e, hashes)| hashes.iter().map(move |h| verify_file_integrity(&e.path, h)))
            .collect()
    }

    /// Write the report as pretty-printed JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
