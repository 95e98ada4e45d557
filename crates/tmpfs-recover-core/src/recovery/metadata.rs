//! Permission and timestamp restoration for recovered artifacts
//!
//! Files are stamped as soon as they are written. Directories are stamped in a
//! final pass because creating their children moves their modification time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Offset added to recovered access and modification times (5 hours)
pub const DEFAULT_TIMESTAMP_SKEW_SECS: i64 = 5 * 60 * 60;

/// Access and modification time, seconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub accessed: i64,
    pub modified: i64,
}

#[derive(Debug, Clone, Copy)]
struct DeferredDirectory {
    permissions: u32,
    times: Timestamps,
}

pub struct MetadataFixer {
    skew_secs: i64,
    deferred: BTreeMap<PathBuf, DeferredDirectory>,
}

impl MetadataFixer {
    pub fn new(skew_secs: i64) -> Self {
        Self {
            skew_secs,
            deferred: BTreeMap::new(),
        }
    }

    pub fn corrected(&self, atime: i64, mtime: i64) -> Timestamps {
        Timestamps {
            accessed: atime.saturating_add(self.skew_secs),
            modified: mtime.saturating_add(self.skew_secs),
        }
    }

    /// Restore metadata on `path`; directories are only recorded here.
    ///
    /// The first recording for a directory path is the one that is applied.
    pub fn apply(
        &mut self,
        path: &Path,
        permissions: u32,
        atime: i64,
        mtime: i64,
        is_directory: bool,
    ) -> Result<()> {
        let times = self.corrected(atime, mtime);

        if is_directory {
            self.deferred
                .entry(path.to_path_buf())
                .or_insert(DeferredDirectory { permissions, times });
            return Ok(());
        }

        set_times(path, times)?;
        set_permissions(path, permissions)?;
        Ok(())
    }

    /// Stamp every recorded directory, deepest paths first.
    ///
    /// Returns the number of directories stamped.
    pub fn finish(self) -> Result<usize> {
        for (path, directory) in self.deferred.iter().rev() {
            set_times(path, directory.times)?;
            set_permissions(path, directory.permissions)?;
            tracing::debug!(
                "Stamped directory {} (mtime {})",
                path.display(),
                directory.times.modified
            );
        }
        Ok(self.deferred.len())
    }
}

impl Default for MetadataFixer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_SKEW_SECS)
    }
}

pub fn system_time(secs: i64) -> SystemTime {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(SystemTime::from)
        .unwrap_or(UNIX_EPOCH)
}

fn set_times(path: &Path, times: Timestamps) -> Result<()> {
    let file = File::open(path)?;
    file.set_times(
        FileTimes::new()
            .set_accessed(system_time(times.accessed))
            .set_modified(system_time(times.modified)),
    )?;
    Ok(())
}

fn set_permissions(path: &Path, permissions: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(permissions))?;
    }
    #[cfg(not(unix))]
    let _ = (path, permissions);
    Ok(())
}
