use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RecoveryError, Result};
use crate::kernel::{Dentry, KernelMemory, MountSource};

pub const TMPFS: &str = "tmpfs";

/// A mounted superblock that can be recovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperblockCandidate {
    pub superblock: u64,
    pub mount_path: String,
}

impl SuperblockCandidate {
    /// Root directory entry of the filesystem
    pub fn root_dentry<K: KernelMemory + ?Sized>(&self, kernel: &K) -> Result<Dentry> {
        let root = kernel.read_u64("super_block", "s_root", self.superblock)?;
        if root == 0 {
            return Err(RecoveryError::CorruptStructure(format!(
                "superblock {:#x} has no root dentry",
                self.superblock
            )));
        }
        Ok(Dentry::new(root))
    }
}

/// Superblocks of every mount whose filesystem type is `fs_type`, in
/// mount-table order
pub fn locate_superblocks<M: MountSource + ?Sized>(
    mounts: &M,
    fs_type: &str,
) -> Result<Vec<SuperblockCandidate>> {
    let candidates: Vec<SuperblockCandidate> = mounts
        .mounts()?
        .into_iter()
        .filter(|m| m.fs_type == fs_type)
        .map(|m| SuperblockCandidate {
            superblock: m.superblock,
            mount_path: m.mount_path,
        })
        .collect();

    tracing::info!("Found {} {} superblocks", candidates.len(), fs_type);
    Ok(candidates)
}

/// Pick a candidate by its 1-based listing index
pub fn select_candidate(
    candidates: &[SuperblockCandidate],
    index: usize,
) -> Result<&SuperblockCandidate> {
    index
        .checked_sub(1)
        .and_then(|i| candidates.get(i))
        .ok_or(RecoveryError::SelectionOutOfRange {
            index,
            available: candidates.len(),
        })
}

/// One line of the superblock listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub index: usize,
    pub mount_path: String,
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.index, self.mount_path)
    }
}

pub fn listing(candidates: &[SuperblockCandidate]) -> Vec<ListingEntry> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| ListingEntry {
            index: i + 1,
            mount_path: c.mount_path.clone(),
        })
        .collect()
}
