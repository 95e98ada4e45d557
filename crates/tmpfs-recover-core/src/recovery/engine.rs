//! tmpfs recovery engine: superblock selection, tree walk and reporting

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::metadata::{MetadataFixer, DEFAULT_TIMESTAMP_SKEW_SECS};
use super::page::{page_array_base, PageResolver};
use super::radix::PageLocator;
use super::reassembly::{FileReassembler, MissingPagePolicy};
use super::report::RecoveryReport;
use super::superblock::{locate_superblocks, select_candidate, SuperblockCandidate, TMPFS};
use super::walker::DirectoryWalker;
use crate::error::{RecoveryError, Result};
use crate::forensics::HashAlgorithm;
use crate::kernel::{KernelMemory, MountSource};
use crate::memory::PhysicalMemory;

/// Recovery engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Filesystem type whose superblocks are offered for recovery
    pub fs_type: String,
    pub timestamp_skew_secs: i64,
    pub missing_pages: MissingPagePolicy,
    pub max_file_size: u64,
    pub max_depth: usize,
    pub hash_algorithms: Vec<HashAlgorithm>,
    /// Base of the page descriptor array when the profile lacks the symbol
    pub mem_map: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            fs_type: TMPFS.to_string(),
            timestamp_skew_secs: DEFAULT_TIMESTAMP_SKEW_SECS,
            missing_pages: MissingPagePolicy::ZeroFill,
            max_file_size: 4 * 1024 * 1024 * 1024, // 4GB
            max_depth: 256,
            hash_algorithms: vec![HashAlgorithm::SHA256],
            mem_map: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryProgress {
    pub entries_visited: usize,
    pub files_recovered: usize,
    pub bytes_recovered: u64,
    pub current_path: PathBuf,
}

/// Recovers tmpfs instances out of a memory capture
pub struct RecoveryEngine<'a, K: ?Sized, P: ?Sized> {
    kernel: &'a K,
    physical: &'a P,
    config: RecoveryConfig,
    progress_callback: Option<Box<dyn Fn(RecoveryProgress) + Send + Sync>>,
}

impl<'a, K, P> RecoveryEngine<'a, K, P>
where
    K: KernelMemory + ?Sized,
    P: PhysicalMemory + ?Sized,
{
    pub fn new(kernel: &'a K, physical: &'a P, config: RecoveryConfig) -> Self {
        Self {
            kernel,
            physical,
            config,
            progress_callback: None,
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(RecoveryProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    /// Superblocks of the configured filesystem type, in mount-table order
    pub fn candidates<M: MountSource + ?Sized>(
        &self,
        mounts: &M,
    ) -> Result<Vec<SuperblockCandidate>> {
        locate_superblocks(mounts, &self.config.fs_type)
    }

    /// Recover the candidate with 1-based `index` into `output_dir`
    pub fn recover_by_index<M: MountSource + ?Sized>(
        &self,
        mounts: &M,
        index: usize,
        output_dir: &Path,
    ) -> Result<RecoveryReport> {
        let candidates = self.candidates(mounts)?;
        let candidate = select_candidate(&candidates, index)?;
        self.recover(candidate, output_dir)
    }

    /// Recover one superblock's tree into `output_dir`
    pub fn recover(
        &self,
        candidate: &SuperblockCandidate,
        output_dir: &Path,
    ) -> Result<RecoveryReport> {
        ensure_directory(output_dir)?;

        let k = self.kernel;
        let root = candidate.root_dentry(k)?;
        let mem_map = page_array_base(k, self.config.mem_map)?;
        let resolver = PageResolver::from_kernel(k, self.physical, mem_map)?;
        let reassembler =
            FileReassembler::new(PageLocator::new(k), resolver, self.config.missing_pages);

        tracing::info!(
            "Recovering {} (sb {:#x}, root dentry {:#x}) into {}",
            candidate.mount_path,
            candidate.superblock,
            root.address,
            output_dir.display()
        );

        let report = DirectoryWalker::new(
            k,
            reassembler,
            MetadataFixer::new(self.config.timestamp_skew_secs),
            RecoveryReport::new(candidate.clone(), output_dir),
            &self.config,
        )
        .with_progress(self.progress_callback.as_deref())
        .walk(root, output_dir)?;

        tracing::info!(
            "Recovery complete: {} files ({} bytes), {} directories, {} skipped",
            report.files_recovered,
            report.bytes_recovered,
            report.directories_recovered,
            report.entries_skipped
        );

        Ok(report)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(RecoveryError::NotADirectory(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.fs_type, "tmpfs");
        assert_eq!(config.timestamp_skew_secs, 18000);
        assert_eq!(config.missing_pages, MissingPagePolicy::ZeroFill);
        assert_eq!(config.hash_algorithms, vec![HashAlgorithm::SHA256]);
    }
}
