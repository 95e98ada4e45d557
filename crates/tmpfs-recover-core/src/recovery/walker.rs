//! Depth-first walk of a dentry tree onto the output directory

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::engine::{RecoveryConfig, RecoveryProgress};
use super::metadata::MetadataFixer;
use super::reassembly::FileReassembler;
use super::report::{EntryOutcome, EntryStatus, RecoveryReport, SkipReason};
use crate::error::Result;
use crate::forensics::calculate_hash;
use crate::kernel::{Dentry, InodeView, KernelMemory};
use crate::memory::PhysicalMemory;
use crate::FileType;

type ProgressFn<'r> = &'r (dyn Fn(RecoveryProgress) + Send + Sync);

pub struct DirectoryWalker<'a, 'r, K: ?Sized, P: ?Sized> {
    kernel: &'a K,
    reassembler: FileReassembler<'a, K, P>,
    fixer: MetadataFixer,
    report: RecoveryReport,
    config: &'r RecoveryConfig,
    visited: HashSet<u64>,
    progress: Option<ProgressFn<'r>>,
}

impl<'a, 'r, K, P> DirectoryWalker<'a, 'r, K, P>
where
    K: KernelMemory + ?Sized,
    P: PhysicalMemory + ?Sized,
{
    pub fn new(
        kernel: &'a K,
        reassembler: FileReassembler<'a, K, P>,
        fixer: MetadataFixer,
        report: RecoveryReport,
        config: &'r RecoveryConfig,
    ) -> Self {
        Self {
            kernel,
            reassembler,
            fixer,
            report,
            config,
            visited: HashSet::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressFn<'r>>) -> Self {
        self.progress = progress;
        self
    }

    /// Recover everything below `root` into `output`, then stamp directories
    pub fn walk(mut self, root: Dentry, output: &Path) -> Result<RecoveryReport> {
        self.visited.insert(root.address);
        self.process_directory(root, output, 0)?;

        let stamped = self.fixer.finish()?;
        self.report.finish(stamped);
        Ok(self.report)
    }

    fn process_directory(&mut self, dentry: Dentry, parent: &Path, depth: usize) -> Result<()> {
        let k = self.kernel;

        for child in dentry.children(k)? {
            let name = child.name(k)?;
            let path = match path_component(&name) {
                Some(component) => parent.join(component),
                None => {
                    let shown = parent.join(String::from_utf8_lossy(&name).as_ref());
                    self.skip(shown, child, None, SkipReason::InvalidName);
                    continue;
                }
            };

            let Some(inode_address) = child.inode(k)? else {
                self.skip(path, child, None, SkipReason::NoInode);
                continue;
            };

            if !self.visited.insert(child.address) {
                self.skip(path, child, None, SkipReason::AlreadyVisited);
                continue;
            }

            let inode = InodeView::read(k, inode_address)?;
            match inode.file_type() {
                FileType::Directory => {
                    if depth >= self.config.max_depth {
                        self.skip(path, child, Some(FileType::Directory), SkipReason::DepthLimit);
                        continue;
                    }
                    self.recover_directory(child, &inode, &path)?;
                    self.process_directory(child, &path, depth + 1)?;
                }
                FileType::RegularFile => {
                    if inode.size > self.config.max_file_size {
                        let reason = SkipReason::TooLarge { size: inode.size };
                        self.skip(path, child, Some(FileType::RegularFile), reason);
                        continue;
                    }
                    self.recover_file(child, &inode, &path)?;
                }
                other => self.skip(path, child, Some(other), SkipReason::UnsupportedType(other)),
            }
        }

        Ok(())
    }

    fn recover_directory(&mut self, dentry: Dentry, inode: &InodeView, path: &Path) -> Result<()> {
        match std::fs::create_dir(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Left behind by an earlier run, possibly with its recovered
                // mode; the final pass restores it
                make_owner_accessible(path, 0o700)?;
            }
            Err(e) => return Err(e.into()),
        }

        self.fixer
            .apply(path, inode.permissions(), inode.atime, inode.mtime, true)?;

        self.record(EntryOutcome {
            path: path.to_path_buf(),
            dentry: dentry.address,
            file_type: Some(FileType::Directory),
            status: EntryStatus::Recovered {
                bytes: 0,
                missing_pages: Vec::new(),
                hashes: Vec::new(),
            },
        });
        Ok(())
    }

    fn recover_file(&mut self, dentry: Dentry, inode: &InodeView, path: &Path) -> Result<()> {
        let contents = self.reassembler.reassemble(inode)?;

        // A file from an earlier run may carry a read-only recovered mode
        if std::fs::symlink_metadata(path).is_ok_and(|m| !m.is_dir()) {
            std::fs::remove_file(path)?;
        }

        let mut file = File::create(path)?;
        file.write_all(&contents.data)?;
        file.flush()?;
        drop(file);

        self.fixer
            .apply(path, inode.permissions(), inode.atime, inode.mtime, false)?;

        let hashes = self
            .config
            .hash_algorithms
            .iter()
            .map(|algorithm| calculate_hash(&contents.data, *algorithm))
            .collect();

        tracing::debug!("Recovered {} ({} bytes)", path.display(), contents.data.len());

        self.record(EntryOutcome {
            path: path.to_path_buf(),
            dentry: dentry.address,
            file_type: Some(FileType::RegularFile),
            status: EntryStatus::Recovered {
                bytes: contents.data.len() as u64,
                missing_pages: contents.missing_pages,
                hashes,
            },
        });
        Ok(())
    }

    fn skip(
        &mut self,
        path: PathBuf,
        dentry: Dentry,
        file_type: Option<FileType>,
        reason: SkipReason,
    ) {
        self.record(EntryOutcome {
            path,
            dentry: dentry.address,
            file_type,
            status: EntryStatus::Skipped(reason),
        });
    }

    fn record(&mut self, outcome: EntryOutcome) {
        let current_path = outcome.path.clone();
        self.report.record(outcome);

        if let Some(progress) = self.progress {
            progress(RecoveryProgress {
                entries_visited: self.report.entries.len(),
                files_recovered: self.report.files_recovered,
                bytes_recovered: self.report.bytes_recovered,
                current_path,
            });
        }
    }
}

/// Add `bits` to the owner permissions of an existing path
fn make_owner_accessible(path: &Path, bits: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & bits != bits {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | bits))?;
        }
    }
    #[cfg(not(unix))]
    let _ = (path, bits);
    Ok(())
}

/// Output path component for a raw entry name.
///
/// Returns `None` for names that cannot name a child (empty, `.`, `..`).
/// Slashes, which no real entry carries, are replaced so a name never
/// escapes its parent directory.
pub fn path_component(name: &[u8]) -> Option<OsString> {
    if name.is_empty() || name == b"." || name == b".." {
        return None;
    }

    let cleaned: Vec<u8> = name
        .iter()
        .map(|&b| if b == b'/' { b'_' } else { b })
        .collect();

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        Some(OsString::from_vec(cleaned))
    }
    #[cfg(not(unix))]
    {
        Some(OsString::from(String::from_utf8_lossy(&cleaned).into_owned()))
    }
}
