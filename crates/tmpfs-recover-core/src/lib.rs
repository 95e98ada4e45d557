use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub mod forensics;
pub mod kernel;
pub mod memory;
pub mod profile;
pub mod recovery;

pub use error::{RecoveryError, Result};

// Re-export key recovery types
pub use recovery::{
    listing, EntryOutcome, EntryStatus, ListingEntry, MissingPagePolicy, RecoveryConfig,
    RecoveryEngine, RecoveryProgress, RecoveryReport, SkipReason, SuperblockCandidate,
};

pub use kernel::{KernelMemory, KernelMountTable, MountEntry, MountSource, ProfiledMemory};
pub use memory::{AddressSpaceConfig, DirectMapSpace, MemoryImage, PhysicalMemory};
pub use profile::Profile;

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    SymbolicLink,
    BlockDevice,
    CharacterDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileType {
    /// File type encoded in the `S_IFMT` bits of an inode mode
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileType::RegularFile,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::SymbolicLink,
            S_IFBLK => FileType::BlockDevice,
            S_IFCHR => FileType::CharacterDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::RegularFile => write!(f, "regular file"),
            FileType::Directory => write!(f, "directory"),
            FileType::SymbolicLink => write!(f, "symbolic link"),
            FileType::BlockDevice => write!(f, "block device"),
            FileType::CharacterDevice => write!(f, "character device"),
            FileType::Fifo => write!(f, "fifo"),
            FileType::Socket => write!(f, "socket"),
            FileType::Unknown => write!(f, "unknown"),
        }
    }
}

/// An opened memory capture together with the profile describing its kernel
pub struct Capture {
    profile: Profile,
    space: DirectMapSpace<MemoryImage>,
}

impl Capture {
    /// Open a raw memory image and its JSON profile
    pub fn open(
        image_path: &Path,
        profile_path: &Path,
        address_space: AddressSpaceConfig,
    ) -> AnyResult<Self> {
        tracing::info!("Opening capture {}", image_path.display());

        let profile = Profile::from_path(profile_path)?;
        let image = MemoryImage::open(image_path)?;
        tracing::info!("Capture holds {} MiB of physical memory", image.size() / (1024 * 1024));

        Ok(Self {
            profile,
            space: DirectMapSpace::new(image, address_space),
        })
    }

    /// Typed view of the kernel's memory
    pub fn kernel(&self) -> ProfiledMemory<'_, DirectMapSpace<MemoryImage>> {
        ProfiledMemory::new(&self.profile, &self.space)
    }

    pub fn physical(&self) -> &MemoryImage {
        self.space.physical()
    }
}

/// List recoverable tmpfs superblocks of a capture as `(index, path)` lines
pub fn list_tmpfs_superblocks(
    capture: &Capture,
    config: &RecoveryConfig,
) -> Result<Vec<ListingEntry>> {
    let kernel = capture.kernel();
    let engine = RecoveryEngine::new(&kernel, capture.physical(), config.clone());
    let candidates = engine.candidates(&KernelMountTable::new(&kernel))?;
    Ok(listing(&candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_mode() {
        assert_eq!(FileType::from_mode(0o100644), FileType::RegularFile);
        assert_eq!(FileType::from_mode(0o040755), FileType::Directory);
        assert_eq!(FileType::from_mode(0o120777), FileType::SymbolicLink);
        assert_eq!(FileType::from_mode(0o020666), FileType::CharacterDevice);
        assert_eq!(FileType::from_mode(0o060660), FileType::BlockDevice);
        assert_eq!(FileType::from_mode(0o010644), FileType::Fifo);
        assert_eq!(FileType::from_mode(0o140755), FileType::Socket);
        assert_eq!(FileType::from_mode(0o000644), FileType::Unknown);
    }
}
