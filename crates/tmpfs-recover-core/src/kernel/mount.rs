//! Mount enumeration
//!
//! Walks the mount namespace of `init_task` and resolves, for every mount,
//! the superblock, device name, filesystem type and mount path.

use serde::{Deserialize, Serialize};

use super::{list_entries, Dentry, KernelMemory};
use crate::error::Result;

/// Longest device or filesystem type name read from the capture
const MAX_STRING_LEN: usize = 256;

/// Bound on dentry and mount hops while building a mount path
const MAX_PATH_STEPS: usize = 4096;

/// One mounted filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Address of the `struct super_block`
    pub superblock: u64,
    pub device_name: String,
    pub mount_path: String,
    pub fs_type: String,
}

/// Source of the currently mounted filesystems, in mount-table order
pub trait MountSource {
    fn mounts(&self) -> Result<Vec<MountEntry>>;
}

/// A fixed, already parsed mount table
#[derive(Debug, Clone, Default)]
pub struct StaticMountTable {
    entries: Vec<MountEntry>,
}

impl StaticMountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }
}

impl MountSource for StaticMountTable {
    fn mounts(&self) -> Result<Vec<MountEntry>> {
        Ok(self.entries.clone())
    }
}

/// Mount table read from the kernel's initial mount namespace
pub struct KernelMountTable<'a, K: ?Sized> {
    kernel: &'a K,
}

impl<'a, K: KernelMemory + ?Sized> KernelMountTable<'a, K> {
    pub fn new(kernel: &'a K) -> Self {
        Self { kernel }
    }

    fn read_mount(&self, mount: u64) -> Result<Option<MountEntry>> {
        let k = self.kernel;

        let (vfsmount_type, vfsmount) = k.embedded("mount", "mnt", mount)?;
        let superblock = k.read_u64(&vfsmount_type, "mnt_sb", vfsmount)?;
        if superblock == 0 {
            tracing::debug!("Mount {:#x} has no superblock, skipping", mount);
            return Ok(None);
        }

        let device = k.read_u64("mount", "mnt_devname", mount)?;
        let device_name = lossy(k.dereference_string(device, MAX_STRING_LEN)?);

        let fs_type_ptr = k.read_u64("super_block", "s_type", superblock)?;
        let fs_type = if fs_type_ptr == 0 {
            String::new()
        } else {
            let name = k.read_u64("file_system_type", "name", fs_type_ptr)?;
            lossy(k.dereference_string(name, MAX_STRING_LEN)?)
        };

        Ok(Some(MountEntry {
            superblock,
            device_name,
            mount_path: self.mount_path(mount)?,
            fs_type,
        }))
    }

    fn mount_root(&self, mount: u64) -> Result<u64> {
        let (vfsmount_type, vfsmount) = self.kernel.embedded("mount", "mnt", mount)?;
        self.kernel.read_u64(&vfsmount_type, "mnt_root", vfsmount)
    }

    /// Absolute path of a mount, crossing parent mounts up to the namespace root
    fn mount_path(&self, mount: u64) -> Result<String> {
        let k = self.kernel;
        let mut components: Vec<Vec<u8>> = Vec::new();
        let mut current = mount;
        let mut dentry = Dentry::new(self.mount_root(mount)?);

        for _ in 0..MAX_PATH_STEPS {
            let parent_dentry = dentry.parent(k)?;
            if dentry.address == self.mount_root(current)? || parent_dentry == dentry {
                let parent_mount = k.read_u64("mount", "mnt_parent", current)?;
                if parent_mount == current || parent_mount == 0 {
                    break;
                }
                dentry = Dentry::new(k.read_u64("mount", "mnt_mountpoint", current)?);
                current = parent_mount;
                continue;
            }

            components.push(dentry.name(k)?);
            dentry = parent_dentry;
        }

        let mut path = String::new();
        for component in components.iter().rev() {
            path.push('/');
            path.push_str(&String::from_utf8_lossy(component));
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }
}

impl<'a, K: KernelMemory + ?Sized> MountSource for KernelMountTable<'a, K> {
    fn mounts(&self) -> Result<Vec<MountEntry>> {
        let k = self.kernel;

        let init_task = k.symbol_address("init_task")?;
        let nsproxy = k.read_u64("task_struct", "nsproxy", init_task)?;
        let mnt_ns = k.read_u64("nsproxy", "mnt_ns", nsproxy)?;
        let head = mnt_ns + k.field_offset("mnt_namespace", "list")?;

        let mut entries = Vec::new();
        for mount in list_entries(k, head, "mount", "mnt_list")? {
            if let Some(entry) = self.read_mount(mount)? {
                tracing::debug!(
                    "Mount {} on {} type {} (sb {:#x})",
                    entry.device_name,
                    entry.mount_path,
                    entry.fs_type,
                    entry.superblock
                );
                entries.push(entry);
            }
        }

        tracing::info!("Found {} mounts in the initial namespace", entries.len());
        Ok(entries)
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
