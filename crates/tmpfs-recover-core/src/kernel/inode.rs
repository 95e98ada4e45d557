use serde::{Deserialize, Serialize};

use super::{FieldValue, KernelMemory};
use crate::error::{RecoveryError, Result};
use crate::FileType;

/// Snapshot of the inode fields recovery needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeView {
    pub address: u64,
    pub mode: u32,
    pub size: u64,
    /// Access time, seconds since the epoch
    pub atime: i64,
    /// Modification time, seconds since the epoch
    pub mtime: i64,
    /// Address of the page cache radix tree root
    pub page_tree: u64,
}

impl InodeView {
    pub fn read<K: KernelMemory + ?Sized>(kernel: &K, address: u64) -> Result<Self> {
        let mode = kernel.read_u64("inode", "i_mode", address)? as u32;

        let size = kernel.read_field("inode", "i_size", address)?.as_i64();
        if size < 0 {
            return Err(RecoveryError::CorruptStructure(format!(
                "inode {:#x} has negative size {}",
                address, size
            )));
        }

        let atime = read_seconds(kernel, address, "i_atime")?;
        let mtime = read_seconds(kernel, address, "i_mtime")?;

        let mut mapping = kernel.read_u64("inode", "i_mapping", address)?;
        if mapping == 0 {
            mapping = address + kernel.field_offset("inode", "i_data")?;
        }
        let page_tree = mapping + kernel.field_offset("address_space", "page_tree")?;

        Ok(Self {
            address,
            mode,
            size: size as u64,
            atime,
            mtime,
            page_tree,
        })
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    /// Permission bits including setuid, setgid and sticky
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Seconds part of an inode timestamp, whichever layout the profile uses
fn read_seconds<K: KernelMemory + ?Sized>(kernel: &K, inode: u64, name: &str) -> Result<i64> {
    let flat = format!("{}_sec", name);
    let private = format!("__{}", name);

    let field = if kernel.has_field("inode", name) {
        name
    } else if kernel.has_field("inode", &flat) {
        flat.as_str()
    } else {
        private.as_str()
    };

    match kernel.read_field("inode", field, inode)? {
        FieldValue::Embedded { type_name, address } => {
            Ok(kernel.read_field(&type_name, "tv_sec", address)?.as_i64())
        }
        value => Ok(value.as_i64()),
    }
}
