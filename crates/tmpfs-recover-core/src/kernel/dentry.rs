use super::{list_entries, KernelMemory};
use crate::error::Result;

/// Longest name a directory entry can carry
pub const MAX_NAME_LEN: usize = 255;

/// A `struct dentry` in the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dentry {
    pub address: u64,
}

impl Dentry {
    pub fn new(address: u64) -> Self {
        Self { address }
    }

    /// Raw name bytes, bounded by the recorded length and cut at the first NUL
    pub fn name<K: KernelMemory + ?Sized>(&self, kernel: &K) -> Result<Vec<u8>> {
        let (qstr, qstr_address) = kernel.embedded("dentry", "d_name", self.address)?;
        let name = kernel.read_u64(&qstr, "name", qstr_address)?;

        let mut limit = MAX_NAME_LEN;
        if kernel.has_field(&qstr, "len") {
            let len = kernel.read_u64(&qstr, "len", qstr_address)? as usize;
            limit = limit.min(len);
        }

        kernel.dereference_string(name, limit)
    }

    /// Address of the backing inode, if the entry has one
    pub fn inode<K: KernelMemory + ?Sized>(&self, kernel: &K) -> Result<Option<u64>> {
        let inode = kernel.read_u64("dentry", "d_inode", self.address)?;
        Ok((inode != 0).then_some(inode))
    }

    pub fn parent<K: KernelMemory + ?Sized>(&self, kernel: &K) -> Result<Dentry> {
        Ok(Dentry::new(kernel.read_u64("dentry", "d_parent", self.address)?))
    }

    /// Child entries in list order
    pub fn children<K: KernelMemory + ?Sized>(&self, kernel: &K) -> Result<Vec<Dentry>> {
        let head = self.address + kernel.field_offset("dentry", "d_subdirs")?;
        // Older layouts link siblings through the d_u union
        let member = if kernel.has_field("dentry", "d_child") {
            "d_child"
        } else {
            "d_u"
        };

        Ok(list_entries(kernel, head, "dentry", member)?
            .into_iter()
            .map(Dentry::new)
            .collect())
    }
}
