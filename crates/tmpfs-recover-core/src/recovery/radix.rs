//! Page cache radix tree lookup
//!
//! Each inode's page cache is a 64-way radix tree keyed by page index. A tree
//! holding only index 0 stores the page pointer directly in the root's `rnode`
//! slot; otherwise `rnode` points at the top node with its low bit set.

use crate::error::{RecoveryError, Result};
use crate::kernel::KernelMemory;

pub const RADIX_TREE_MAP_SHIFT: u32 = 6;
pub const RADIX_TREE_MAP_SIZE: u64 = 1 << RADIX_TREE_MAP_SHIFT;
pub const RADIX_TREE_MAP_MASK: u64 = RADIX_TREE_MAP_SIZE - 1;

const RADIX_TREE_INDIRECT_PTR: u64 = 1;

/// Tallest tree that can address a 64-bit index
const MAX_HEIGHT: u64 = 11;

/// Decoded `rnode` slot of a radix tree root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSlot {
    /// Single entry for index 0, stored inline
    Direct(u64),
    /// Pointer to the top `radix_tree_node`, tag bit removed
    Indirect(u64),
}

impl RootSlot {
    pub fn decode(raw: u64) -> Self {
        if raw & RADIX_TREE_INDIRECT_PTR == 0 {
            RootSlot::Direct(raw)
        } else {
            RootSlot::Indirect(raw & !RADIX_TREE_INDIRECT_PTR)
        }
    }
}

/// A located page cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    /// Address of the slot holding the entry
    pub slot_address: u64,
    /// The `struct page` pointer stored in the slot
    pub page: u64,
}

/// Largest index a tree of the given height can hold
pub fn max_index(height: u64) -> u64 {
    let bits = height * RADIX_TREE_MAP_SHIFT as u64;
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Finds pages in an inode's page cache
pub struct PageLocator<'a, K: ?Sized> {
    kernel: &'a K,
}

impl<'a, K: KernelMemory + ?Sized> PageLocator<'a, K> {
    pub fn new(kernel: &'a K) -> Self {
        Self { kernel }
    }

    /// Look up page `index` in the tree rooted at the `radix_tree_root` at `root`
    pub fn locate(&self, root: u64, index: u64) -> Result<Option<PageSlot>> {
        let k = self.kernel;
        let rnode_address = root + k.field_offset("radix_tree_root", "rnode")?;
        let raw = k.read_pointer(rnode_address)?;

        let mut node = match RootSlot::decode(raw) {
            RootSlot::Direct(page) => {
                if index > 0 || page == 0 {
                    return Ok(None);
                }
                return Ok(Some(PageSlot {
                    slot_address: rnode_address,
                    page,
                }));
            }
            RootSlot::Indirect(node) => node,
        };

        let mut height = k.read_u64("radix_tree_node", "height", node)?;
        if height == 0 || height > MAX_HEIGHT {
            return Err(RecoveryError::CorruptStructure(format!(
                "radix tree node {:#x} has height {}",
                node, height
            )));
        }
        if index > max_index(height) {
            return Ok(None);
        }

        let slots_offset = k.field_offset("radix_tree_node", "slots")?;
        let pointer_size = k.pointer_size();
        let mut shift = (height - 1) * RADIX_TREE_MAP_SHIFT as u64;

        loop {
            let chunk = (index >> shift) & RADIX_TREE_MAP_MASK;
            let slot_address = node + slots_offset + chunk * pointer_size;
            let slot = k.read_pointer(slot_address)?;

            height -= 1;
            if height == 0 {
                if slot == 0 {
                    return Ok(None);
                }
                return Ok(Some(PageSlot {
                    slot_address,
                    page: slot,
                }));
            }

            if slot == 0 {
                return Ok(None);
            }
            node = slot & !RADIX_TREE_INDIRECT_PTR;
            shift -= RADIX_TREE_MAP_SHIFT as u64;
        }
    }
}
