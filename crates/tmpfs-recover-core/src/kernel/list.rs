use std::collections::HashSet;

use super::KernelMemory;
use crate::error::{RecoveryError, Result};

/// Upper bound on the length of any list walked in a capture
pub const MAX_LIST_ENTRIES: usize = 1 << 20;

/// Addresses of the `structure` instances linked through their `member`
/// `list_head` on the circular list anchored at `head`.
///
/// Walking stops at the anchor, on a null link, or when a node repeats.
pub fn list_entries<K: KernelMemory + ?Sized>(
    kernel: &K,
    head: u64,
    structure: &str,
    member: &str,
) -> Result<Vec<u64>> {
    list_entries_bounded(kernel, head, structure, member, MAX_LIST_ENTRIES)
}

/// [`list_entries`] with an explicit cap; more than `limit` entries is
/// `CorruptStructure`
pub fn list_entries_bounded<K: KernelMemory + ?Sized>(
    kernel: &K,
    head: u64,
    structure: &str,
    member: &str,
    limit: usize,
) -> Result<Vec<u64>> {
    let member_offset = kernel.field_offset(structure, member)?;
    let next_offset = kernel.field_offset("list_head", "next")?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut node = kernel.read_pointer(head.wrapping_add(next_offset))?;

    while node != head && node != 0 {
        if !seen.insert(node) {
            tracing::warn!("List at {:#x} loops back to {:#x}, stopping", head, node);
            break;
        }
        if entries.len() >= limit {
            return Err(RecoveryError::CorruptStructure(format!(
                "list at {:#x} has more than {} entries",
                head, limit
            )));
        }
        entries.push(node.wrapping_sub(member_offset));
        node = kernel.read_pointer(node.wrapping_add(next_offset))?;
    }

    Ok(entries)
}
