//! File content reassembly from the page cache
//!
//! Walks a file's pages in offset order, reads each one from physical memory
//! and trims the tail of the last page to the inode's declared size.

use serde::{Deserialize, Serialize};

use super::page::PageResolver;
use super::radix::PageLocator;
use crate::error::{RecoveryError, Result};
use crate::kernel::{InodeView, KernelMemory};
use crate::memory::{PhysicalMemory, PAGE_SIZE};

/// What to do with a page that is not in the page cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPagePolicy {
    /// Substitute 4096 zero bytes and record the page index
    #[default]
    ZeroFill,
    /// Fail the whole run
    Abort,
}

/// Contents of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledFile {
    pub data: Vec<u8>,
    /// Page indexes that were not resident and were zero-filled
    pub missing_pages: Vec<u64>,
}

/// Bytes of the final page that lie past the end of a file of `size` bytes
pub fn trailing_slack(size: u64) -> usize {
    let extra = PAGE_SIZE - (size % PAGE_SIZE as u64) as usize;
    if extra == PAGE_SIZE {
        0
    } else {
        extra
    }
}

pub struct FileReassembler<'a, K: ?Sized, P: ?Sized> {
    locator: PageLocator<'a, K>,
    resolver: PageResolver<'a, P>,
    policy: MissingPagePolicy,
}

impl<'a, K, P> FileReassembler<'a, K, P>
where
    K: KernelMemory + ?Sized,
    P: PhysicalMemory + ?Sized,
{
    pub fn new(
        locator: PageLocator<'a, K>,
        resolver: PageResolver<'a, P>,
        policy: MissingPagePolicy,
    ) -> Self {
        Self {
            locator,
            resolver,
            policy,
        }
    }

    pub fn reassemble(&self, inode: &InodeView) -> Result<ReassembledFile> {
        // The declared size is untrusted; grow only as pages are produced
        let page_count = inode.size.div_ceil(PAGE_SIZE as u64);
        let mut data = Vec::new();
        let mut missing_pages = Vec::new();

        for index in 0..page_count {
            match self.locator.locate(inode.page_tree, index)? {
                Some(slot) => data.extend_from_slice(&self.resolver.resolve(slot.page)?),
                None => match self.policy {
                    MissingPagePolicy::ZeroFill => {
                        tracing::warn!(
                            "Page {} of inode {:#x} is not resident, zero-filling",
                            index,
                            inode.address
                        );
                        missing_pages.push(index);
                        data.resize(data.len() + PAGE_SIZE, 0);
                    }
                    MissingPagePolicy::Abort => {
                        return Err(RecoveryError::MissingPage {
                            inode: inode.address,
                            index,
                        });
                    }
                },
            }
        }

        let slack = trailing_slack(inode.size);
        data.truncate(data.len() - slack.min(data.len()));

        Ok(ReassembledFile {
            data,
            missing_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slack() {
        assert_eq!(trailing_slack(0), 0);
        assert_eq!(trailing_slack(1), 4095);
        assert_eq!(trailing_slack(4096), 0);
        assert_eq!(trailing_slack(5000), 3192);
        assert_eq!(trailing_slack(8192), 0);
    }
}
