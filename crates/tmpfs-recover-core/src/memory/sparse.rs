use std::collections::HashMap;

use super::{PhysicalMemory, PAGE_SIZE};
use crate::error::Result;

/// Physical memory held as a sparse set of page frames.
///
/// Useful for partial captures that only carry a subset of frames. Frames that
/// were never written read back as zeroes.
#[derive(Debug, Default, Clone)]
pub struct SparseMemory {
    frames: HashMap<u64, Box<[u8; PAGE_SIZE]>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `data` into physical memory starting at `offset`
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        let mut written = 0usize;
        while written < data.len() {
            let address = offset + written as u64;
            let frame = address / PAGE_SIZE as u64;
            let within = (address % PAGE_SIZE as u64) as usize;
            let chunk = std::cmp::min(PAGE_SIZE - within, data.len() - written);

            let page = self
                .frames
                .entry(frame)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
            page[within..within + chunk].copy_from_slice(&data[written..written + chunk]);
            written += chunk;
        }
    }
}

impl PhysicalMemory for SparseMemory {
    fn read_physical(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        let mut read = 0usize;
        while read < length {
            let address = offset + read as u64;
            let frame = address / PAGE_SIZE as u64;
            let within = (address % PAGE_SIZE as u64) as usize;
            let chunk = std::cmp::min(PAGE_SIZE - within, length - read);

            if let Some(page) = self.frames.get(&frame) {
                buffer[read..read + chunk].copy_from_slice(&page[within..within + chunk]);
            }
            read += chunk;
        }
        Ok(buffer)
    }
}
