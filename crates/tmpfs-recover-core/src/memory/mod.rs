//! Physical and virtual memory access for captured memory images

use crate::error::Result;

mod direct_map;
mod image;
mod sparse;

pub use direct_map::{AddressSpaceConfig, DirectMapSpace};
pub use image::MemoryImage;
pub use sparse::SparseMemory;

/// Size of a physical page frame
pub const PAGE_SIZE: usize = 4096;

/// Read access to physical memory.
///
/// Regions that are not backed by the capture read back as zeroes.
pub trait PhysicalMemory {
    fn read_physical(&self, offset: u64, length: usize) -> Result<Vec<u8>>;
}

/// Read access to kernel virtual memory
pub trait VirtualMemory {
    fn read_virtual(&self, address: u64, length: usize) -> Result<Vec<u8>>;
}

impl<P: PhysicalMemory + ?Sized> PhysicalMemory for &P {
    fn read_physical(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        (**self).read_physical(offset, length)
    }
}

impl<V: VirtualMemory + ?Sized> VirtualMemory for &V {
    fn read_virtual(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        (**self).read_virtual(address, length)
    }
}
