use serde::{Deserialize, Serialize};

use super::{PhysicalMemory, VirtualMemory};
use crate::error::{RecoveryError, Result};

/// Linear kernel address translation parameters (x86_64 defaults, no KASLR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpaceConfig {
    /// Base of the direct mapping of physical memory
    pub page_offset: u64,
    /// Base of the kernel image mapping
    pub kernel_map_base: u64,
    /// Physical load address of the kernel image
    pub phys_base: u64,
}

impl Default for AddressSpaceConfig {
    fn default() -> Self {
        Self {
            page_offset: 0xffff_8800_0000_0000,
            kernel_map_base: 0xffff_ffff_8000_0000,
            phys_base: 0,
        }
    }
}

/// Kernel virtual address space built from the direct map and the kernel
/// image map over a physical memory source.
pub struct DirectMapSpace<P> {
    physical: P,
    config: AddressSpaceConfig,
}

impl<P: PhysicalMemory> DirectMapSpace<P> {
    pub fn new(physical: P, config: AddressSpaceConfig) -> Self {
        Self { physical, config }
    }

    pub fn physical(&self) -> &P {
        &self.physical
    }

    /// Translate a kernel virtual address to a physical offset
    pub fn translate(&self, address: u64) -> Result<u64> {
        if address >= self.config.kernel_map_base {
            Ok(address - self.config.kernel_map_base + self.config.phys_base)
        } else if address >= self.config.page_offset {
            Ok(address - self.config.page_offset)
        } else {
            Err(RecoveryError::InvalidAddress(address))
        }
    }
}

impl<P: PhysicalMemory> VirtualMemory for DirectMapSpace<P> {
    fn read_virtual(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        let physical = self.translate(address)?;
        self.physical.read_physical(physical, length)
    }
}

impl<P: PhysicalMemory> PhysicalMemory for DirectMapSpace<P> {
    fn read_physical(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.physical.read_physical(offset, length)
    }
}
