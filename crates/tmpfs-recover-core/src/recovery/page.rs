//! Page descriptor to physical page translation

use crate::error::{RecoveryError, Result};
use crate::kernel::KernelMemory;
use crate::memory::{PhysicalMemory, PAGE_SIZE};

const PAGE_SHIFT: u32 = 12;

/// Symbols that hold the base of the page descriptor array, in lookup order
const PAGE_ARRAY_SYMBOLS: [&str; 2] = ["mem_map", "vmemmap_base"];

/// Find the base of the kernel's `struct page` array.
///
/// An explicit override wins; otherwise the pointer stored at the first
/// symbol the profile knows is used.
pub fn page_array_base<K: KernelMemory + ?Sized>(
    kernel: &K,
    override_base: Option<u64>,
) -> Result<u64> {
    if let Some(base) = override_base {
        return Ok(base);
    }

    for symbol in PAGE_ARRAY_SYMBOLS {
        if let Ok(address) = kernel.symbol_address(symbol) {
            let base = kernel.read_pointer(address)?;
            tracing::debug!("Page descriptor array at {:#x} (from {})", base, symbol);
            return Ok(base);
        }
    }

    Err(RecoveryError::UnknownSymbol(PAGE_ARRAY_SYMBOLS.join(" or ")))
}

/// Reads the physical page behind a `struct page` pointer
pub struct PageResolver<'a, P: ?Sized> {
    physical: &'a P,
    mem_map: u64,
    descriptor_size: u64,
}

impl<'a, P: PhysicalMemory + ?Sized> PageResolver<'a, P> {
    pub fn new(physical: &'a P, mem_map: u64, descriptor_size: u64) -> Self {
        Self {
            physical,
            mem_map,
            descriptor_size,
        }
    }

    /// Resolver using the profile's `struct page` size
    pub fn from_kernel<K: KernelMemory + ?Sized>(
        kernel: &K,
        physical: &'a P,
        mem_map: u64,
    ) -> Result<Self> {
        let descriptor_size = kernel.size_of("page")?;
        if descriptor_size == 0 {
            return Err(RecoveryError::CorruptStructure(
                "profile declares a zero-sized struct page".to_string(),
            ));
        }
        Ok(Self::new(physical, mem_map, descriptor_size))
    }

    /// Page frame number of a `struct page` pointer
    pub fn frame_number(&self, page: u64) -> Result<u64> {
        let outside = || RecoveryError::PageOutsideMemMap {
            page,
            mem_map: self.mem_map,
        };

        let delta = page.checked_sub(self.mem_map).ok_or_else(outside)?;
        if delta % self.descriptor_size != 0 {
            return Err(outside());
        }
        Ok(delta / self.descriptor_size)
    }

    pub fn physical_offset(&self, page: u64) -> Result<u64> {
        self.frame_number(page)?
            .checked_mul(1 << PAGE_SHIFT)
            .ok_or(RecoveryError::PageOutsideMemMap {
                page,
                mem_map: self.mem_map,
            })
    }

    /// The 4096 bytes of physical memory described by `page`.
    ///
    /// Short reads are zero-padded and long reads cut, so the result is
    /// always exactly one page.
    pub fn resolve(&self, page: u64) -> Result<Vec<u8>> {
        let offset = self.physical_offset(page)?;
        let mut data = self.physical.read_physical(offset, PAGE_SIZE)?;
        if data.len() != PAGE_SIZE {
            tracing::warn!(
                "Short read of {} bytes for page frame at {:#x}, padding to {}",
                data.len(),
                offset,
                PAGE_SIZE
            );
            data.resize(PAGE_SIZE, 0);
        }
        Ok(data)
    }
}
