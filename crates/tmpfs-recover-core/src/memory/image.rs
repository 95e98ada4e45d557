//! Raw physical memory captures

use anyhow::{Context, Result};
use memmap2::MmapOptions;
use std::fs::File;
use std::path::Path;

use super::PhysicalMemory;

/// A memory-mapped raw (padded) physical memory dump
pub struct MemoryImage {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
}

impl MemoryImage {
    /// Open a raw memory capture
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening memory image {}", path.display()))?;
        let size = file.metadata()?.len();

        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .with_context(|| format!("mapping memory image {}", path.display()))?
        };

        tracing::debug!("Mapped {} ({} bytes)", path.display(), size);

        Ok(MemoryImage {
            _file: file,
            mmap,
            size,
        })
    }

    /// Size of the capture in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl PhysicalMemory for MemoryImage {
    fn read_physical(&self, offset: u64, length: usize) -> crate::Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];

        if offset < self.size {
            let start = offset as usize;
            let end = std::cmp::min(start.saturating_add(length), self.mmap.len());
            buffer[..end - start].copy_from_slice(&self.mmap[start..end]);
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_past_end_are_zero_filled() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAB; 6000]).unwrap();
        file.flush().unwrap();

        let image = MemoryImage::open(file.path()).unwrap();
        assert_eq!(image.size(), 6000);

        let page = image.read_physical(4096, 4096).unwrap();
        assert_eq!(page.len(), 4096);
        assert!(page[..1904].iter().all(|&b| b == 0xAB));
        assert!(page[1904..].iter().all(|&b| b == 0));

        let beyond = image.read_physical(1 << 20, 16).unwrap();
        assert_eq!(beyond, vec![0u8; 16]);
    }
}
