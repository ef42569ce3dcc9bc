use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::slice;

use crate::phys_mem::Mapping;
use crate::Error;

/// A physically contiguous buffer exported by the u-dma-buf kernel module.
///
/// The buffer is mapped uncached (the device is opened with `O_SYNC`), so CPU
/// writes are visible to the DMA without explicit cache maintenance. Once
/// released, the buffer is an empty shell: its slices are empty and it can no
/// longer be used for transfers.
pub struct UdmaBuffer {
    index: usize,
    name: String,
    size: usize,
    phys_addr: u64,
    mapped: Option<(File, Mapping)>,
}

impl fmt::Debug for UdmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "UdmaBuffer ({})", &self.name)?;
        writeln!(f, "  size: {:#x?}", &self.size)?;
        writeln!(f, "  phys_addr: {:#x?}", &self.phys_addr)?;
        match &self.mapped {
            Some((_, mapping)) => write!(f, "  buffer: {:?}", mapping.as_ptr()),
            None => write!(f, "  buffer: released"),
        }
    }
}

impl UdmaBuffer {
    pub(crate) fn open(
        index: usize,
        name: String,
        dev: &Path,
        size: usize,
        phys_addr: u64,
    ) -> Result<UdmaBuffer, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(dev)
            .map_err(|e| Error::file(dev, e))?;
        let mapping = Mapping::new(&file, 0, size)?;
        Ok(UdmaBuffer {
            index,
            name,
            size,
            phys_addr,
            mapped: Some((file, mapping)),
        })
    }

    /// Unmap and close the buffer. Releasing twice is a no-op.
    pub fn release(&mut self) -> bool {
        match self.mapped.take() {
            Some(_) => {
                log::debug!("released {}", self.name);
                true
            }
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn slice<T: Copy>(&self) -> &[T] {
        match &self.mapped {
            Some((_, m)) => unsafe {
                slice::from_raw_parts(m.as_ptr() as *const T, m.len() / mem::size_of::<T>())
            },
            None => &[],
        }
    }

    pub fn slice_mut<T: Copy>(&mut self) -> &mut [T] {
        match &self.mapped {
            Some((_, m)) => unsafe {
                slice::from_raw_parts_mut(m.as_ptr() as *mut T, m.len() / mem::size_of::<T>())
            },
            None => &mut [],
        }
    }

    /// Virtual address of the mapping, null once released.
    pub fn as_ptr(&self) -> *mut u8 {
        match &self.mapped {
            Some((_, m)) => m.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }
}

unsafe impl Send for UdmaBuffer {}
unsafe impl Sync for UdmaBuffer {}
