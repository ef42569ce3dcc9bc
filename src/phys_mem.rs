use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::path::PathBuf;
use std::ptr;

use crate::registers::RegisterIo;
use crate::registers::Word;
use crate::Error;

pub const DEV_MEM: &str = "/dev/mem";

/// A shared, read/write mapping of a file or device, unmapped on drop.
pub(crate) struct Mapping {
    base: *mut libc::c_void,
    len: usize,
}

impl Mapping {
    pub(crate) fn new(file: &File, offset: u64, len: usize) -> Result<Mapping, Error> {
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Mmap {
                offset,
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Mapping { base, len })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.base as *mut u8
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base, self.len);
        }
    }
}

unsafe impl Send for Mapping {}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

/// The physical memory device, opened read/write with synchronous I/O.
pub struct PhysMem {
    path: PathBuf,
    file: File,
}

impl fmt::Debug for PhysMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysMem ({})", self.path.display())
    }
}

impl PhysMem {
    pub fn open() -> Result<PhysMem, Error> {
        PhysMem::open_path(DEV_MEM)
    }

    /// Open another device (or a plain file) with `/dev/mem` semantics.
    pub fn open_path(path: impl AsRef<Path>) -> Result<PhysMem, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|e| Error::file(path, e))?;
        Ok(PhysMem {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map `len` bytes starting at physical address `phys_addr`.
    ///
    /// The address does not need to be page aligned; the enclosing pages are
    /// mapped and the window starts at `phys_addr`.
    pub fn map(&self, phys_addr: u64, len: usize) -> Result<PhysMemWindow, Error> {
        let page_offset = (phys_addr % page_size() as u64) as usize;
        let map_base = phys_addr - page_offset as u64;
        let mapping = Mapping::new(&self.file, map_base, len + page_offset)?;
        log::debug!(
            "mapped {:#x} bytes of {} at {:#x} to {:?}",
            len,
            self.path.display(),
            phys_addr,
            mapping.as_ptr()
        );
        Ok(PhysMemWindow {
            mapping,
            page_offset,
            phys_addr,
            len,
        })
    }
}

/// A mapped window of physical memory, accessed with volatile reads and
/// writes.
pub struct PhysMemWindow {
    mapping: Mapping,
    page_offset: usize,
    phys_addr: u64,
    len: usize,
}

impl fmt::Debug for PhysMemWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PhysMemWindow")?;
        writeln!(f, "  phys_addr: {:#x?}", &self.phys_addr)?;
        writeln!(f, "  base: {:?}", &self.as_ptr())?;
        write!(f, "  size: {:#x?}", &self.len)
    }
}

impl PhysMemWindow {
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    pub fn as_ptr(&self) -> *mut u8 {
        unsafe { self.mapping.as_ptr().add(self.page_offset) }
    }

    #[inline(always)]
    fn check<T: Word>(&self, offset: usize) {
        assert!(
            offset + T::WIDTH <= self.len,
            "register access at {:#x} outside {:#x} byte window",
            offset,
            self.len
        );
        assert_eq!(
            (self.phys_addr as usize + offset) % T::WIDTH,
            0,
            "unaligned register access at {:#x}",
            self.phys_addr as usize + offset
        );
    }
}

impl RegisterIo for PhysMemWindow {
    #[inline]
    fn read<T: Word>(&self, offset: usize) -> T {
        self.check::<T>(offset);
        unsafe { ptr::read_volatile(self.as_ptr().add(offset) as *const T) }
    }

    #[inline]
    fn write<T: Word>(&self, offset: usize, value: T) {
        self.check::<T>(offset);
        unsafe { ptr::write_volatile(self.as_ptr().add(offset) as *mut T, value) }
    }

    fn len(&self) -> usize {
        self.len
    }
}
