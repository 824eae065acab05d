//! Host memory mappings backing guest RAM.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::memory::HostAddr;

/// `statfs` magic of a hugetlbfs mount.
pub const HUGETLBFS_MAGIC: u32 = 0x9584_58f6;

/// Where the host memory behind guest RAM comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MemoryBacking {
    /// Private anonymous memory.
    #[default]
    Anonymous,
    /// A private mapping of an unlinked file on a hugetlbfs mount.
    HugeTlbFs(PathBuf),
}

impl MemoryBacking {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => MemoryBacking::HugeTlbFs(path.to_path_buf()),
            None => MemoryBacking::Anonymous,
        }
    }
}

/// An owned `mmap` region.
///
/// The whole mapping is released exactly once, when this value is dropped.
pub struct HostMapping {
    /// Start of the mapping
    ptr: *mut u8,
    /// Length of the mapping in bytes
    size: usize,
}

// Safety: HostMapping owns its mapping and never hands out aliases itself.
unsafe impl Send for HostMapping {}
unsafe impl Sync for HostMapping {}

impl HostMapping {
    /// Map `size` bytes of read/write memory.
    pub fn new(size: u64, backing: &MemoryBacking) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration(
                "guest memory size must be greater than 0".to_string(),
            ));
        }

        let len = usize::try_from(size).map_err(|_| {
            Error::Configuration(format!("{} bytes does not fit the host address space", size))
        })?;

        match backing {
            MemoryBacking::Anonymous => Self::anonymous(len),
            MemoryBacking::HugeTlbFs(path) => Self::hugetlbfs(path, len),
        }
    }

    fn anonymous(len: usize) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::MemoryAllocationFailed {
                size: len as u64,
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size: len,
        })
    }

    fn hugetlbfs(path: &Path, len: usize) -> Result<Self> {
        let page_size = hugetlbfs_page_size(path)?;
        if len as u64 % page_size != 0 {
            return Err(Error::Configuration(format!(
                "can't use hugetlbfs pagesize {} for mem size {}",
                page_size, len
            )));
        }

        let alloc_err = |source| Error::MemoryAllocationFailed {
            size: len as u64,
            source,
        };

        // The file is already unlinked; the mapping keeps the pages alive.
        let file = tempfile::tempfile_in(path).map_err(alloc_err)?;
        file.set_len(len as u64).map_err(alloc_err)?;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE,
                std::os::unix::io::AsRawFd::as_raw_fd(&file),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(alloc_err(io::Error::last_os_error()));
        }

        debug!(
            "mapped {} bytes from hugetlbfs {} (page size {:#x})",
            len,
            path.display(),
            page_size
        );

        Ok(Self {
            ptr: ptr as *mut u8,
            size: len,
        })
    }

    /// Host address of the first mapped byte.
    pub fn base(&self) -> HostAddr {
        HostAddr::from_ptr(self.ptr)
    }

    /// Length of the mapping in bytes.
    pub fn size(&self) -> u64 {
        self.size as u64
    }

    /// Mark the mapping as a candidate for KSM merging and THP promotion.
    ///
    /// Failures are ignored, these are only performance hints.
    pub fn advise(&self) {
        #[cfg(target_os = "linux")]
        for (advice, name) in [
            (libc::MADV_MERGEABLE, "MADV_MERGEABLE"),
            (libc::MADV_HUGEPAGE, "MADV_HUGEPAGE"),
        ] {
            let ret = unsafe { libc::madvise(self.ptr as *mut libc::c_void, self.size, advice) };
            if ret != 0 {
                debug!(
                    "{} on {} bytes ignored: {}",
                    name,
                    self.size,
                    io::Error::last_os_error()
                );
            }
        }
    }
}

impl Drop for HostMapping {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn hugetlbfs_page_size(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Configuration(format!("invalid hugetlbfs path {}", path.display())))?;

    let mut sfs: libc::statfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statfs(c_path.as_ptr(), &mut sfs) } < 0 {
        return Err(Error::Configuration(format!(
            "can't stat {}: {}",
            path.display(),
            io::Error::last_os_error()
        )));
    }

    if sfs.f_type as u32 != HUGETLBFS_MAGIC {
        return Err(Error::Configuration(format!(
            "{} is not hugetlbfs",
            path.display()
        )));
    }

    Ok(sfs.f_bsize as u64)
}

#[cfg(not(target_os = "linux"))]
fn hugetlbfs_page_size(path: &Path) -> Result<u64> {
    Err(Error::Configuration(format!(
        "hugetlbfs backing ({}) is only supported on Linux",
        path.display()
    )))
}
