//! Guest RAM: one flat region of host memory registered as guest physical memory.

use log::{debug, info, warn};

use crate::arch::BootLayout;
use crate::backend::{Hypervisor, MemorySlot};
use crate::error::{Error, Result};
use crate::memory::mmap::{HostMapping, MemoryBacking};
use crate::memory::{GuestAddr, GuestRange, HostAddr};

/// Guest RAM and its host backing.
///
/// The host mapping is over-allocated by the layout's slack so the region can
/// start on an aligned host address. `host_region_start` aliases into the
/// mapping; only the mapping owns memory.
pub struct GuestMemoryRegion {
    /// Raw host allocation, unmapped on drop
    mapping: HostMapping,
    /// Aligned start of guest RAM inside the mapping
    host_region_start: HostAddr,
    /// Size of guest RAM in bytes
    size: u64,
    /// Guest physical address of `host_region_start`
    guest_base: GuestAddr,
}

impl GuestMemoryRegion {
    /// Map host memory for `requested` bytes of guest RAM.
    ///
    /// The size is clamped to the layout's maximum. The whole mapping is
    /// advised for KSM and THP.
    pub fn allocate(requested: u64, backing: &MemoryBacking, layout: &BootLayout) -> Result<Self> {
        let size = requested.min(layout.max_memory);
        if size == 0 {
            return Err(Error::Configuration(
                "guest memory size must be greater than 0".to_string(),
            ));
        }
        if size < requested {
            warn!(
                "requested {} bytes of guest memory, clamped to {} bytes",
                requested, size
            );
        }
        debug_assert!(layout.alloc_slack >= layout.host_align);

        let alloc_size = size + layout.alloc_slack;
        let mapping = HostMapping::new(alloc_size, backing)?;
        let host_region_start = mapping.base().align_up(layout.host_align);

        mapping.advise();

        debug!(
            "guest memory: {} bytes mapped at {}, region starts at {}",
            alloc_size,
            mapping.base(),
            host_region_start
        );

        Ok(Self {
            mapping,
            host_region_start,
            size,
            guest_base: GuestAddr(layout.memory_base),
        })
    }

    /// Register the aligned region with the hypervisor as guest RAM.
    pub fn register<H: Hypervisor>(&self, hypervisor: &H) -> Result<()> {
        let slot = MemorySlot {
            slot: 0,
            guest_phys_addr: self.guest_base,
            size: self.size,
            host_addr: self.host_region_start,
        };

        // Safety: the range lies inside `self.mapping`, which the VM keeps
        // alive until after the hypervisor VM is torn down.
        unsafe { hypervisor.register_memory(&slot) }.map_err(|source| {
            Error::MemoryRegistration {
                guest_addr: self.guest_base.raw(),
                size: self.size,
                source,
            }
        })?;

        info!(
            "Registered {} bytes of guest memory at {}",
            self.size, self.guest_base
        );
        Ok(())
    }

    /// Start of the raw host allocation.
    pub fn host_alloc_base(&self) -> HostAddr {
        self.mapping.base()
    }

    /// Size of the raw host allocation, slack included.
    pub fn host_alloc_size(&self) -> u64 {
        self.mapping.size()
    }

    /// Host address backing the first byte of guest RAM.
    pub fn host_region_start(&self) -> HostAddr {
        self.host_region_start
    }

    /// Guest RAM size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Guest physical address of the first byte of RAM.
    pub fn guest_base(&self) -> GuestAddr {
        self.guest_base
    }

    /// The guest physical range covered by RAM.
    pub fn guest_range(&self) -> GuestRange {
        GuestRange::new(self.guest_base, GuestAddr(self.guest_base.raw() + self.size))
    }

    /// Translate a host address inside the region to a guest physical address.
    pub fn host_to_guest(&self, addr: HostAddr) -> Result<GuestAddr> {
        match addr.offset_from(self.host_region_start) {
            Some(offset) if offset < self.size => Ok(GuestAddr(self.guest_base.raw() + offset)),
            _ => Err(Error::InvalidHostAddress(addr.raw())),
        }
    }

    /// Translate a guest physical address inside RAM to a host address.
    pub fn guest_to_host(&self, addr: GuestAddr) -> Result<HostAddr> {
        match addr.offset_from(self.guest_base) {
            Some(offset) if offset < self.size => {
                Ok(HostAddr(self.host_region_start.raw() + offset))
            }
            _ => Err(Error::InvalidGuestAddress(addr.raw())),
        }
    }

    /// Mutable view of a guest physical range.
    pub fn slice_mut(&mut self, range: GuestRange) -> Result<&mut [u8]> {
        if range.is_empty() {
            return Ok(&mut []);
        }
        let host = self.checked_host(range)?;
        // Safety: the range was checked against the region, which lies inside
        // the live mapping, and `&mut self` excludes other views.
        unsafe {
            Ok(std::slice::from_raw_parts_mut(
                host.as_mut_ptr(),
                range.len() as usize,
            ))
        }
    }

    /// Read bytes from a guest physical address.
    pub fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let host = self.checked_host(self.range_at(addr, buf.len())?)?;
        unsafe {
            std::ptr::copy_nonoverlapping(host.as_mut_ptr(), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Write bytes to a guest physical address.
    pub fn write(&mut self, addr: GuestAddr, data: &[u8]) -> Result<()> {
        let range = self.range_at(addr, data.len())?;
        self.slice_mut(range)?.copy_from_slice(data);
        Ok(())
    }

    fn checked_host(&self, range: GuestRange) -> Result<HostAddr> {
        if range.end > self.guest_range().end {
            return Err(Error::InvalidGuestAddress(range.end.raw()));
        }
        self.guest_to_host(range.start)
    }

    fn range_at(&self, addr: GuestAddr, len: usize) -> Result<GuestRange> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(Error::InvalidGuestAddress(addr.raw()))?;
        Ok(GuestRange::new(addr, end))
    }
}

impl std::fmt::Debug for GuestMemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestMemoryRegion")
            .field("host_alloc_base", &self.host_alloc_base())
            .field("host_alloc_size", &self.host_alloc_size())
            .field("host_region_start", &self.host_region_start)
            .field("size", &self.size)
            .field("guest_base", &self.guest_base)
            .finish()
    }
}
