//! Hypervisor backend abstraction.
//!
//! The bootstrap code only needs a narrow slice of the hypervisor: extension
//! queries, one memory registration call and device creation for the vGIC.
//! [`Hypervisor`] is that slice; [`kvm::KvmHypervisor`] implements it on Linux.

use std::io;

use crate::capability::Capability;
use crate::memory::{GuestAddr, HostAddr};

#[cfg(target_os = "linux")]
pub mod kvm;

#[cfg(test)]
pub(crate) mod mock;

/// A guest RAM slot to hand to the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySlot {
    pub slot: u32,
    pub guest_phys_addr: GuestAddr,
    pub size: u64,
    pub host_addr: HostAddr,
}

/// In-kernel devices the bootstrap creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    VgicV2,
    VgicV3,
    VgicIts,
}

impl DeviceKind {
    /// `KVM_DEV_TYPE_*` number from `linux/kvm.h`.
    pub const fn raw(self) -> u32 {
        match self {
            DeviceKind::VgicV2 => 5,
            DeviceKind::VgicV3 => 7,
            DeviceKind::VgicIts => 8,
        }
    }
}

/// Attribute access on a created device.
pub trait DeviceControl {
    /// Set attribute `attr` of `group`. `value`, when present, is passed by
    /// address as the attribute payload.
    fn set_attr(&self, group: u32, attr: u64, value: Option<u64>) -> io::Result<()>;
}

/// The hypervisor operations needed to bootstrap a VM.
pub trait Hypervisor {
    type Device: DeviceControl;

    /// Backend name (e.g. "kvm").
    fn name(&self) -> &'static str;

    /// Value reported for an extension; 0 when absent.
    fn check_extension(&self, cap: Capability) -> i32;

    /// Map host memory into the guest physical address space.
    ///
    /// # Safety
    ///
    /// `slot.host_addr .. slot.host_addr + slot.size` must stay mapped for as
    /// long as the VM can access it.
    unsafe fn register_memory(&self, slot: &MemorySlot) -> io::Result<()>;

    /// Create an in-kernel device.
    fn create_device(&self, kind: DeviceKind) -> io::Result<Self::Device>;
}

/// Check if the hypervisor is available on this platform.
pub fn is_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        kvm::is_available()
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Get the name of the backend for this platform.
pub fn name() -> Option<&'static str> {
    #[cfg(target_os = "linux")]
    {
        Some("kvm")
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
