//! Linux KVM backend.
//!
//! This module provides virtualization support on Linux using KVM.
//! It leverages the rust-vmm ecosystem for low-level KVM access.
//!
//! ## Requirements
//!
//! - Linux kernel with KVM support
//! - Access to /dev/kvm
//! - arm64 host with virtualization extensions

use std::io;
use std::path::Path;

use kvm_bindings::{kvm_create_device, kvm_device_attr, kvm_userspace_memory_region};
use kvm_ioctls::{DeviceFd, Kvm, VmFd};
use log::debug;

use crate::backend::{DeviceControl, DeviceKind, Hypervisor, MemorySlot};
use crate::capability::Capability;
use crate::error::{Error, Result};

/// The only KVM API version ever released.
pub const KVM_API_VERSION: i32 = 12;

/// Check if KVM is available on this system.
///
/// Opens `/dev/kvm` and reads the API version; no VM is created.
pub fn is_available() -> bool {
    if !Path::new("/dev/kvm").exists() {
        return false;
    }
    match Kvm::new() {
        Ok(kvm) => kvm.get_api_version() == KVM_API_VERSION,
        Err(_) => false,
    }
}

fn to_io(err: kvm_ioctls::Error) -> io::Error {
    io::Error::from_raw_os_error(err.errno())
}

/// A KVM VM file descriptor together with the system handle.
pub struct KvmHypervisor {
    kvm: Kvm,
    vm: VmFd,
}

impl KvmHypervisor {
    /// Open `/dev/kvm` and create an empty VM.
    pub fn new() -> Result<Self> {
        let kvm = Kvm::new().map_err(|e| Error::Hypervisor(to_io(e)))?;

        let version = kvm.get_api_version();
        if version != KVM_API_VERSION {
            return Err(Error::Hypervisor(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("KVM API version {} is not supported", version),
            )));
        }

        let vm = kvm.create_vm().map_err(|e| Error::Hypervisor(to_io(e)))?;
        debug!("created KVM VM");

        Ok(Self { kvm, vm })
    }

    /// The VM file descriptor, for vCPU creation by the caller.
    pub fn vm_fd(&self) -> &VmFd {
        &self.vm
    }
}

impl DeviceControl for DeviceFd {
    fn set_attr(&self, group: u32, attr: u64, value: Option<u64>) -> io::Result<()> {
        let addr = value
            .as_ref()
            .map_or(0, |value| value as *const u64 as u64);
        let attr = kvm_device_attr {
            flags: 0,
            group,
            attr,
            addr,
        };
        self.set_device_attr(&attr).map_err(to_io)
    }
}

impl Hypervisor for KvmHypervisor {
    type Device = DeviceFd;

    fn name(&self) -> &'static str {
        "kvm"
    }

    fn check_extension(&self, cap: Capability) -> i32 {
        self.kvm.check_extension_raw(cap.raw() as libc::c_ulong)
    }

    unsafe fn register_memory(&self, slot: &MemorySlot) -> io::Result<()> {
        let region = kvm_userspace_memory_region {
            slot: slot.slot,
            flags: 0,
            guest_phys_addr: slot.guest_phys_addr.raw(),
            memory_size: slot.size,
            userspace_addr: slot.host_addr.raw(),
        };
        self.vm.set_user_memory_region(region).map_err(to_io)
    }

    fn create_device(&self, kind: DeviceKind) -> io::Result<DeviceFd> {
        let mut device = kvm_create_device {
            type_: kind.raw(),
            fd: 0,
            flags: 0,
        };
        self.vm.create_device(&mut device).map_err(to_io)
    }
}
