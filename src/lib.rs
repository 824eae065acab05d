//! # arm_microvm
//!
//! Bootstrap for arm64 virtual machines on KVM: guest RAM, the in-kernel
//! interrupt controller, boot image placement and the console poll hook.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> arm_microvm::Result<()> {
//! use arm_microvm::VmBuilder;
//!
//! let mut vm = VmBuilder::new()
//!     .memory_mb(512)
//!     .kernel("/path/to/Image")
//!     .initrd("/path/to/initrd.img")
//!     .create()?;
//!
//! let placement = vm.load_configured_images()?;
//! println!("fdt goes at {}", placement.dtb_guest_start);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```
//!
//! vCPU creation, device tree generation and the run loop are left to the
//! caller; [`ArmVm::read_term`] is meant to be called on every loop tick.

mod builder;
mod error;
mod vm;

pub mod arch;
pub mod backend;
pub mod capability;
pub mod device;
pub mod loader;
pub mod memory;
pub mod term;

// Re-exports
pub use builder::{VmBuilder, VmConfig};
pub use capability::{cpu_supports_vm, vm_platform_is_supported};
pub use device::{ActiveConsole, IrqChip};
pub use error::{Error, ImageKind, Result};
pub use loader::KernelPlacement;
pub use memory::{GuestAddr, HostAddr};
pub use vm::ArmVm;

/// Check if the current platform supports hardware virtualization.
///
/// Returns `true` if the hypervisor is available and can be used.
pub fn is_supported() -> bool {
    vm_platform_is_supported()
}

/// Get the name of the hypervisor backend for the current platform.
///
/// Returns `None` if no backend is available.
pub fn backend_name() -> Option<&'static str> {
    backend::name()
}
