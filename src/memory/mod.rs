//! Guest memory management.
//!
//! Guest RAM is a single flat region: a host mapping, aligned and registered
//! with the hypervisor at [`ARM_MEMORY_AREA`](crate::arch::arm64::ARM_MEMORY_AREA).

mod address;
mod guest;
pub mod mmap;

pub use address::{align_down, align_up, GuestAddr, GuestRange, HostAddr};
pub use guest::GuestMemoryRegion;
pub use mmap::{HostMapping, MemoryBacking};
