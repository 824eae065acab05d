//! Virtio device implementations.

pub mod console;

pub use console::VirtioConsole;

/// virtio-mmio INTERRUPT_STATUS bits.
pub mod interrupt {
    pub const USED_RING: u32 = 1 << 0;
}
