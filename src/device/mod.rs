//! Virtual devices touched during bootstrap.
//!
//! The vGIC is created in the kernel; the consoles only need their receive
//! paths here, driven by the console poll hook.

pub mod console;
pub mod gic;
pub mod serial;
pub mod virtio;

pub use console::{ActiveConsole, Consoles};
pub use gic::{GicController, GicLayout, IrqChip};
pub use serial::Serial;
pub use virtio::VirtioConsole;
