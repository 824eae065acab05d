//! Boot image loading.
//!
//! This module copies the kernel and initrd into guest RAM and reserves the
//! device tree slot below the top of lowmem.

pub mod image;
pub mod window;

pub use image::{load_images, read_bounded, ImageSource, KernelPlacement};
pub use window::FreeWindow;
