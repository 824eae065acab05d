//! Error types for arm-microvm.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using arm-microvm's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boot artifact placed in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Kernel,
    DeviceTree,
    Initrd,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Kernel => write!(f, "kernel image"),
            ImageKind::DeviceTree => write!(f, "fdt"),
            ImageKind::Initrd => write!(f, "initrd"),
        }
    }
}

/// Errors that can occur while bootstrapping a VM.
///
/// None of these are recoverable: guest memory layout is a precondition for
/// running any vCPU, so callers are expected to report and exit.
#[derive(Error, Debug)]
pub enum Error {
    // Platform/hypervisor errors
    #[error("hypervisor not available on this platform")]
    HypervisorNotAvailable,

    #[error("hypervisor error: {0}")]
    Hypervisor(#[source] io::Error),

    #[error("unsupported KVM extension detected: {0}")]
    MissingCapability(&'static str),

    // Configuration errors
    #[error("invalid memory size: {0} MB (must be > 0)")]
    InvalidMemorySize(u32),

    #[error("invalid vCPU count: {0} (must be > 0)")]
    InvalidVcpuCount(u32),

    #[error("unknown interrupt controller type: {0}")]
    UnknownIrqChip(String),

    #[error("unknown console type: {0}")]
    UnknownConsole(String),

    #[error("kernel not found: {0}")]
    KernelNotFound(PathBuf),

    #[error("initrd not found: {0}")]
    InitrdNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    // Memory errors
    #[error("failed to map {size} bytes for guest memory: {source}")]
    MemoryAllocationFailed { size: u64, source: io::Error },

    #[error("failed to register {size} bytes of memory at physical address {guest_addr:#x}: {source}")]
    MemoryRegistration {
        guest_addr: u64,
        size: u64,
        source: io::Error,
    },

    #[error("guest memory has not been allocated")]
    MemoryNotAllocated,

    #[error("invalid guest address: 0x{0:x}")]
    InvalidGuestAddress(u64),

    #[error("invalid host address: 0x{0:x}")]
    InvalidHostAddress(u64),

    // Interrupt controller errors
    #[error("failed to create virtual GIC: {0}")]
    IrqChipCreation(#[source] io::Error),

    // Image placement errors
    #[error("{0} too big to contain in guest memory")]
    ImageTooLarge(ImageKind),

    #[error("{image} at 0x{start:x} overlaps with kernel image ending at 0x{kernel_end:x}")]
    Overlap {
        image: ImageKind,
        start: u64,
        kernel_end: u64,
    },

    #[error("{image} read: {source}")]
    ImageRead { image: ImageKind, source: io::Error },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the operator is likely to fix this by resizing RAM or images.
    pub fn is_placement(&self) -> bool {
        matches!(self, Error::ImageTooLarge(_) | Error::Overlap { .. })
    }
}
