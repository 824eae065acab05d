//! arm64 guest physical memory layout.
//!
//! ```text
//! 0x0000_0000  ┌───────────────────────────┐
//!              │  I/O ports                 │
//! 0x0100_0000  ├───────────────────────────┤
//!              │  MMIO devices              │
//! 0x3ffd_0000  ├───────────────────────────┤
//!              │  GIC (CPU if / redists)    │
//! 0x3fff_0000  ├───────────────────────────┤
//!              │  GIC distributor           │
//! 0x4000_0000  ├───────────────────────────┤
//!              │  AXI / PCI                 │
//! 0x8000_0000  ├───────────────────────────┤  ← ARM_MEMORY_AREA
//!              │  RAM                       │
//!              └───────────────────────────┘
//! ```

/// 2 MiB, the unit used for host alignment and fdt placement.
pub const SZ_2M: u64 = 0x20_0000;

/// 256 MiB.
pub const SZ_256M: u64 = 0x1000_0000;

/// Start of the I/O port window.
pub const ARM_IOPORT_AREA: u64 = 0x0000_0000;

/// Start of the MMIO device window.
pub const ARM_MMIO_AREA: u64 = 0x0100_0000;

/// Start of the AXI window. The GIC lives directly below it.
pub const ARM_AXI_AREA: u64 = 0x4000_0000;

/// Guest physical base address of RAM.
pub const ARM_MEMORY_AREA: u64 = 0x8000_0000;

/// Largest RAM size reachable by an aarch32 guest.
pub const ARM_LOMAP_MAX_MEMORY: u64 = (1 << 32) - ARM_MEMORY_AREA;

/// Largest RAM size for a 64-bit guest (40-bit IPA space).
pub const ARM_HIMAP_MAX_MEMORY: u64 = (1 << 40) - ARM_MEMORY_AREA;

/// Kernel image offset from the start of RAM (arm64 `text_offset`).
pub const ARM64_KERN_OFFSET: u64 = 0x8_0000;

/// Kernel image offset from the start of RAM for aarch32 zImages.
pub const ARM_KERN_OFFSET: u64 = 0x8000;

/// Maximum size of the generated device tree.
pub const FDT_MAX_SIZE: u64 = 0x1_0000;

/// Alignment of the device tree blob.
pub const FDT_ALIGN: u64 = SZ_2M;

/// Alignment of the initial ramdisk.
pub const INITRD_ALIGN: u64 = 4;

/// Early boot code must find the dtb and initrd below this much RAM.
pub const LOWMEM_CEILING: u64 = SZ_256M;

/// Extra host memory mapped so the region can be aligned.
pub const RAM_ALLOC_SLACK: u64 = SZ_2M;

/// Alignment of the host side of guest RAM.
///
/// virtio-mmio needs 64 KiB (the largest guest page size), transparent huge
/// pages need 2 MiB.
pub const RAM_HOST_ALIGN: u64 = SZ_2M;

/// GIC distributor frame size.
pub const ARM_GIC_DIST_SIZE: u64 = 0x1_0000;

/// GICv2 CPU interface frame size.
pub const ARM_GIC_CPUI_SIZE: u64 = 0x2_0000;

/// GICv3 redistributor frame size, per vCPU.
pub const ARM_GIC_REDIST_SIZE: u64 = 0x2_0000;

/// GICv3 ITS frame size.
pub const ARM_GIC_ITS_SIZE: u64 = 0x2_0000;

/// GIC distributor base.
pub const ARM_GIC_DIST_BASE: u64 = ARM_AXI_AREA - ARM_GIC_DIST_SIZE;

/// GICv2 CPU interface base.
pub const ARM_GIC_CPUI_BASE: u64 = ARM_GIC_DIST_BASE - ARM_GIC_CPUI_SIZE;

/// Number of private (SGI + PPI) interrupt lines before the first SPI.
pub const GIC_SPI_IRQ_BASE: u32 = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gic_below_axi() {
        assert_eq!(ARM_GIC_DIST_BASE, 0x3fff_0000);
        assert_eq!(ARM_GIC_CPUI_BASE, 0x3ffd_0000);
        assert!(ARM_GIC_CPUI_BASE > ARM_MMIO_AREA);
    }

    #[test]
    fn test_max_memory() {
        assert_eq!(ARM_LOMAP_MAX_MEMORY, 0x8000_0000);
        assert_eq!(ARM_MEMORY_AREA + ARM_HIMAP_MAX_MEMORY, 1 << 40);
        assert_eq!(ARM_MEMORY_AREA % RAM_HOST_ALIGN, 0);
    }
}
