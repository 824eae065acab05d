//! Architecture parameters.
//!
//! The placement and allocation code only sees a [`BootLayout`], so the
//! algorithms stay the same if another architecture supplies its own values.

pub mod arm64;

/// Fixed layout values consumed by the allocator and the image planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootLayout {
    /// Guest physical address of the start of RAM.
    pub memory_base: u64,
    /// Largest RAM size the guest can address.
    pub max_memory: u64,
    /// Offset of the kernel image from the start of RAM.
    pub kernel_offset: u64,
    /// Space reserved for the device tree blob.
    pub fdt_max_size: u64,
    /// Alignment of the device tree blob.
    pub fdt_align: u64,
    /// Alignment of the initial ramdisk.
    pub initrd_align: u64,
    /// Boot artifacts must sit below `memory_base + lowmem_ceiling`.
    pub lowmem_ceiling: u64,
    /// Extra bytes mapped on the host to make room for alignment.
    pub alloc_slack: u64,
    /// Alignment of the host side of guest RAM.
    pub host_align: u64,
}

impl BootLayout {
    /// Layout of an arm64 virtual machine.
    ///
    /// aarch32 guests get the low memory map and the zImage load offset.
    pub fn arm64(aarch32_guest: bool) -> Self {
        let (max_memory, kernel_offset) = if aarch32_guest {
            (arm64::ARM_LOMAP_MAX_MEMORY, arm64::ARM_KERN_OFFSET)
        } else {
            (arm64::ARM_HIMAP_MAX_MEMORY, arm64::ARM64_KERN_OFFSET)
        };

        Self {
            memory_base: arm64::ARM_MEMORY_AREA,
            max_memory,
            kernel_offset,
            fdt_max_size: arm64::FDT_MAX_SIZE,
            fdt_align: arm64::FDT_ALIGN,
            initrd_align: arm64::INITRD_ALIGN,
            lowmem_ceiling: arm64::LOWMEM_CEILING,
            alloc_slack: arm64::RAM_ALLOC_SLACK,
            host_align: arm64::RAM_HOST_ALIGN,
        }
    }
}

impl Default for BootLayout {
    fn default() -> Self {
        Self::arm64(false)
    }
}
