//! In-kernel GIC (Generic Interrupt Controller) creation for ARM64.
//!
//! Register emulation happens in KVM; this module only creates the vGIC
//! device, tells KVM where its frames live in the guest physical map and
//! triggers its initialisation.

use std::fmt;
use std::str::FromStr;

use log::info;

use crate::arch::arm64::{
    ARM_GIC_CPUI_BASE, ARM_GIC_DIST_BASE, ARM_GIC_ITS_SIZE, ARM_GIC_REDIST_SIZE, ARM_MMIO_AREA,
    GIC_SPI_IRQ_BASE,
};
use crate::backend::{DeviceControl, DeviceKind, Hypervisor};
use crate::error::{Error, Result};
use crate::memory::align_up;

/// Largest vCPU count a GICv2 can route to.
pub const GICV2_MAX_CPUS: u32 = 8;

/// KVM vGIC device attributes (arch/arm64/include/uapi/asm/kvm.h)
mod attr {
    pub const GRP_ADDR: u32 = 0;
    pub const GRP_NR_IRQS: u32 = 3;
    pub const GRP_CTRL: u32 = 4;

    pub const CTRL_INIT: u64 = 0;

    pub const V2_ADDR_TYPE_DIST: u64 = 0;
    pub const V2_ADDR_TYPE_CPU: u64 = 1;
    pub const V3_ADDR_TYPE_DIST: u64 = 2;
    pub const V3_ADDR_TYPE_REDIST: u64 = 3;
    pub const ITS_ADDR_TYPE: u64 = 4;
}

/// Interrupt controller variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IrqChip {
    #[default]
    GicV2,
    GicV3,
    /// GICv3 with an ITS for MSI translation.
    GicV3Its,
}

impl fmt::Display for IrqChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqChip::GicV2 => write!(f, "gicv2"),
            IrqChip::GicV3 => write!(f, "gicv3"),
            IrqChip::GicV3Its => write!(f, "gicv3-its"),
        }
    }
}

impl FromStr for IrqChip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gicv2" => Ok(IrqChip::GicV2),
            "gicv3" => Ok(IrqChip::GicV3),
            "gicv3-its" => Ok(IrqChip::GicV3Its),
            _ => Err(Error::UnknownIrqChip(s.to_string())),
        }
    }
}

/// Guest physical placement of the vGIC frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicLayout {
    pub dist_base: u64,
    /// GICv2 CPU interface.
    pub cpu_if_base: Option<u64>,
    /// GICv3 redistributors, one frame per vCPU.
    pub redist_base: Option<u64>,
    pub redist_size: u64,
    pub its_base: Option<u64>,
}

impl GicLayout {
    /// Frames are stacked downwards from the distributor.
    ///
    /// Fails if `nr_cpus` is 0, exceeds what the chip can route to, or
    /// pushes the redistributor and ITS frames below the MMIO area.
    pub fn new(chip: IrqChip, nr_cpus: u32) -> Result<Self> {
        if nr_cpus == 0 {
            return Err(Error::InvalidVcpuCount(nr_cpus));
        }

        match chip {
            IrqChip::GicV2 => {
                if nr_cpus > GICV2_MAX_CPUS {
                    return Err(Error::Configuration(format!(
                        "{} supports at most {} vCPUs, {} requested",
                        chip, GICV2_MAX_CPUS, nr_cpus
                    )));
                }
                Ok(Self {
                    dist_base: ARM_GIC_DIST_BASE,
                    cpu_if_base: Some(ARM_GIC_CPUI_BASE),
                    redist_base: None,
                    redist_size: 0,
                    its_base: None,
                })
            }
            IrqChip::GicV3 | IrqChip::GicV3Its => {
                let has_its = chip == IrqChip::GicV3Its;
                let redist_size = nr_cpus as u64 * ARM_GIC_REDIST_SIZE;
                let its_size = if has_its { ARM_GIC_ITS_SIZE } else { 0 };

                // The ITS frame, if any, sits right below the redistributors.
                let lowest = ARM_GIC_DIST_BASE
                    .checked_sub(redist_size + its_size)
                    .filter(|lowest| *lowest >= ARM_MMIO_AREA)
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "{} frames for {} vCPUs do not fit above the MMIO area at {:#x}",
                            chip, nr_cpus, ARM_MMIO_AREA
                        ))
                    })?;

                let redist_base = lowest + its_size;
                Ok(Self {
                    dist_base: ARM_GIC_DIST_BASE,
                    cpu_if_base: None,
                    redist_base: Some(redist_base),
                    redist_size,
                    its_base: has_its.then_some(lowest),
                })
            }
        }
    }
}

/// A created vGIC.
pub struct GicController<D> {
    chip: IrqChip,
    layout: GicLayout,
    gic: D,
    its: Option<D>,
}

/// Create the vGIC for `chip` and place its frames.
pub fn create_controller<H: Hypervisor>(
    hypervisor: &H,
    chip: IrqChip,
    nr_cpus: u32,
) -> Result<GicController<H::Device>> {
    let layout = GicLayout::new(chip, nr_cpus)?;
    let (kind, frames) = match (layout.cpu_if_base, layout.redist_base) {
        (Some(cpu_if_base), _) => (
            DeviceKind::VgicV2,
            [
                (attr::V2_ADDR_TYPE_DIST, layout.dist_base),
                (attr::V2_ADDR_TYPE_CPU, cpu_if_base),
            ],
        ),
        (None, Some(redist_base)) => (
            DeviceKind::VgicV3,
            [
                (attr::V3_ADDR_TYPE_DIST, layout.dist_base),
                (attr::V3_ADDR_TYPE_REDIST, redist_base),
            ],
        ),
        (None, None) => {
            return Err(Error::Configuration(format!(
                "{} layout has neither a CPU interface nor redistributors",
                chip
            )))
        }
    };

    let gic = hypervisor
        .create_device(kind)
        .map_err(Error::IrqChipCreation)?;

    for (addr_type, base) in frames {
        gic.set_attr(attr::GRP_ADDR, addr_type, Some(base))
            .map_err(Error::IrqChipCreation)?;
    }

    let its = match layout.its_base {
        Some(its_base) => {
            let its = hypervisor
                .create_device(DeviceKind::VgicIts)
                .map_err(Error::IrqChipCreation)?;
            its.set_attr(attr::GRP_ADDR, attr::ITS_ADDR_TYPE, Some(its_base))
                .map_err(Error::IrqChipCreation)?;
            its.set_attr(attr::GRP_CTRL, attr::CTRL_INIT, None)
                .map_err(Error::IrqChipCreation)?;
            Some(its)
        }
        None => None,
    };

    info!(
        "Created {} (distributor at {:#x}, {} vCPUs)",
        chip, layout.dist_base, nr_cpus
    );

    Ok(GicController {
        chip,
        layout,
        gic,
        its,
    })
}

impl<D: DeviceControl> GicController<D> {
    pub fn chip(&self) -> IrqChip {
        self.chip
    }

    pub fn layout(&self) -> &GicLayout {
        &self.layout
    }

    pub fn has_its(&self) -> bool {
        self.its.is_some()
    }

    /// Set the number of interrupt lines and initialise the vGIC.
    ///
    /// Must run after all vCPUs have been created.
    pub fn finalize(&self, nr_irq_lines: u32) -> Result<()> {
        // KVM reads this payload as a u32; the low word comes first on arm64.
        let nr_irqs = align_up(nr_irq_lines as u64, 32) + GIC_SPI_IRQ_BASE as u64;

        self.gic
            .set_attr(attr::GRP_NR_IRQS, 0, Some(nr_irqs))
            .map_err(Error::IrqChipCreation)?;
        self.gic
            .set_attr(attr::GRP_CTRL, attr::CTRL_INIT, None)
            .map_err(Error::IrqChipCreation)?;

        info!("Initialised {} with {} interrupts", self.chip, nr_irqs);
        Ok(())
    }
}
