//! Hypervisor capability checks.

use crate::backend::{self, Hypervisor};
use crate::error::{Error, Result};

/// KVM extensions this crate relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// In-kernel interrupt controller.
    Irqchip,
    /// `KVM_{GET,SET}_ONE_REG` register access.
    OneReg,
    /// In-kernel PSCI for CPU power management.
    ArmPsci,
}

impl Capability {
    /// `KVM_CAP_*` number from `linux/kvm.h`.
    pub const fn raw(self) -> u32 {
        match self {
            Capability::Irqchip => 0,
            Capability::OneReg => 70,
            Capability::ArmPsci => 87,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Capability::Irqchip => "KVM_CAP_IRQCHIP",
            Capability::OneReg => "KVM_CAP_ONE_REG",
            Capability::ArmPsci => "KVM_CAP_ARM_PSCI",
        }
    }
}

/// A capability and the minimum value `KVM_CHECK_EXTENSION` must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRequirement {
    pub capability: Capability,
    pub min_value: i32,
}

/// Extensions that must be present before any VM state is created.
pub const REQUIRED_EXTENSIONS: &[CapabilityRequirement] = &[
    CapabilityRequirement {
        capability: Capability::Irqchip,
        min_value: 1,
    },
    CapabilityRequirement {
        capability: Capability::OneReg,
        min_value: 1,
    },
    CapabilityRequirement {
        capability: Capability::ArmPsci,
        min_value: 1,
    },
];

/// Check whether the host can run VMs at all.
///
/// Only the hypervisor device and its API version are looked at; individual
/// extensions are checked when the VM is created. Nothing is allocated.
pub fn vm_platform_is_supported() -> bool {
    backend::is_available() && cpu_supports_vm()
}

/// Architecture-specific CPU check. On arm64 the KVM checks are enough.
pub fn cpu_supports_vm() -> bool {
    true
}

/// Fail with the first required extension the hypervisor does not report.
pub fn check_required_extensions<H: Hypervisor>(hypervisor: &H) -> Result<()> {
    for req in REQUIRED_EXTENSIONS {
        if hypervisor.check_extension(req.capability) < req.min_value {
            return Err(Error::MissingCapability(req.capability.name()));
        }
    }
    Ok(())
}
