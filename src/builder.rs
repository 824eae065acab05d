//! VM configuration.

use std::path::PathBuf;

use crate::device::{ActiveConsole, IrqChip};
use crate::error::{Error, Result};

const DEFAULT_MEMORY_MB: u32 = 256;
const DEFAULT_VCPUS: u32 = 1;

/// Validated VM configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Requested guest RAM in bytes, before clamping
    pub ram_size: u64,
    pub nr_cpus: u32,
    /// hugetlbfs mount to back guest RAM with
    pub hugetlbfs_path: Option<PathBuf>,
    pub irqchip: IrqChip,
    pub kernel: Option<PathBuf>,
    pub initrd: Option<PathBuf>,
    /// Kernel command line, passed on untouched
    pub cmdline: String,
    /// Console that receives host terminal input
    pub console: ActiveConsole,
    pub aarch32_guest: bool,
}

/// Builder for a [`VmConfig`].
///
/// # Example
///
/// ```rust,no_run
/// use arm_microvm::{IrqChip, VmBuilder};
///
/// let config = VmBuilder::new()
///     .memory_mb(512)
///     .vcpus(2)
///     .irqchip(IrqChip::GicV3)
///     .kernel("/path/to/Image")
///     .cmdline("console=ttyS0")
///     .build()?;
/// # Ok::<(), arm_microvm::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct VmBuilder {
    memory_mb: Option<u32>,
    vcpus: Option<u32>,
    hugetlbfs: Option<PathBuf>,
    irqchip: Option<IrqChip>,
    kernel: Option<PathBuf>,
    initrd: Option<PathBuf>,
    cmdline: Option<String>,
    console: Option<ActiveConsole>,
    aarch32: bool,
}

impl VmBuilder {
    /// Create a new VM builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the amount of guest memory in megabytes.
    ///
    /// Default: 256 MB
    pub fn memory_mb(mut self, mb: u32) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    /// Set the number of virtual CPUs.
    ///
    /// Default: 1
    pub fn vcpus(mut self, count: u32) -> Self {
        self.vcpus = Some(count);
        self
    }

    /// Back guest memory with a file on this hugetlbfs mount.
    pub fn hugetlbfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.hugetlbfs = Some(path.into());
        self
    }

    /// Select the interrupt controller.
    ///
    /// Default: GICv2
    pub fn irqchip(mut self, chip: IrqChip) -> Self {
        self.irqchip = Some(chip);
        self
    }

    /// Set the path to the Linux kernel image.
    pub fn kernel(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel = Some(path.into());
        self
    }

    /// Set the path to the initial ramdisk (initrd).
    pub fn initrd(mut self, path: impl Into<PathBuf>) -> Self {
        self.initrd = Some(path.into());
        self
    }

    /// Set the kernel command line.
    pub fn cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = Some(cmdline.into());
        self
    }

    /// Select the console fed from the host terminal.
    ///
    /// Default: serial
    pub fn console(mut self, console: ActiveConsole) -> Self {
        self.console = Some(console);
        self
    }

    /// Lay memory out for a 32-bit guest kernel.
    pub fn aarch32(mut self, aarch32: bool) -> Self {
        self.aarch32 = aarch32;
        self
    }

    /// Validate the settings.
    pub fn build(self) -> Result<VmConfig> {
        let memory_mb = self.memory_mb.unwrap_or(DEFAULT_MEMORY_MB);
        if memory_mb == 0 {
            return Err(Error::InvalidMemorySize(memory_mb));
        }

        let vcpus = self.vcpus.unwrap_or(DEFAULT_VCPUS);
        if vcpus == 0 {
            return Err(Error::InvalidVcpuCount(vcpus));
        }

        if let Some(ref kernel) = self.kernel {
            if !kernel.exists() {
                return Err(Error::KernelNotFound(kernel.clone()));
            }
        }

        if let Some(ref initrd) = self.initrd {
            if !initrd.exists() {
                return Err(Error::InitrdNotFound(initrd.clone()));
            }
        }

        Ok(VmConfig {
            ram_size: (memory_mb as u64) << 20,
            nr_cpus: vcpus,
            hugetlbfs_path: self.hugetlbfs,
            irqchip: self.irqchip.unwrap_or_default(),
            kernel: self.kernel,
            initrd: self.initrd,
            cmdline: self.cmdline.unwrap_or_default(),
            console: self.console.unwrap_or_default(),
            aarch32_guest: self.aarch32,
        })
    }

    /// Build the configuration and create a KVM VM reading from stdin.
    #[cfg(target_os = "linux")]
    pub fn create(self) -> Result<crate::vm::ArmVm<crate::backend::kvm::KvmHypervisor>> {
        let config = self.build()?;
        if !crate::backend::is_available() {
            return Err(Error::HypervisorNotAvailable);
        }
        let hypervisor = crate::backend::kvm::KvmHypervisor::new()?;
        crate::vm::ArmVm::new(
            hypervisor,
            config,
            Box::new(crate::term::StdinTerminal::new()),
        )
    }
}
