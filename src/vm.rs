//! ARM VM bootstrap.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::arch::BootLayout;
use crate::backend::Hypervisor;
use crate::builder::VmConfig;
use crate::capability::check_required_extensions;
use crate::device::gic::{create_controller, GicController};
use crate::device::{ActiveConsole, Consoles};
use crate::error::{Error, ImageKind, Result};
use crate::loader::{load_images, ImageSource, KernelPlacement};
use crate::memory::{GuestMemoryRegion, MemoryBacking};
use crate::term::Terminal;

/// A VM with its RAM, interrupt controller and boot images set up.
///
/// vCPUs and the run loop belong to the caller; [`ArmVm::read_term`] is the
/// hook it calls on every tick.
///
/// # Example
///
/// ```rust,no_run
/// # #[cfg(target_os = "linux")]
/// # fn main() -> arm_microvm::Result<()> {
/// use arm_microvm::VmBuilder;
///
/// let mut vm = VmBuilder::new()
///     .memory_mb(256)
///     .kernel("/path/to/Image")
///     .cmdline("console=ttyS0")
///     .create()?;
/// vm.load_configured_images()?;
/// # Ok(())
/// # }
/// # #[cfg(not(target_os = "linux"))]
/// # fn main() {}
/// ```
pub struct ArmVm<H: Hypervisor> {
    // Device fds first, then the VM, then the memory it maps.
    gic: Option<GicController<H::Device>>,
    hypervisor: H,
    ram: Option<GuestMemoryRegion>,
    config: VmConfig,
    layout: BootLayout,
    placement: Option<KernelPlacement>,
    cmdline: Option<String>,
    consoles: Consoles,
}

impl<H: Hypervisor> ArmVm<H> {
    /// Check extensions, allocate and register RAM, and create the vGIC.
    pub fn new(hypervisor: H, config: VmConfig, term: Box<dyn Terminal>) -> Result<Self> {
        check_required_extensions(&hypervisor)?;

        let layout = BootLayout::arm64(config.aarch32_guest);
        let consoles = Consoles::new(config.console, term);
        let hugetlbfs_path = config.hugetlbfs_path.clone();
        let ram_size = config.ram_size;

        let mut vm = Self {
            gic: None,
            hypervisor,
            ram: None,
            config,
            layout,
            placement: None,
            cmdline: None,
            consoles,
        };
        vm.arch_init(hugetlbfs_path.as_deref(), ram_size)?;
        vm.init_ram()?;

        info!(
            "Created {} VM: {} bytes of RAM, {} vCPUs, {}",
            vm.hypervisor.name(),
            vm.ram_size(),
            vm.config.nr_cpus,
            vm.config.irqchip
        );
        Ok(vm)
    }

    /// Allocate guest RAM and create the interrupt controller.
    ///
    /// RAM above the architecture's maximum is clamped. Runs once per VM;
    /// later calls fail without touching the existing RAM or vGIC.
    pub fn arch_init(&mut self, hugetlbfs_path: Option<&Path>, ram_size: u64) -> Result<()> {
        if self.ram.is_some() || self.gic.is_some() {
            return Err(Error::Configuration(
                "guest memory and irqchip are already initialised".to_string(),
            ));
        }

        let backing = MemoryBacking::from_path(hugetlbfs_path);
        self.ram = Some(GuestMemoryRegion::allocate(ram_size, &backing, &self.layout)?);

        self.gic = Some(create_controller(
            &self.hypervisor,
            self.config.irqchip,
            self.config.nr_cpus,
        )?);
        Ok(())
    }

    /// Register the allocated RAM with the hypervisor.
    pub fn init_ram(&self) -> Result<()> {
        self.ram
            .as_ref()
            .ok_or(Error::MemoryNotAllocated)?
            .register(&self.hypervisor)
    }

    /// Unmap guest RAM. Calling it again does nothing.
    pub fn delete_ram(&mut self) {
        if let Some(ram) = self.ram.take() {
            debug!("Releasing {} bytes of guest memory", ram.host_alloc_size());
            self.placement = None;
        }
    }

    /// Copy the kernel and optional initrd into RAM and reserve the fdt slot.
    ///
    /// `cmdline` is kept as is for device tree generation.
    pub fn load_kernel_image<K, I>(
        &mut self,
        kernel: &mut K,
        initrd: Option<&mut I>,
        cmdline: &str,
    ) -> Result<&KernelPlacement>
    where
        K: Read + ?Sized,
        I: ImageSource + ?Sized,
    {
        let ram = self.ram.as_mut().ok_or(Error::MemoryNotAllocated)?;
        self.cmdline = Some(cmdline.to_string());
        self.placement = None;

        let placement = load_images(ram, &self.layout, kernel, initrd)?;
        Ok(self.placement.insert(placement))
    }

    /// Load the kernel, initrd and command line named in the configuration.
    pub fn load_configured_images(&mut self) -> Result<&KernelPlacement> {
        let kernel_path = self
            .config
            .kernel
            .clone()
            .ok_or_else(|| Error::Configuration("no kernel image configured".to_string()))?;
        let mut kernel = open_image(ImageKind::Kernel, &kernel_path)?;

        let mut initrd = match &self.config.initrd {
            Some(path) => Some(open_image(ImageKind::Initrd, path)?),
            None => None,
        };
        let cmdline = self.config.cmdline.clone();

        self.load_kernel_image(&mut kernel, initrd.as_mut(), &cmdline)
    }

    /// Console poll hook, called once per run-loop tick.
    pub fn read_term(&mut self) {
        self.consoles.pump();
    }

    pub fn hypervisor(&self) -> &H {
        &self.hypervisor
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn layout(&self) -> &BootLayout {
        &self.layout
    }

    pub fn ram(&self) -> Option<&GuestMemoryRegion> {
        self.ram.as_ref()
    }

    pub fn ram_mut(&mut self) -> Option<&mut GuestMemoryRegion> {
        self.ram.as_mut()
    }

    /// Size of the allocated RAM, 0 after [`ArmVm::delete_ram`].
    pub fn ram_size(&self) -> u64 {
        self.ram.as_ref().map_or(0, |ram| ram.size())
    }

    pub fn gic(&self) -> Option<&GicController<H::Device>> {
        self.gic.as_ref()
    }

    pub fn placement(&self) -> Option<&KernelPlacement> {
        self.placement.as_ref()
    }

    pub fn cmdline(&self) -> Option<&str> {
        self.cmdline.as_deref()
    }

    pub fn active_console(&self) -> ActiveConsole {
        self.consoles.active()
    }

    pub fn consoles_mut(&mut self) -> &mut Consoles {
        &mut self.consoles
    }
}

fn open_image(image: ImageKind, path: &Path) -> Result<File> {
    File::open(path).map_err(|source| Error::ImageRead { image, source })
}
