//! End-to-end bootstrap against a recording hypervisor.

use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use arm_microvm::backend::{DeviceControl, DeviceKind, Hypervisor, MemorySlot};
use arm_microvm::capability::Capability;
use arm_microvm::device::virtio::interrupt;
use arm_microvm::term::QueueTerminal;
use arm_microvm::{ActiveConsole, ArmVm, Error, GuestAddr, ImageKind, IrqChip, VmBuilder};

type Attrs = Rc<RefCell<Vec<(DeviceKind, u32, u64, Option<u64>)>>>;

#[derive(Default)]
struct Recorder {
    missing: Option<Capability>,
    slots: RefCell<Vec<MemorySlot>>,
    devices: RefCell<Vec<DeviceKind>>,
    attrs: Attrs,
}

struct RecordedDevice {
    kind: DeviceKind,
    attrs: Attrs,
}

impl DeviceControl for RecordedDevice {
    fn set_attr(&self, group: u32, attr: u64, value: Option<u64>) -> io::Result<()> {
        self.attrs.borrow_mut().push((self.kind, group, attr, value));
        Ok(())
    }
}

impl Hypervisor for Recorder {
    type Device = RecordedDevice;

    fn name(&self) -> &'static str {
        "recorder"
    }

    fn check_extension(&self, cap: Capability) -> i32 {
        if self.missing == Some(cap) {
            0
        } else {
            1
        }
    }

    unsafe fn register_memory(&self, slot: &MemorySlot) -> io::Result<()> {
        self.slots.borrow_mut().push(*slot);
        Ok(())
    }

    fn create_device(&self, kind: DeviceKind) -> io::Result<RecordedDevice> {
        self.devices.borrow_mut().push(kind);
        Ok(RecordedDevice {
            kind,
            attrs: self.attrs.clone(),
        })
    }
}

const MB: u64 = 1 << 20;

#[test]
fn test_full_bootstrap_256m() {
    let mut kernel = tempfile::NamedTempFile::new().unwrap();
    kernel.write_all(&vec![0x4b; 8 << 20]).unwrap();
    let mut initrd = tempfile::NamedTempFile::new().unwrap();
    initrd.write_all(&vec![0x49; (4 << 20) + 1]).unwrap();

    let config = VmBuilder::new()
        .memory_mb(256)
        .vcpus(2)
        .kernel(kernel.path())
        .initrd(initrd.path())
        .cmdline("console=ttyS0")
        .build()
        .unwrap();

    let mut vm = ArmVm::new(Recorder::default(), config, Box::new(QueueTerminal::new())).unwrap();

    let ram = vm.ram().unwrap();
    assert_eq!(ram.size(), 256 * MB);
    assert_eq!(ram.host_region_start().raw() % (2 * MB), 0);
    assert!(ram.host_region_start().raw() + ram.size()
        <= ram.host_alloc_base().raw() + ram.host_alloc_size());

    let slots = vm.hypervisor().slots.borrow().clone();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].guest_phys_addr, GuestAddr(0x8000_0000));

    let placement = *vm.load_configured_images().unwrap();
    let limit = 0x8000_0000u64 + 256 * MB - 1;

    assert_eq!(placement.kernel_guest_start, GuestAddr(0x8008_0000));
    assert_eq!(placement.kernel_size, 8 * MB);
    assert_eq!(placement.dtb_guest_start, GuestAddr(0x8fc0_0000));
    assert!(placement.dtb_guest_start.raw() < limit);

    let initrd_start = placement.initrd_guest_start.unwrap();
    assert_eq!(placement.initrd_size, 4 * MB + 1);
    assert_eq!(initrd_start.raw() % 4, 0);
    assert!(initrd_start.raw() >= placement.kernel_guest_start.raw() + placement.kernel_size);
    assert!(initrd_start.raw() + placement.initrd_size <= placement.dtb_guest_start.raw());

    let ram = vm.ram().unwrap();
    let host = ram.guest_to_host(initrd_start).unwrap();
    assert_eq!(ram.host_to_guest(host).unwrap(), initrd_start);
    let mut last = [0u8; 1];
    ram.read(GuestAddr(initrd_start.raw() + 4 * MB), &mut last).unwrap();
    assert_eq!(last, [0x49]);

    assert_eq!(vm.cmdline(), Some("console=ttyS0"));

    vm.delete_ram();
    vm.delete_ram();
    assert!(vm.ram().is_none());
}

#[test]
fn test_missing_psci_rejected() {
    let hyp = Recorder {
        missing: Some(Capability::ArmPsci),
        ..Recorder::default()
    };
    let config = VmBuilder::new().memory_mb(16).build().unwrap();

    match ArmVm::new(hyp, config, Box::new(QueueTerminal::new())) {
        Err(Error::MissingCapability(name)) => assert_eq!(name, "KVM_CAP_ARM_PSCI"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("VM created without PSCI"),
    }
}

#[test]
fn test_gicv3_its_frames() {
    let config = VmBuilder::new()
        .memory_mb(16)
        .vcpus(4)
        .irqchip(IrqChip::GicV3Its)
        .build()
        .unwrap();
    let vm = ArmVm::new(Recorder::default(), config, Box::new(QueueTerminal::new())).unwrap();

    assert_eq!(
        *vm.hypervisor().devices.borrow(),
        vec![DeviceKind::VgicV3, DeviceKind::VgicIts]
    );

    let layout = vm.gic().unwrap().layout();
    assert_eq!(layout.dist_base, 0x3fff_0000);
    assert_eq!(layout.redist_size, 4 * 0x20000);
    assert_eq!(layout.redist_base, Some(0x3fff_0000 - 4 * 0x20000));
    assert_eq!(layout.its_base, Some(0x3fff_0000 - 4 * 0x20000 - 0x20000));

    vm.gic().unwrap().finalize(64).unwrap();
    let attrs = vm.hypervisor().attrs.borrow().clone();
    assert!(attrs.contains(&(DeviceKind::VgicV3, 3, 0, Some(96))));
    assert_eq!(attrs.last(), Some(&(DeviceKind::VgicV3, 4, 0, None)));
}

#[test]
fn test_oversized_kernel() {
    let config = VmBuilder::new().memory_mb(8).build().unwrap();
    let mut vm = ArmVm::new(Recorder::default(), config, Box::new(QueueTerminal::new())).unwrap();

    let err = vm
        .load_kernel_image::<_, Cursor<Vec<u8>>>(&mut Cursor::new(vec![0u8; 8 << 20]), None, "")
        .unwrap_err();
    assert!(matches!(err, Error::ImageTooLarge(ImageKind::Kernel)));
    assert_eq!(err.to_string(), "kernel image too big to contain in guest memory");
}

#[test]
fn test_virtio_console_pump() {
    let mut term = QueueTerminal::new();
    term.push(b"root\n");
    let config = VmBuilder::new()
        .memory_mb(16)
        .console(ActiveConsole::Virtio)
        .build()
        .unwrap();
    let mut vm = ArmVm::new(Recorder::default(), config, Box::new(term)).unwrap();

    vm.consoles_mut().virtio_mut().activate();
    vm.read_term();

    let consoles = vm.consoles_mut();
    assert_eq!(consoles.serial_mut().rx_len(), 0);
    assert_eq!(consoles.virtio_mut().interrupt_status(), interrupt::USED_RING);
    assert_eq!(consoles.virtio_mut().take_input(64), b"root\n");
}
