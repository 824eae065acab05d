//! Recording hypervisor for unit tests.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::backend::{DeviceControl, DeviceKind, Hypervisor, MemorySlot};
use crate::capability::Capability;

/// One `set_attr` call: device, group, attribute, payload.
pub type AttrCall = (DeviceKind, u32, u64, Option<u64>);

#[derive(Default)]
pub struct MockHypervisor {
    missing: Vec<Capability>,
    memory_errno: Option<i32>,
    device_errno: Option<(DeviceKind, i32)>,
    slots: RefCell<Vec<MemorySlot>>,
    devices: RefCell<Vec<DeviceKind>>,
    attrs: Rc<RefCell<Vec<AttrCall>>>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_capability(mut self, cap: Capability) -> Self {
        self.missing.push(cap);
        self
    }

    pub fn fail_memory(mut self, errno: i32) -> Self {
        self.memory_errno = Some(errno);
        self
    }

    pub fn fail_device(mut self, kind: DeviceKind, errno: i32) -> Self {
        self.device_errno = Some((kind, errno));
        self
    }

    pub fn memory_slots(&self) -> Vec<MemorySlot> {
        self.slots.borrow().clone()
    }

    pub fn devices(&self) -> Vec<DeviceKind> {
        self.devices.borrow().clone()
    }

    pub fn attrs(&self) -> Vec<AttrCall> {
        self.attrs.borrow().clone()
    }
}

pub struct MockDevice {
    kind: DeviceKind,
    attrs: Rc<RefCell<Vec<AttrCall>>>,
}

impl DeviceControl for MockDevice {
    fn set_attr(&self, group: u32, attr: u64, value: Option<u64>) -> io::Result<()> {
        self.attrs.borrow_mut().push((self.kind, group, attr, value));
        Ok(())
    }
}

impl Hypervisor for MockHypervisor {
    type Device = MockDevice;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn check_extension(&self, cap: Capability) -> i32 {
        if self.missing.contains(&cap) {
            0
        } else {
            1
        }
    }

    unsafe fn register_memory(&self, slot: &MemorySlot) -> io::Result<()> {
        if let Some(errno) = self.memory_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.slots.borrow_mut().push(*slot);
        Ok(())
    }

    fn create_device(&self, kind: DeviceKind) -> io::Result<MockDevice> {
        if let Some((failing, errno)) = self.device_errno {
            if failing == kind {
                return Err(io::Error::from_raw_os_error(errno));
            }
        }
        self.devices.borrow_mut().push(kind);
        Ok(MockDevice {
            kind,
            attrs: self.attrs.clone(),
        })
    }
}
