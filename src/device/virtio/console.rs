//! Virtio console device (receive side).
//!
//! Host terminal input is buffered here and announced to the guest through
//! the used-ring interrupt; the rx virtqueue handler drains the buffer.

use std::collections::VecDeque;

use log::debug;

use crate::device::virtio::interrupt;
use crate::term::Terminal;

/// Most terminal input held for the guest at once.
pub const RX_BUFFER_LEN: usize = 4096;

/// Virtio console device.
pub struct VirtioConsole {
    /// Driver has set DRIVER_OK
    activated: bool,
    /// Terminal input not yet handed to the guest
    rx: VecDeque<u8>,
    /// Pending interrupt bits for the MMIO transport
    interrupt_status: u32,
}

impl VirtioConsole {
    /// Create a new virtio-console device.
    pub fn new() -> Self {
        Self {
            activated: false,
            rx: VecDeque::with_capacity(RX_BUFFER_LEN),
            interrupt_status: 0,
        }
    }

    /// Pull terminal input and raise the used-ring interrupt.
    ///
    /// Input is left in the terminal until the driver is up, and whatever
    /// does not fit in the receive buffer stays there too.
    pub fn inject_interrupt(&mut self, term: &mut dyn Terminal) {
        let room = RX_BUFFER_LEN - self.rx.len();
        if !self.activated || room == 0 || !term.readable() {
            return;
        }

        let mut buf = [0u8; RX_BUFFER_LEN];
        match term.read(&mut buf[..room]) {
            Ok(0) => {}
            Ok(n) => {
                self.rx.extend(&buf[..n]);
                self.interrupt_status |= interrupt::USED_RING;
            }
            Err(e) => debug!("virtio-console: terminal read failed: {}", e),
        }
    }

    /// Hand up to `max` buffered bytes to the rx virtqueue.
    pub fn take_input(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.rx.len());
        self.rx.drain(..n).collect()
    }

    /// Bytes waiting for the rx virtqueue.
    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    pub fn interrupt_status(&self) -> u32 {
        self.interrupt_status
    }

    /// INTERRUPT_ACK from the driver.
    pub fn ack_interrupt(&mut self, bits: u32) {
        self.interrupt_status &= !bits;
    }

    /// The driver set DRIVER_OK.
    pub fn activate(&mut self) {
        self.activated = true;
    }

    /// The driver reset the device.
    pub fn reset(&mut self) {
        self.activated = false;
        self.rx.clear();
        self.interrupt_status = 0;
    }

    pub fn is_active(&self) -> bool {
        self.activated
    }
}

impl Default for VirtioConsole {
    fn default() -> Self {
        Self::new()
    }
}
