//! Console poll hook.
//!
//! Called once per run-loop tick: if the host terminal has input, the active
//! console device takes it and the virtio console raises its interrupt.

use std::fmt;
use std::str::FromStr;

use crate::device::serial::Serial;
use crate::device::virtio::VirtioConsole;
use crate::error::{Error, Result};
use crate::term::Terminal;

/// Which device receives host terminal input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveConsole {
    /// 8250 UART.
    #[default]
    Serial,
    /// virtio-console (hvc0).
    Virtio,
}

impl fmt::Display for ActiveConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveConsole::Serial => write!(f, "serial"),
            ActiveConsole::Virtio => write!(f, "virtio"),
        }
    }
}

impl FromStr for ActiveConsole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serial" | "8250" => Ok(ActiveConsole::Serial),
            "virtio" | "hvc" => Ok(ActiveConsole::Virtio),
            _ => Err(Error::UnknownConsole(s.to_string())),
        }
    }
}

/// The VM's console devices and the terminal feeding them.
pub struct Consoles {
    active: ActiveConsole,
    term: Box<dyn Terminal>,
    serial: Serial,
    virtio: VirtioConsole,
}

impl Consoles {
    pub fn new(active: ActiveConsole, term: Box<dyn Terminal>) -> Self {
        Self::with_devices(active, term, Serial::new(), VirtioConsole::new())
    }

    pub fn with_devices(
        active: ActiveConsole,
        term: Box<dyn Terminal>,
        serial: Serial,
        virtio: VirtioConsole,
    ) -> Self {
        Self {
            active,
            term,
            serial,
            virtio,
        }
    }

    /// One run-loop tick. Never blocks.
    pub fn pump(&mut self) {
        if !self.term.readable() {
            return;
        }
        self.update_consoles();
        self.inject_interrupt();
    }

    fn update_consoles(&mut self) {
        if self.active == ActiveConsole::Serial {
            self.serial.update_consoles(self.term.as_mut());
        }
    }

    fn inject_interrupt(&mut self) {
        if self.active == ActiveConsole::Virtio {
            self.virtio.inject_interrupt(self.term.as_mut());
        }
    }

    pub fn active(&self) -> ActiveConsole {
        self.active
    }

    pub fn serial_mut(&mut self) -> &mut Serial {
        &mut self.serial
    }

    pub fn virtio_mut(&mut self) -> &mut VirtioConsole {
        &mut self.virtio
    }
}
