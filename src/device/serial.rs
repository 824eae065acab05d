//! 8250 UART serial console (receive side).
//!
//! Input is pulled from the host terminal by the console poll hook into a
//! 64-byte FIFO; the guest drains it through RBR.

use std::collections::VecDeque;

use log::debug;

use crate::term::Terminal;

/// Receive FIFO depth of a 16550A.
pub const FIFO_LEN: usize = 64;

/// 8250 UART register offsets on the receive path.
pub mod reg {
    pub const RBR: u16 = 0; // Receive Buffer Register (read)
    pub const IER: u16 = 1; // Interrupt Enable Register
    pub const IIR: u16 = 2; // Interrupt Identification Register (read)
    pub const FCR: u16 = 2; // FIFO Control Register (write)
    pub const LSR: u16 = 5; // Line Status Register
}

/// Line Status Register bits.
pub mod lsr {
    pub const DATA_READY: u8 = 0x01;
}

/// Interrupt Enable Register bits.
pub mod ier {
    pub const RDI: u8 = 0x01;
}

/// Interrupt Identification Register values.
pub mod iir {
    pub const NO_INT: u8 = 0x01;
    pub const RDI: u8 = 0x04;
}

/// FIFO Control Register bits.
mod fcr {
    pub const CLEAR_RCVR: u8 = 0x02;
}

/// Receive half of an 8250 UART.
#[derive(Debug)]
pub struct Serial {
    ier: u8,
    iir: u8,
    lsr: u8,
    /// Receive FIFO (host to guest)
    rx_fifo: VecDeque<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            ier: 0,
            iir: iir::NO_INT,
            lsr: 0,
            rx_fifo: VecDeque::with_capacity(FIFO_LEN),
        }
    }

    /// Pull pending terminal input into the receive FIFO.
    ///
    /// Never blocks; does nothing when the FIFO is full or the terminal has
    /// nothing to offer.
    pub fn update_consoles(&mut self, term: &mut dyn Terminal) {
        let room = FIFO_LEN - self.rx_fifo.len();
        if room == 0 || !term.readable() {
            return;
        }

        let mut buf = [0u8; FIFO_LEN];
        match term.read(&mut buf[..room]) {
            Ok(n) => self.queue_input(&buf[..n]),
            Err(e) => debug!("serial: terminal read failed: {}", e),
        }
    }

    /// Queue input data (from host to guest), dropping what the FIFO can't hold.
    pub fn queue_input(&mut self, data: &[u8]) {
        let room = FIFO_LEN - self.rx_fifo.len();
        self.rx_fifo.extend(data.iter().take(room));
        if !self.rx_fifo.is_empty() {
            self.lsr |= lsr::DATA_READY;
        }
        self.update_iir();
    }

    /// Bytes waiting to be read by the guest.
    pub fn rx_len(&self) -> usize {
        self.rx_fifo.len()
    }

    /// Whether the UART is asserting its interrupt line.
    pub fn irq_pending(&self) -> bool {
        self.iir & iir::NO_INT == 0
    }

    fn update_iir(&mut self) {
        self.iir = if self.ier & ier::RDI != 0 && self.lsr & lsr::DATA_READY != 0 {
            iir::RDI
        } else {
            iir::NO_INT
        };
    }

    /// Handle a guest read from a UART register.
    pub fn read(&mut self, offset: u16) -> u8 {
        match offset {
            reg::RBR => {
                let byte = self.rx_fifo.pop_front().unwrap_or(0);
                if self.rx_fifo.is_empty() {
                    self.lsr &= !lsr::DATA_READY;
                }
                self.update_iir();
                byte
            }
            reg::IER => self.ier,
            reg::IIR => self.iir,
            reg::LSR => self.lsr,
            _ => 0,
        }
    }

    /// Handle a guest write to a UART register.
    pub fn write(&mut self, offset: u16, value: u8) {
        match offset {
            reg::IER => {
                self.ier = value & 0x0F;
                self.update_iir();
            }
            reg::FCR if value & fcr::CLEAR_RCVR != 0 => {
                self.rx_fifo.clear();
                self.lsr &= !lsr::DATA_READY;
                self.update_iir();
            }
            _ => {}
        }
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::QueueTerminal;

    #[test]
    fn test_update_consoles_drains_terminal() {
        let mut serial = Serial::new();
        let mut term = QueueTerminal::new();
        term.push(b"root\n");

        serial.update_consoles(&mut term);
        assert_eq!(term.pending(), 0);
        assert_ne!(serial.read(reg::LSR) & lsr::DATA_READY, 0);

        let read: Vec<u8> = (0..5).map(|_| serial.read(reg::RBR)).collect();
        assert_eq!(read, b"root\n");
        assert_eq!(serial.read(reg::LSR) & lsr::DATA_READY, 0);
    }

    #[test]
    fn test_fifo_limit() {
        let mut serial = Serial::new();
        let mut term = QueueTerminal::new();
        term.push(&[b'x'; FIFO_LEN + 10]);

        serial.update_consoles(&mut term);
        assert_eq!(serial.rx_len(), FIFO_LEN);
        assert_eq!(term.pending(), 10);

        // Full FIFO: the terminal is left alone.
        serial.update_consoles(&mut term);
        assert_eq!(term.pending(), 10);
    }

    #[test]
    fn test_receive_interrupt() {
        let mut serial = Serial::new();
        serial.queue_input(b"a");
        assert!(!serial.irq_pending());

        serial.write(reg::IER, ier::RDI);
        assert!(serial.irq_pending());
        assert_eq!(serial.read(reg::IIR), iir::RDI);

        serial.read(reg::RBR);
        assert!(!serial.irq_pending());
    }

    #[test]
    fn test_fifo_clear() {
        let mut serial = Serial::new();
        serial.write(reg::IER, ier::RDI);
        serial.queue_input(b"abc");

        serial.write(reg::FCR, fcr::CLEAR_RCVR);
        assert_eq!(serial.rx_len(), 0);
        assert!(!serial.irq_pending());
    }
}
