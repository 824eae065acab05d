//! Host terminal input.
//!
//! Console devices pull guest input from a [`Terminal`]. Both calls must
//! return immediately; the console poll hook runs on the VM's run loop.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;

/// Non-blocking source of bytes typed on the host.
pub trait Terminal: Send {
    /// Whether a read would return data right now.
    fn readable(&mut self) -> bool;

    /// Read whatever is available, returning 0 when nothing is.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// The process's standard input (fd 0).
#[derive(Debug)]
pub struct StdinTerminal {
    fd: RawFd,
}

impl StdinTerminal {
    pub fn new() -> Self {
        Self {
            fd: libc::STDIN_FILENO,
        }
    }
}

impl Default for StdinTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for StdinTerminal {
    fn readable(&mut self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        ret > 0 && (pfd.revents & libc::POLLIN) != 0
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.readable() {
            return Ok(0);
        }
        loop {
            let ret = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(err),
            }
        }
    }
}

/// In-memory terminal fed by the embedding application.
#[derive(Debug, Default)]
pub struct QueueTerminal {
    pending: VecDeque<u8>,
}

impl QueueTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if they had been typed.
    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend(data);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Terminal for QueueTerminal {
    fn readable(&mut self) -> bool {
        !self.pending.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
