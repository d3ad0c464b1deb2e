//! Encapsulates a network device delivering raw IP packets.
//!
//! Also permits software emulation of one as well, of course. The engine only needs to read one
//! datagram at a time, with a bound on how long to wait for it, and to write one datagram at a
//! time. There is no link layer, every buffer holds exactly one IPv4 datagram.
use std::io;

use crate::time::Duration;

pub mod external;

#[cfg(target_os = "linux")]
#[path="sys/mod.rs"]
mod sys_internal;

#[cfg(target_os = "linux")]
pub use self::sys_internal::exports as sys;

/// A layer 3 device.
pub trait Device {
    /// Receive a single packet into the buffer.
    ///
    /// Waits at most `timeout` for a packet to arrive, or indefinitely if it is `None`. Returns
    /// `Ok(None)` if nothing arrived in time. A packet larger than the buffer is truncated, so the
    /// buffer should be able to hold the largest datagram of the device.
    fn recv(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>>;

    /// Send a single packet.
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Release the device.
    ///
    /// No other method is called afterwards. The default does nothing.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: Device + ?Sized> Device for &'_ mut D {
    fn recv(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        (**self).recv(buffer, timeout)
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        (**self).send(packet)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn recv(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        (**self).recv(buffer, timeout)
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        (**self).send(packet)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
