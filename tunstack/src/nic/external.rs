//! A stub device whose packets come from an external source.
use std::collections::VecDeque;
use std::io;

use crate::time::Duration;
use super::Device;

/// A device backed by two queues of packets.
///
/// Received packets are taken from the inbound queue, sent packets end up on the outbound queue.
/// Receiving never waits, an empty inbound queue simply yields no packet.
#[derive(Debug, Default)]
pub struct External {
    inbound: VecDeque<Vec<u8>>,
    outbound: VecDeque<Vec<u8>>,
    closed: bool,
}

impl External {
    /// A new device without any packets.
    pub fn new() -> Self {
        External::default()
    }

    /// Queue a packet to be received.
    pub fn push_inbound(&mut self, packet: Vec<u8>) {
        self.inbound.push_back(packet);
    }

    /// Take the oldest sent packet.
    pub fn pop_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    /// Take all sent packets.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain(..).collect()
    }

    /// Remaining number of packets to receive.
    pub fn to_recv(&self) -> usize {
        self.inbound.len()
    }

    /// Check if the device was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "device closed"))
        } else {
            Ok(())
        }
    }
}

impl Device for External {
    fn recv(&mut self, buffer: &mut [u8], _: Option<Duration>) -> io::Result<Option<usize>> {
        self.check_open()?;
        let packet = match self.inbound.pop_front() {
            Some(packet) => packet,
            None => return Ok(None),
        };

        let len = packet.len().min(buffer.len());
        buffer[..len].copy_from_slice(&packet[..len]);
        Ok(Some(len))
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.check_open()?;
        self.outbound.push_back(packet.to_vec());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
