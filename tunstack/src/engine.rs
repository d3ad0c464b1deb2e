//! The loop moving packets between a device and the tcp endpoint.
//!
//! Each iteration reads at most one datagram, waiting no longer than the poll interval or the
//! next timer deadline, decodes it and hands the segment to the endpoint. Afterwards expired
//! timers fire and everything the endpoint queued is encoded and written to the device.
//!
//! Reading from the device is the only point at which the engine waits. The engine itself is
//! single threaded but the [`Endpoint`] may be shared with application threads that send and
//! receive on connections concurrently, their segments go out on the next iteration.
//!
//! [`Endpoint`]: ../layer/tcp/struct.Endpoint.html
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::layer::{self, tcp::{Endpoint, Transmit}};
use crate::nic::Device;
use crate::time::{Duration, Expiration, Instant};
use crate::wire::{ipv4, Checksum, IpProtocol, Ipv4Repr, TcpSegment};

/// Large enough for any IPv4 datagram.
const BUFFER_LEN: usize = ipv4::MAX_TOTAL_LEN;

/// A cancellation token for [`Engine::run`].
///
/// All clones refer to the same flag. Triggering it lets the engine finish the current iteration,
/// flush its queued segments and close the device.
///
/// [`Engine::run`]: struct.Engine.html#method.run
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

/// Drives an [`Endpoint`] with packets of a [`Device`].
///
/// [`Device`]: ../nic/trait.Device.html
/// [`Endpoint`]: ../layer/tcp/struct.Endpoint.html
pub struct Engine<D> {
    device: D,
    endpoint: Arc<Endpoint>,
    checksum: Checksum,
    poll_interval: Duration,
    /// Identification of the next outgoing datagram.
    ident: u16,
    buffer: Vec<u8>,
}

impl Shutdown {
    /// A new untriggered token.
    pub fn new() -> Self {
        Shutdown::default()
    }

    /// Request the engine to stop.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if a stop was requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl<D: Device> Engine<D> {
    /// Create an engine verifying all checksums and polling every 100 milliseconds.
    pub fn new(device: D, endpoint: Arc<Endpoint>) -> Self {
        Engine {
            device,
            endpoint,
            checksum: Checksum::Manual,
            poll_interval: Duration::from_millis(100),
            ident: 0,
            buffer: vec![0; BUFFER_LEN],
        }
    }

    /// Choose whether inbound checksums are verified.
    ///
    /// Outbound checksums are always filled in.
    pub fn with_checksum(self, checksum: Checksum) -> Self {
        Engine { checksum, ..self }
    }

    /// Set the longest time to wait for a packet before checking timers and the shutdown token.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Engine { poll_interval, ..self }
    }

    /// The endpoint driven by this engine.
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Access the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Run one iteration at the instant `now`.
    ///
    /// Returns whether a packet was received. Malformed packets and segments dropped by the
    /// endpoint are only logged, errors of the device are returned.
    pub fn poll(&mut self, now: Instant) -> io::Result<bool> {
        let timeout = self.timeout(now);
        let received = match self.device.recv(&mut self.buffer, Some(timeout))? {
            Some(len) => {
                let packet = &self.buffer[..len];
                if let Err(err) = handle_packet(&self.endpoint, self.checksum, packet, now) {
                    log::debug!("dropped inbound packet: {}", err);
                }
                true
            },
            None => false,
        };

        self.endpoint.poll_timers(now);
        self.flush()?;
        Ok(received)
    }

    /// Run until the shutdown is triggered.
    ///
    /// The segments queued at that point are still sent, then the device is closed.
    pub fn run(&mut self, shutdown: &Shutdown) -> io::Result<()> {
        log::info!("engine running");
        while !shutdown.is_triggered() {
            self.poll(Instant::now())?;
        }

        log::info!("engine shutting down");
        self.flush()?;
        self.device.close()
    }

    /// Encode and send all segments queued by the endpoint.
    ///
    /// Returns the number of datagrams written.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut sent = 0;
        for transmit in self.endpoint.drain_outbound() {
            let datagram = match self.encode(&transmit) {
                Ok(datagram) => datagram,
                Err(err) => {
                    log::warn!("{}: can not encode {}: {}", transmit.tuple, transmit.segment, err);
                    continue;
                },
            };
            net_trace!("send {}", transmit.segment);
            self.device.send(&datagram)?;
            sent += 1;
        }
        Ok(sent)
    }

    fn encode(&mut self, transmit: &Transmit) -> layer::Result<Vec<u8>> {
        let src = transmit.tuple.local;
        let dst = transmit.tuple.remote;
        let segment = transmit.segment.serialize(src, dst)?;

        let mut repr = Ipv4Repr::new(src, dst, IpProtocol::Tcp, segment.len());
        repr.ident = self.ident;
        self.ident = self.ident.wrapping_add(1);
        Ok(repr.serialize(&segment)?)
    }

    /// Wait for the poll interval but not beyond the next timer.
    fn timeout(&self, now: Instant) -> Duration {
        match self.endpoint.next_deadline() {
            Expiration::When(deadline) if deadline <= now => Duration::from_millis(0),
            Expiration::When(deadline) => (deadline - now).min(self.poll_interval),
            Expiration::Never => self.poll_interval,
        }
    }
}

/// Decode a raw datagram and hand its segment to the endpoint.
///
/// Fragments and protocols other than TCP are dropped. The error describes why the packet was
/// not accepted, answers to it are queued on the endpoint nonetheless.
pub fn handle_packet(endpoint: &Endpoint, checksum: Checksum, packet: &[u8], now: Instant)
    -> layer::Result<()>
{
    let (ip, payload) = ipv4::parse(packet, checksum)?;
    if ip.is_fragment() {
        net_debug!("dropping fragment {}", ip);
        return Ok(());
    }

    let segment = TcpSegment::parse(&ip, payload, checksum)?;
    net_trace!("recv {} {}", ip, segment);
    endpoint.process(&ip, &segment, now)
}
