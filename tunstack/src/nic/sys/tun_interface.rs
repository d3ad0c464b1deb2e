// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use std::ffi::CStr;
use std::io;
use std::os::unix::io::{RawFd, AsRawFd};

use super::{wait, Errno, FdResult, IoLenResult, LibcResult, ifreq};
use super::linux::{NetdeviceMtu, TunSetIf};

use crate::nic::Device;
use crate::time::Duration;

/// A static descriptor for interacting with a tun interface.
///
/// Contains the file descriptor and a pre-filled `ifreq` structure with the interface name that is
/// required for `ioctl` calls. This offers the raw methods for reading and writing but does not
/// encapsulate an actual `nic::Device`. Wrap it in a [`TunInterface`] for this.
///
/// [`TunInterface`]: struct.TunInterface.html
#[derive(Debug)]
pub struct TunInterfaceDesc {
    lower: libc::c_int,
    ifreq: ifreq
}

/// A tun interface, usable as a network device.
///
/// Every read yields exactly one IPv4 datagram without any packet information header. Receiving
/// waits for readability with `select` and never blocks beyond the requested timeout. Sending
/// blocks only as long as the kernel queue of the interface is full, which the descriptor being
/// non-blocking turns into an `EWOULDBLOCK` error instead.
#[derive(Debug)]
pub struct TunInterface {
    inner: TunInterfaceDesc,
}

impl AsRawFd for TunInterfaceDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl AsRawFd for TunInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

static TUN_PATH: &[u8] = b"/dev/net/tun\0";

impl TunInterfaceDesc {
    /// Try to open the tun clone device for the named interface.
    ///
    /// Note that this does *not* yet set the interface for the file descriptor, it only creates
    /// the necessary structures involved in doing so. Call [`attach_interface`] afterwards.
    ///
    /// [`attach_interface`]: #method.attach_interface
    pub fn new(name: &str) -> Result<TunInterfaceDesc, Errno> {
        let ifreq = ifreq::new(name)?;
        let lower = unsafe {
            libc::open(
                TUN_PATH.as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK)
        };

        FdResult(lower).errno()?;

        Ok(TunInterfaceDesc {
            lower,
            ifreq,
        })
    }

    /// Update the file descriptor to the named interface.
    ///
    /// See `ioctl` with `TUNSETIFF` for details on errors.
    pub fn attach_interface(&mut self) -> Result<(), Errno> {
        self.ifreq.tun_set_tun(self.lower)
    }

    /// The name of the interface.
    ///
    /// After attaching this is the name chosen by the kernel.
    pub fn name(&self) -> String {
        let bytes: Vec<u8> = self.ifreq.ifr_name.iter()
            .map(|&c| c as u8)
            .collect();
        CStr::from_bytes_until_nul(&bytes)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Try to find the mtu of the tun.
    ///
    /// Works by opening an `AF_INET/PROTO_IP` socket and querying the mtu of the named interface.
    pub fn interface_mtu(&mut self) -> Result<usize, Errno> {
        let lower = unsafe {
            libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_IP)
        };

        FdResult(lower).errno()?;

        let mtu = self.ifreq.get_mtu(lower)
            .map(|mtu| mtu as usize);

        unsafe { libc::close(lower); }

        mtu
    }

    /// Receive a single message on the tun into the buffer.
    pub fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::read(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    /// Send a single message onto the tun from the buffer.
    pub fn send(&mut self, buffer: &[u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::write(
                self.lower,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    fn close(&mut self) -> Result<(), Errno> {
        if self.lower < 0 {
            return Ok(());
        }

        let res = unsafe { libc::close(self.lower) };
        self.lower = -1;
        FdResult(res).errno()
    }
}

impl TunInterface {
    /// Open a tun interface by name.
    ///
    /// The interface is created if it does not exist yet, which requires `CAP_NET_ADMIN`.
    pub fn new(name: &str) -> Result<Self, Errno> {
        let inner = TunInterfaceDesc::new(name)?;
        Self::with_descriptor(inner)
    }

    /// Wrap an existing descriptor into a device.
    pub fn with_descriptor(mut inner: TunInterfaceDesc) -> Result<Self, Errno> {
        inner.attach_interface()?;
        log::info!("attached to tun interface {}", inner.name());
        Ok(TunInterface {
            inner,
        })
    }

    /// The name of the attached interface.
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// The mtu of the attached interface.
    pub fn mtu(&mut self) -> Result<usize, Errno> {
        self.inner.interface_mtu()
    }
}

impl Drop for TunInterfaceDesc {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Device for TunInterface {
    fn recv(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        if !wait(self.inner.lower, timeout)? {
            return Ok(None);
        }

        match self.inner.recv(buffer) {
            Ok(len) => Ok(Some(len)),
            // Spurious wakeup, someone else was faster.
            Err(Errno(libc::EWOULDBLOCK)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let len = self.inner.send(packet)?;
        if len != packet.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "truncated packet write"));
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()?;
        Ok(())
    }
}
