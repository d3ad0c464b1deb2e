#![allow(unsafe_code)]
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `linux.rs`
// * `mod.rs`
// * `tun_interface.rs`
use core::mem;
use std::{fmt, io, ptr};
use std::os::unix::io::RawFd;

use crate::time::Duration;

mod linux;
mod tun_interface;

/// Module importing all types that should be exported.
///
/// Allows keeping all the `cfg` bits inside this module by enabling a controlled glob import from
/// the super module.
pub mod exports {
    pub use super::tun_interface::{TunInterface, TunInterfaceDesc};
    pub use super::wait as sys_wait;
    pub use super::Errno;
}

/// Wait until given file descriptor becomes readable, but no longer than given timeout.
///
/// Returns whether the descriptor is readable. Being interrupted by a signal counts as a timeout.
pub fn wait(fd: RawFd, duration: Option<Duration>) -> Result<bool, Errno> {
    let mut readfds;

    unsafe {
        let mut readfds_init = mem::MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(readfds_init.as_mut_ptr());
        libc::FD_SET(fd, readfds_init.as_mut_ptr());
        readfds = readfds_init.assume_init();
    }

    let mut timeout = libc::timeval { tv_sec: 0, tv_usec: 0 };
    let timeout = duration.map(|duration| {
        timeout.tv_sec = duration.as_secs() as libc::time_t;
        timeout.tv_usec = duration.subsec_micros() as libc::suseconds_t;
        &mut timeout
    });

    let timeout_ptr = timeout
        .map(|reference| reference as *mut _)
        .unwrap_or_else(ptr::null_mut);

    let res = unsafe {
        libc::select(
            fd + 1,
            &mut readfds,
            ptr::null_mut(),
            ptr::null_mut(),
            timeout_ptr)
    };

    match FdResult(res).errno() {
        Ok(()) => Ok(res > 0),
        Err(Errno(libc::EINTR)) => Ok(false),
        Err(err) => Err(err),
    }
}

/// An errno value.
///
/// This is used as the error representation of raw libc calls. It can be converted into a
/// `std::io::Error` where it will consequently have much more extensive error information.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

#[derive(Clone, Copy)]
struct FdResult(pub libc::c_int);

#[derive(Clone, Copy)]
struct IoLenResult(pub libc::ssize_t);

type IoctlResult = FdResult;
#[allow(non_snake_case)] // Emulate type alias also importing constructor.
fn IoctlResult(val: libc::c_int) -> IoctlResult { FdResult(val) }

/// Base for an if ioctl request.
///
/// Contains the name of the interface.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
}

/// Trait for interpreting integer return values.
///
/// Failure signals may vary between:
/// * `-1`
/// * arbitrary negative values
/// * non-zero
trait LibcResult: Copy {
    fn is_fail(self) -> bool;

    fn errno(self) -> Result<(), Errno> {
        if self.is_fail() {
            Err(Errno::new())
        } else {
            Ok(())
        }
    }
}

impl Errno {
    /// The current `errno` of this thread.
    pub fn new() -> Errno {
        Errno(unsafe { *libc::__errno_location() })
    }
}

impl LibcResult for FdResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl LibcResult for IoLenResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err.0 as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0 as i32))
    }
}

impl std::error::Error for Errno {}

impl ifreq {
    /// Fill in the name of an interface.
    ///
    /// Names that do not fit, including the terminating nul byte, are rejected with `EINVAL`.
    fn new(name: &str) -> Result<Self, Errno> {
        let mut ifr_name = [0; libc::IF_NAMESIZE];
        if name.len() >= ifr_name.len() || name.as_bytes().contains(&0) {
            return Err(Errno(libc::EINVAL));
        }

        for (i, byte) in name.as_bytes().iter().enumerate() {
            ifr_name[i] = *byte as libc::c_char
        }

        Ok(ifreq {
            ifr_name,
        })
    }
}
