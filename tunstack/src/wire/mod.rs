/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures [`ipv4_packet`] and
   [`tcp_packet`].
 * Second, it provides a compact, high-level representation of header data that can be created
   from parsing and emitted into a sequence of octets. This happens through the `Repr` family of
   structs, e.g. [`Ipv4Repr`] or [`TcpRepr`]. A decoded TCP segment with its payload is a
   [`TcpSegment`].

The lowercase structures guarantee that, if their `check_len()` method returned `Ok(())`, then
no field accessor or setter method will panic. When parsing untrusted input, it is *necessary*
to go through `new_checked` or `Repr::parse`.

[`ipv4_packet`]: struct.ipv4_packet.html
[`tcp_packet`]: struct.tcp_packet.html
[`Ipv4Repr`]: struct.Ipv4Repr.html
[`TcpRepr`]: struct.TcpRepr.html
[`TcpSegment`]: struct.TcpSegment.html
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `ip.rs`
// * `ipv4.rs`
// * `tcp.rs`
mod error;
mod options;
pub mod ip;
pub mod ipv4;
pub mod seq;
pub mod tcp;

pub use self::error::{Error, Result};
pub use self::options::Options;

pub use self::ip::Protocol as IpProtocol;

pub use self::ipv4::{
    Address as Ipv4Address,
    Repr as Ipv4Repr,
    ipv4 as ipv4_packet};

pub use self::seq::SeqNumber as TcpSeqNumber;

pub use self::tcp::{
    Flags as TcpFlags,
    Repr as TcpRepr,
    Segment as TcpSegment,
    TcpOption,
    tcp as tcp_packet};

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

/// A description of checksum behavior for a particular protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Checksum must be computed or checked manually.
    Manual,

    /// The checksum field is ignored when parsing and zeroed when emitting.
    ///
    /// Useful when replaying captured traffic or fuzzing.
    Ignored,
}

impl Checksum {
    /// Returns whether checksum should be verified or filled.
    pub fn manual(&self) -> bool {
        match self {
            Checksum::Manual => true,
            Checksum::Ignored => false,
        }
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::Manual
    }
}
