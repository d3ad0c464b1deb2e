//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. An endpoint represents the local state of a protocol. This
//! state can be used to process packets of that layer. The state is open to modifications as part
//! of a user program, similar to reconfiguration on the OS level with utilities such as `ss` or
//! `sysctl`.
//!
//! There is only one layer here. The tun device strips any link layer and the engine decodes the
//! IPv4 header itself, so every decoded segment is handed straight to the [`tcp`] endpoint.
//!
//! [`tcp`]: tcp/index.html
use core::fmt;

use crate::wire;

pub mod tcp;

/// The result type of layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors of the connection layer.
///
/// Some of these describe why an inbound segment was discarded and are only logged. Others are
/// returned to the application from operations on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// A packet could not be decoded or encoded.
    Wire(wire::Error),

    /// An inbound segment was outside the receive window.
    ///
    /// It was answered with an acknowledgement of the expected sequence number and then dropped.
    SequenceOutOfWindow,

    /// A connection for this four tuple already exists.
    ConnectionExists,

    /// The remote reset the connection.
    ConnectionReset,

    /// The connection is closing, no more data can be sent or is left to be received.
    ConnectionClosing,

    /// The remote violated the protocol, the connection was reset.
    ///
    /// For example a SYN inside the window of a synchronized connection.
    ProtocolViolation,

    /// There is no connection for the handle or four tuple.
    NoConnection,

    /// The operation is not permitted in the current state.
    Illegal,
}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Error::Wire(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Wire(err)           => write!(f, "{}", err),
            Error::SequenceOutOfWindow => write!(f, "sequence number out of window"),
            Error::ConnectionExists    => write!(f, "connection already exists"),
            Error::ConnectionReset     => write!(f, "connection reset"),
            Error::ConnectionClosing   => write!(f, "connection closing"),
            Error::ProtocolViolation   => write!(f, "protocol violation"),
            Error::NoConnection        => write!(f, "connection does not exist"),
            Error::Illegal             => write!(f, "operation not permitted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Wire(err) => Some(err),
            _ => None,
        }
    }
}
