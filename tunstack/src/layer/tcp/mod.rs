//! The TCP layer abstraction.
//!
//! Implements the connection state machine of RFC 793 for an endpoint with one local address.
//! Many incoming events *require* soliciting an answer such as an ACK for received data, so every
//! transition produces a set of outgoing segments which the [`Endpoint`] queues for the engine.
//!
//! ## Structure
//!
//! The main functionality of the [`Endpoint`] structure of this layer is storing the connection
//! states. To this end it utilizes one map of connection tuples to [`SlotKey`]s (which behave
//! similar to specialized file descriptors) and a second map of these keys to connections.
//!
//! A [`Connection`] is the transmission control block. It never touches the table itself, it
//! only signals that it wants to be deleted. Processing happens on a connection that is checked
//! out of the table, see [`Checkout`], so that two segments of the same connection are never
//! processed at the same time while different connections proceed in parallel.
//!
//! ## Creating a connection
//!
//! An active open sends the initial SYN immediately, its initial sequence number is chosen by an
//! [`IsnGenerator`] from the four tuple and the clock. A passive open creates a listening entry
//! whose remote address and port are unspecified. Each SYN matching a listener creates a new
//! connection for the full four tuple while the listener itself keeps listening.
//!
//! ## Deviations
//!
//! Here is a list of deviations from the standard.
//!
//! * Data arriving out of order inside the window is not queued for reassembly. It is dropped and
//!   answered with a duplicate acknowledgement, the remote will retransmit it.
//! * Data in a SYN is ignored and not acknowledged.
//! * No congestion control. The amount of data in flight is only limited by the send window.
//! * A RST is accepted anywhere within the window.
//!
//! [`Checkout`]: struct.Checkout.html
//! [`Connection`]: struct.Connection.html
//! [`Endpoint`]: struct.Endpoint.html
//! [`IsnGenerator`]: struct.IsnGenerator.html
//! [`SlotKey`]: struct.SlotKey.html
use crate::time::Duration;

mod connection;
mod endpoint;
mod siphash;

#[cfg(test)]
mod tests;

pub use connection::{
    Connection,
    Notification,
    Receive,
    Send,
    Signals,
    State};

pub use endpoint::{
    Checkout,
    Endpoint,
    Event,
    FourTuple,
    Open,
    SlotKey,
    Transmit};

pub use siphash::IsnGenerator;

/// Tunables of connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// The maximum segment lifetime.
    ///
    /// A closed connection lingers in TIME-WAIT for twice this duration.
    pub msl: Duration,

    /// The retransmission timeout before any backoff.
    pub retransmit_timeout: Duration,

    /// The upper bound of the retransmission timeout under exponential backoff.
    pub max_retransmit_timeout: Duration,

    /// Consecutive retransmissions after which the connection is given up.
    pub max_retransmits: u32,

    /// The size of the receive buffer, which also bounds the advertised window.
    pub receive_buffer: u16,

    /// The maximum segment size announced to the remote and used for our own segments.
    pub max_seg_size: u16,
}

impl Config {
    /// The duration of the TIME-WAIT state.
    pub fn time_wait(&self) -> Duration {
        self.msl * 2
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            msl: Duration::from_secs(30),
            retransmit_timeout: Duration::from_secs(1),
            max_retransmit_timeout: Duration::from_secs(60),
            max_retransmits: 5,
            receive_buffer: 0xffff,
            max_seg_size: 1460,
        }
    }
}
