//! Command line configuration of the engine binary.
use std::net;

use structopt::StructOpt;

use crate::layer::tcp;
use crate::time::Duration;
use crate::wire::{Checksum, Ipv4Address};

/// Options of the `tunstack` binary.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "tunstack", about = "A user-space TCP endpoint on a tun interface.")]
pub struct Config {
    /// Name of the tun interface, created if it does not exist.
    pub tun: String,

    /// The local address of the endpoint.
    pub address: net::Ipv4Addr,

    /// Ports on which to accept connections, echoing all received data.
    #[structopt(short = "l", long = "listen")]
    pub listen: Vec<u16>,

    /// Maximum segment lifetime in seconds, TIME-WAIT lasts twice as long.
    #[structopt(long = "msl", default_value = "30")]
    pub msl: u64,

    /// Initial retransmission timeout in milliseconds.
    #[structopt(long = "rto", default_value = "1000")]
    pub rto: u64,

    /// Retransmissions without answer after which a connection is given up.
    #[structopt(long = "max-retransmits", default_value = "5")]
    pub max_retransmits: u32,

    /// Size of the receive buffer of each connection in bytes.
    #[structopt(long = "receive-buffer", default_value = "65535")]
    pub receive_buffer: u16,

    /// Maximum segment size announced to remotes.
    #[structopt(long = "mss", default_value = "1460")]
    pub mss: u16,

    /// Longest wait for a packet in milliseconds before timers are checked.
    #[structopt(long = "poll-interval", default_value = "100")]
    pub poll_interval: u64,

    /// Accept packets with invalid checksums.
    #[structopt(long = "no-checksum")]
    pub no_checksum: bool,
}

impl Config {
    /// Parse the process arguments, exiting with a usage message on error.
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }

    /// The local address.
    pub fn local(&self) -> Ipv4Address {
        self.address.into()
    }

    /// The tunables of connections.
    pub fn tcp(&self) -> tcp::Config {
        tcp::Config {
            msl: Duration::from_secs(self.msl),
            retransmit_timeout: Duration::from_millis(self.rto),
            max_retransmits: self.max_retransmits,
            receive_buffer: self.receive_buffer,
            max_seg_size: self.mss,
            ..tcp::Config::default()
        }
    }

    /// The checksum treatment of inbound packets.
    pub fn checksum(&self) -> Checksum {
        if self.no_checksum {
            Checksum::Ignored
        } else {
            Checksum::Manual
        }
    }

    /// The poll interval of the engine.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }
}
