//! A user-space IPv4/TCP endpoint fed by raw packets from a tun device.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [The wire module](wire/index.html)
//!    1. [Sequence numbers](wire/seq/index.html)
//!    1. [Ipv4](wire/ipv4/index.html)
//!    1. [Tcp](wire/tcp/index.html)
//! 3. [The tcp layer](layer/tcp/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. [The engine loop](engine/index.html)
//!
//! ## Design
//!
//! The tun device hands us complete IPv4 datagrams, there is no link layer involved. Each
//! datagram is decoded by the `wire` module into a header representation and a TCP segment,
//! which is then routed by its four tuple to one connection of the tcp [`Endpoint`]. The
//! connection runs the RFC 793 state machine and answers with zero or more segments. These are
//! collected by the endpoint and written back to the device by the [`Engine`].
//!
//! Every operation of the state machine is a pure transition: it takes the current connection
//! state and an event (segment, user call or timer) and produces a set of [`Signals`]. The
//! endpoint alone decides what happens to the connection table afterwards. Concurrent callers are
//! serialized per connection by checking a connection out of the table for the duration of an
//! event.
//!
//! [`Endpoint`]: layer/tcp/struct.Endpoint.html
//! [`Engine`]: engine/struct.Engine.html
//! [`Signals`]: layer/tcp/struct.Signals.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod config;
pub mod engine;
pub mod layer;
pub mod nic;
pub mod time;
pub mod wire;
