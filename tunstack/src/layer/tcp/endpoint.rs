//! The connection table.
//!
//! Relevant material for reading:
//! Main TCP rfc (skip if confident): https://tools.ietf.org/html/rfc793
//! Errata and comments: https://tools.ietf.org/html/rfc1122#section-4.2
//! RST handling specifically: https://www.snellman.net/blog/archive/2016-02-01-tcp-rst/
use core::fmt;
use core::ops;
use std::collections::{HashMap, VecDeque};

use parking_lot::{Condvar, Mutex};

use super::{Config, IsnGenerator};
use super::connection::{Connection, Notification, Signals, State};
use crate::layer::{Error, Result};
use crate::time::{Expiration, Instant};
use crate::wire::{Ipv4Address, Ipv4Repr, TcpRepr, TcpSegment as Segment};

/// Handles TCP connection states.
///
/// All methods take a shared reference, the endpoint can be used from several threads at once.
/// Each connection is only ever worked on by one of them, see [`Checkout`].
///
/// [`Checkout`]: struct.Checkout.html
pub struct Endpoint {
    table: Mutex<Table>,
    /// Signalled whenever a checked out connection is returned to the table.
    returned: Condvar,
    isn: IsnGenerator,
    config: Config,
    outbound: Mutex<VecDeque<Transmit>>,
    notifications: Mutex<VecDeque<Event>>,
}

#[derive(Default)]
struct Table {
    ports: HashMap<FourTuple, SlotKey>,
    slots: HashMap<SlotKey, Slot>,
    next_key: u64,
}

enum Slot {
    Idle(Connection),
    /// Currently checked out.
    Busy,
}

/// Identifies a connection by both of its endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourTuple {
    /// Our address.
    pub local: Ipv4Address,
    /// The address of the remote, unspecified for a listener.
    pub remote: Ipv4Address,
    /// Our port.
    pub local_port: u16,
    /// The port of the remote, 0 for a listener.
    pub remote_port: u16,
}

/// The index of a connection.
///
/// Useful for storing in other structs to reference the connection at another point in time. Note
/// that the index will be invalidated when the connection itself is closed. Keys are never
/// reused, so an invalidated key does not alias a newer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey(u64);

/// The kind of open requested by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Open {
    /// Send a SYN to the remote of the tuple.
    Active,
    /// Wait for SYNs to the local part of the tuple.
    Passive,
}

/// A segment waiting to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transmit {
    /// The connection, the segment goes from its local to its remote address.
    pub tuple: FourTuple,
    /// The segment to send, without checksum.
    pub segment: Segment,
}

/// A notification for the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Event {
    /// The connection concerned, possibly no longer valid.
    pub key: SlotKey,
    /// The tuple of the connection.
    pub tuple: FourTuple,
    /// What happened.
    pub notification: Notification,
}

/// Exclusive access to a connection of the table.
///
/// While a checkout exists the connection is absent from its slot. A second checkout of the same
/// key blocks until this one is dropped. Dropping it returns the connection to the table, or
/// removes the entry if the connection asked to be deleted.
pub struct Checkout<'a> {
    endpoint: &'a Endpoint,
    key: SlotKey,
    connection: Option<Connection>,
    delete: bool,
}

impl Endpoint {
    /// Create an empty table with a randomly keyed sequence number generator.
    pub fn new(config: Config) -> Self {
        Endpoint::with_isn(config, IsnGenerator::from_std_hash())
    }

    /// Create an empty table with a chosen sequence number generator.
    pub fn with_isn(config: Config, isn: IsnGenerator) -> Self {
        Endpoint {
            table: Mutex::new(Table::default()),
            returned: Condvar::new(),
            isn,
            config,
            outbound: Mutex::new(VecDeque::new()),
            notifications: Mutex::new(VecDeque::new()),
        }
    }

    /// The configuration used for new connections.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Find the connection of a tuple.
    pub fn lookup(&self, tuple: &FourTuple) -> Option<SlotKey> {
        self.table.lock().ports.get(tuple).copied()
    }

    /// Insert a new connection.
    ///
    /// Fails with `ConnectionExists` if its tuple is already taken.
    pub fn create(&self, connection: Connection) -> Result<SlotKey> {
        let mut table = self.table.lock();
        if table.ports.contains_key(&connection.tuple) {
            return Err(Error::ConnectionExists);
        }

        let key = SlotKey(table.next_key);
        table.next_key += 1;
        table.ports.insert(connection.tuple, key);
        table.slots.insert(key, Slot::Idle(connection));
        Ok(key)
    }

    /// Remove the connection of a tuple without any further communication.
    pub fn remove(&self, tuple: &FourTuple) -> Option<Connection> {
        let key = self.lookup(tuple)?;
        let mut checkout = self.checkout(key)?;
        checkout.delete = true;
        let connection = checkout.connection.take();
        connection
    }

    /// Get exclusive access to a connection.
    ///
    /// Blocks while the connection is checked out elsewhere. Returns `None` if the key is
    /// invalid, which includes connections deleted while waiting.
    pub fn checkout(&self, key: SlotKey) -> Option<Checkout> {
        let mut table = self.table.lock();
        loop {
            let slot = table.slots.get_mut(&key)?;
            if let Slot::Idle(_) = slot {
                if let Slot::Idle(connection) = core::mem::replace(slot, Slot::Busy) {
                    return Some(Checkout {
                        endpoint: self,
                        key,
                        connection: Some(connection),
                        delete: false,
                    });
                }
            }
            self.returned.wait(&mut table);
        }
    }

    /// The state of a connection.
    pub fn status(&self, key: SlotKey) -> Option<State> {
        self.checkout(key).map(|connection| connection.state())
    }

    /// Open a connection.
    ///
    /// An active open sends a SYN to the remote of the tuple. A passive open ignores the remote
    /// part and creates a listener for the local address and port.
    pub fn open(&self, open: Open, tuple: FourTuple, time: Instant) -> Result<SlotKey> {
        match open {
            Open::Passive => {
                let tuple = tuple.listener();
                let key = self.create(Connection::listen(tuple, self.config))?;
                log::info!("listening on {}:{}", tuple.local, tuple.local_port);
                Ok(key)
            },
            Open::Active => {
                if self.lookup(&tuple).is_some() {
                    return Err(Error::ConnectionExists);
                }

                let iss = self.isn.get_isn(tuple, time);
                let (connection, signals) = Connection::open(tuple, iss, self.config, time);
                let key = self.create(connection)?;
                // Nobody else knows the key yet.
                self.queue(tuple, signals.segments);
                Ok(key)
            },
        }
    }

    /// Queue data on a connection.
    pub fn send(&self, key: SlotKey, data: &[u8], time: Instant) -> Result<()> {
        let mut connection = self.checkout(key).ok_or(Error::NoConnection)?;
        let signals = connection.send(data, time)?;
        self.apply(&mut connection, signals)
    }

    /// Read at most `limit` bytes of received data.
    ///
    /// Returns `ConnectionClosing` once the remote closed and all data was read.
    pub fn receive(&self, key: SlotKey, limit: usize) -> Result<Vec<u8>> {
        let mut connection = self.checkout(key).ok_or(Error::NoConnection)?;
        connection.receive(limit)
    }

    /// Close our side of a connection.
    pub fn close(&self, key: SlotKey, time: Instant) -> Result<()> {
        let mut connection = self.checkout(key).ok_or(Error::NoConnection)?;
        let signals = connection.close(time)?;
        self.apply(&mut connection, signals)
    }

    /// Abort a connection, resetting the remote.
    pub fn abort(&self, key: SlotKey) -> Result<()> {
        let mut connection = self.checkout(key).ok_or(Error::NoConnection)?;
        let signals = connection.abort();
        self.apply(&mut connection, signals)
    }

    /// Process an inbound segment.
    ///
    /// The error reports why the segment was not accepted, any answer to it is queued regardless.
    pub fn process(&self, ip: &Ipv4Repr, segment: &Segment, time: Instant) -> Result<()> {
        let tuple = FourTuple::inbound(ip, &segment.repr);

        if let Some(key) = self.lookup(&tuple) {
            // Gone while we waited, handle like any stray segment.
            if let Some(mut connection) = self.checkout(key) {
                let signals = connection.arrives(segment, &self.isn, time);
                return self.apply(&mut connection, signals);
            }
        }

        if self.find_listener(&tuple).is_some() {
            return self.accept(tuple, segment, time);
        }

        net_debug!("{}: no connection for {}", tuple, segment);
        self.queue(tuple, Connection::reset_for(segment));
        Err(Error::NoConnection)
    }

    /// Fire expired timers of all connections.
    ///
    /// Connections checked out at the moment are skipped, their timers fire on the next call.
    pub fn poll_timers(&self, time: Instant) {
        let expired: Vec<SlotKey> = {
            let table = self.table.lock();
            table.slots.iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Idle(connection) if connection.next_deadline().is_expired(time) => Some(*key),
                    _ => None,
                })
                .collect()
        };

        for key in expired {
            if let Some(mut connection) = self.checkout(key) {
                let signals = connection.poll(time);
                if let Err(err) = self.apply(&mut connection, signals) {
                    log::debug!("{}: timer on {} failed: {}", key, connection.tuple, err);
                }
            }
        }
    }

    /// The earliest deadline of any idle connection.
    pub fn next_deadline(&self) -> Expiration {
        self.table.lock().slots.values()
            .filter_map(|slot| match slot {
                Slot::Idle(connection) => Some(connection.next_deadline()),
                Slot::Busy => None,
            })
            .min()
            .unwrap_or(Expiration::Never)
    }

    /// Take all segments queued for sending.
    pub fn drain_outbound(&self) -> Vec<Transmit> {
        self.outbound.lock().drain(..).collect()
    }

    /// Take the oldest notification.
    pub fn poll_notification(&self) -> Option<Event> {
        self.notifications.lock().pop_front()
    }

    /// The number of connections, including listeners.
    pub fn len(&self) -> usize {
        self.table.lock().ports.len()
    }

    /// Check if there are no connections at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_listener(&self, tuple: &FourTuple) -> Option<SlotKey> {
        let table = self.table.lock();
        let listener = tuple.listener();
        let any = FourTuple { local: Ipv4Address::UNSPECIFIED, ..listener };
        table.ports.get(&listener)
            .or_else(|| table.ports.get(&any))
            .copied()
    }

    /// Let a fresh connection in LISTEN handle a segment for a listener.
    ///
    /// It only becomes an entry of the table if the segment was a SYN.
    fn accept(&self, tuple: FourTuple, segment: &Segment, time: Instant) -> Result<()> {
        let mut connection = Connection::listen(tuple, self.config);
        let signals = connection.arrives(segment, &self.isn, time);

        if connection.state() == State::SynReceived {
            let key = self.create(connection)?;
            log::debug!("{}: new connection {:?}", tuple, key);
        }

        self.queue(tuple, signals.segments);
        match signals.dropped {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply(&self, checkout: &mut Checkout, signals: Signals) -> Result<()> {
        let tuple = checkout.tuple;
        self.queue(tuple, signals.segments);

        if let Some(notification) = signals.notification {
            self.notifications.lock().push_back(Event {
                key: checkout.key,
                tuple,
                notification,
            });
        }

        if signals.delete {
            checkout.delete = true;
        }

        match signals.dropped {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn queue<I>(&self, tuple: FourTuple, segments: I)
        where I: IntoIterator<Item=Segment>
    {
        let mut outbound = self.outbound.lock();
        for segment in segments {
            net_trace!("{}: queue {}", tuple, segment);
            outbound.push_back(Transmit { tuple, segment });
        }
    }

    fn put_back(&self, key: SlotKey, connection: Option<Connection>, delete: bool) {
        let mut table = self.table.lock();
        match connection {
            Some(connection) if !delete => {
                table.slots.insert(key, Slot::Idle(connection));
            },
            connection => {
                table.slots.remove(&key);
                if let Some(connection) = connection {
                    if table.ports.get(&connection.tuple) == Some(&key) {
                        table.ports.remove(&connection.tuple);
                    }
                    log::debug!("{}: removed in {}", connection.tuple, connection.previous);
                } else {
                    table.ports.retain(|_, other| *other != key);
                }
            },
        }
        drop(table);
        self.returned.notify_all();
    }
}

impl FourTuple {
    /// The tuple of the connection an inbound segment belongs to.
    pub fn inbound(ip: &Ipv4Repr, repr: &TcpRepr) -> Self {
        FourTuple {
            local: ip.dst_addr,
            remote: ip.src_addr,
            local_port: repr.dst_port,
            remote_port: repr.src_port,
        }
    }

    /// The tuple of a listener for the local part.
    pub fn listener(self) -> Self {
        FourTuple {
            remote: Ipv4Address::UNSPECIFIED,
            remote_port: 0,
            ..self
        }
    }

    /// Check if this is the tuple of a listener.
    pub fn is_listener(&self) -> bool {
        self.remote.is_unspecified() && self.remote_port == 0
    }
}

impl Checkout<'_> {
    /// The key of the checked out connection.
    pub fn key(&self) -> SlotKey {
        self.key
    }
}

impl ops::Deref for Checkout<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.connection {
            Some(connection) => connection,
            None => unreachable!("connection only taken on removal"),
        }
    }
}

impl ops::DerefMut for Checkout<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.connection {
            Some(connection) => connection,
            None => unreachable!("connection only taken on removal"),
        }
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        self.endpoint.put_back(self.key, self.connection.take(), self.delete);
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} <-> {}:{}", self.local, self.local_port, self.remote, self.remote_port)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
