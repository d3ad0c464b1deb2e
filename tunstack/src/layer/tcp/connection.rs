use core::fmt;
use std::collections::VecDeque;

use super::Config;
use super::endpoint::FourTuple;
use super::siphash::IsnGenerator;
use crate::layer::Error;
use crate::time::{Duration, Expiration, Instant};
use crate::wire::{Options, TcpFlags as Flags, TcpOption, TcpRepr, TcpSegment as Segment};
use crate::wire::TcpSeqNumber as SeqNumber;

/// The maximum segment size assumed when the remote announces none (RFC 879).
const DEFAULT_REMOTE_MSS: u16 = 536;

/// The state of a connection.
///
/// Includes current state machine state, the configuration state that is fixed after the
/// handshake, the sequence spaces and the buffers of data that are still in flight or not yet
/// read by the application.
#[derive(Clone, Debug)]
pub struct Connection {
    /// The four tuple identifying the connection.
    ///
    /// For a listening connection the remote part may be unspecified.
    pub tuple: FourTuple,

    /// The current state of the state machine.
    pub current: State,

    /// The previous state of the state machine.
    pub previous: State,

    /// The send sequence space.
    pub send: Send,

    /// The receive sequence space.
    pub recv: Receive,

    /// The maximum segment size of the remote.
    pub remote_mss: u16,

    config: Config,

    /// Segments occupying sequence space that are not yet fully acknowledged.
    retransmit: VecDeque<Segment>,

    /// Data handed to us by the application that was not yet segmentized.
    unsent: VecDeque<u8>,

    /// In-order data not yet read by the application.
    received: VecDeque<u8>,

    /// The application closed its side, a FIN follows the unsent data.
    fin_queued: bool,

    /// The sequence number of our FIN, once sent.
    fin_seq: Option<SeqNumber>,

    timers: Timers,
}

/// State enum of the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Marker state for an unintended/uninitialized connection state.
    Closed,

    /// A listening connection.
    ///
    /// Akin to an open server socket. Can either be turned into SynSent or SynReceived depending
    /// on whether we receive a SYN or decide to open a connection.
    Listen,

    /// An open request.
    SynSent,

    /// Connection request that was received and acknowledged.
    SynReceived,

    /// An open connection.
    Established,

    /// Closed our side of the connection, our FIN may not be acknowledged yet.
    FinWait1,

    /// Closed our side of the connection and the FIN was acknowledged.
    FinWait2,

    /// Both sides closed simultaneously, waiting for the acknowledgement of our FIN.
    Closing,

    /// Both sides closed, lingering for delayed segments.
    TimeWait,

    /// The remote closed its side of the connection.
    CloseWait,

    /// Closed our side after the remote closed theirs, waiting for the acknowledgement of our FIN.
    LastAck,
}

/// The send sequence space.
///
/// ```text
///      1         2          3          4
/// ----------|----------|----------|----------
///        SND.UNA    SND.NXT    SND.UNA
///                             +SND.WND
///
/// 1 - old sequence numbers which have been acknowledged
/// 2 - sequence numbers of unacknowledged data
/// 3 - sequence numbers allowed for new data transmission
/// 4 - future sequence numbers which are not yet allowed
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Send {
    /// The oldest unacknowledged sequence number (SND.UNA).
    pub unacked: SeqNumber,

    /// The next sequence number to use for transmission (SND.NXT).
    pub next: SeqNumber,

    /// The send window announced by the remote (SND.WND).
    pub window: u16,

    /// The send urgent pointer (SND.UP).
    pub urgent: u16,

    /// The segment sequence number of the last window update (SND.WL1).
    pub last_window_update_seq: SeqNumber,

    /// The segment acknowledgment number of the last window update (SND.WL2).
    pub last_window_update_ack: SeqNumber,

    /// The initial sequence number (ISS).
    pub initial_seq: SeqNumber,
}

/// The receive sequence space.
///
/// ```text
///     1          2          3
/// ----------|----------|----------
///        RCV.NXT    RCV.NXT
///                  +RCV.WND
///
/// 1 - old sequence numbers which have been acknowledged
/// 2 - sequence numbers allowed for new reception
/// 3 - future sequence numbers which are not yet allowed
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Receive {
    /// The next sequence number expected (RCV.NXT).
    pub next: SeqNumber,

    /// The receive window we announce (RCV.WND).
    pub window: u16,

    /// The last urgent pointer received (RCV.UP).
    pub urgent: u16,

    /// The initial sequence number of the remote (IRS).
    pub initial_seq: SeqNumber,
}

#[derive(Clone, Copy, Debug, Default)]
struct Timers {
    retransmit: Expiration,
    time_wait: Expiration,
    /// The current retransmission timeout, doubled on each expiry.
    timeout: Duration,
    /// Consecutive expiries without progress.
    retries: u32,
}

/// A notification for the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Notification {
    /// The handshake completed.
    Established,

    /// The remote reset the connection or violated the protocol.
    Reset,

    /// The connection closed after an orderly shutdown.
    Closed,

    /// The remote stopped acknowledging our retransmissions.
    TimedOut,
}

/// The result of an event on a connection.
///
/// The connection never touches the table, it only asks to be deleted.
#[derive(Debug, Default)]
#[must_use = "Contains segments that need to be sent"]
pub struct Signals {
    /// Segments to send, in order.
    pub segments: Vec<Segment>,

    /// Something the application should hear about.
    pub notification: Option<Notification>,

    /// Why an inbound segment was discarded, if it was.
    pub dropped: Option<Error>,

    /// The connection is closed and should be removed from the table.
    pub delete: bool,
}

impl Connection {
    /// A closed connection for a four tuple.
    pub fn new(tuple: FourTuple, config: Config) -> Self {
        Connection {
            tuple,
            current: State::Closed,
            previous: State::Closed,
            send: Send::default(),
            recv: Receive {
                window: config.receive_buffer,
                ..Receive::default()
            },
            remote_mss: DEFAULT_REMOTE_MSS,
            config,
            retransmit: VecDeque::new(),
            unsent: VecDeque::new(),
            received: VecDeque::new(),
            fin_queued: false,
            fin_seq: None,
            timers: Timers {
                timeout: config.retransmit_timeout,
                ..Timers::default()
            },
        }
    }

    /// A connection waiting for a SYN (passive open).
    pub fn listen(tuple: FourTuple, config: Config) -> Self {
        let mut connection = Connection::new(tuple, config);
        connection.current = State::Listen;
        connection
    }

    /// Open a connection to the remote of the tuple (active open).
    ///
    /// The returned signals contain the SYN.
    pub fn open(tuple: FourTuple, iss: SeqNumber, config: Config, time: Instant)
        -> (Self, Signals)
    {
        let mut connection = Connection::new(tuple, config);
        let mut signals = Signals::default();

        connection.send.initial_seq = iss;
        connection.send.unacked = iss;
        connection.send.next = iss + 1;
        connection.set_state(State::SynSent);

        let syn = connection.syn_segment(false);
        connection.transmit(syn, time, &mut signals);
        (connection, signals)
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.current
    }

    /// The configuration of this connection.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The earliest instant at which a timer of this connection fires.
    pub fn next_deadline(&self) -> Expiration {
        self.timers.retransmit.min(self.timers.time_wait)
    }

    /// The number of bytes that have been received but not yet read.
    pub fn readable(&self) -> usize {
        self.received.len()
    }

    /// Answer a segment for which no connection exists.
    ///
    /// Never answers a RST. The reply swaps the ports of the segment, it is sent to where the
    /// segment came from.
    pub fn reset_for(segment: &Segment) -> Option<Segment> {
        let repr = &segment.repr;
        if repr.flags.rst() {
            return None;
        }

        let (flags, seq_number, ack_number) = if repr.flags.ack() {
            (Flags::RST, repr.ack_number, SeqNumber(0))
        } else {
            (Flags::RST | Flags::ACK, SeqNumber(0), repr.seq_number + segment.sequence_len())
        };

        Some(Segment::new(TcpRepr {
            src_port: repr.dst_port,
            dst_port: repr.src_port,
            seq_number,
            ack_number,
            flags,
            window_len: 0,
            checksum: 0,
            urgent_at: 0,
            options: Options::EMPTY,
            payload_len: 0,
        }, Vec::new()))
    }

    /// Process an inbound segment.
    ///
    /// The generator is consulted for our initial sequence number when a listening connection
    /// receives a SYN.
    pub fn arrives(&mut self, segment: &Segment, isn: &IsnGenerator, time: Instant) -> Signals {
        let mut signals = Signals::default();
        match self.current {
            State::Closed => signals.segments.extend(Self::reset_for(segment)),
            State::Listen => self.arrives_listen(segment, isn, time, &mut signals),
            State::SynSent => self.arrives_syn_sent(segment, time, &mut signals),
            State::TimeWait => self.arrives_time_wait(segment, time, &mut signals),
            _ => self.arrives_synchronized(segment, time, &mut signals),
        }
        signals
    }

    /// Queue data for sending.
    pub fn send(&mut self, data: &[u8], time: Instant) -> Result<Signals, Error> {
        let mut signals = Signals::default();
        match self.current {
            State::Closed => return Err(Error::NoConnection),
            // The remote is not known yet.
            State::Listen => return Err(Error::Illegal),
            State::SynSent | State::SynReceived => {
                self.unsent.extend(data);
            },
            State::Established | State::CloseWait => {
                self.unsent.extend(data);
                self.flush(time, false, &mut signals);
            },
            _ => return Err(Error::ConnectionClosing),
        }
        Ok(signals)
    }

    /// Take at most `limit` bytes of received data.
    ///
    /// Returns an empty buffer if no data is available yet, or `ConnectionClosing` if none will
    /// arrive anymore.
    pub fn receive(&mut self, limit: usize) -> Result<Vec<u8>, Error> {
        if self.received.is_empty() {
            return match self.current {
                State::Closed => Err(Error::NoConnection),
                State::CloseWait | State::LastAck | State::Closing | State::TimeWait => {
                    Err(Error::ConnectionClosing)
                },
                _ => Ok(Vec::new()),
            };
        }

        let count = limit.min(self.received.len());
        let data = self.received.drain(..count).collect();
        self.update_receive_window();
        Ok(data)
    }

    /// Close our side of the connection.
    ///
    /// The FIN is sent after all data queued so far.
    pub fn close(&mut self, time: Instant) -> Result<Signals, Error> {
        let mut signals = Signals::default();
        match self.current {
            State::Closed => return Err(Error::NoConnection),
            State::Listen | State::SynSent => {
                self.set_state(State::Closed);
                self.destroy(Notification::Closed, &mut signals);
            },
            State::SynReceived | State::Established => {
                self.fin_queued = true;
                self.set_state(State::FinWait1);
                self.flush(time, false, &mut signals);
            },
            State::CloseWait => {
                self.fin_queued = true;
                self.set_state(State::LastAck);
                self.flush(time, false, &mut signals);
            },
            _ => return Err(Error::ConnectionClosing),
        }
        Ok(signals)
    }

    /// Abort the connection.
    ///
    /// Sends a RST once the connection reached at least SYN-RECEIVED.
    pub fn abort(&mut self) -> Signals {
        let mut signals = Signals::default();
        match self.current {
            State::SynReceived
            | State::Established
            | State::FinWait1
            | State::FinWait2
            | State::CloseWait
            | State::Closing
            | State::LastAck
            | State::TimeWait => {
                let rst = self.segment(Flags::RST, self.send.next, Vec::new());
                signals.segments.push(rst);
            },
            _ => {},
        }

        self.set_state(State::Closed);
        self.clear();
        signals.delete = true;
        signals
    }

    /// Fire all timers expired at `time`.
    pub fn poll(&mut self, time: Instant) -> Signals {
        let mut signals = Signals::default();

        if self.timers.time_wait.is_expired(time) {
            self.set_state(State::Closed);
            self.destroy(Notification::Closed, &mut signals);
            return signals;
        }

        if self.timers.retransmit.is_expired(time) {
            self.retransmit_timeout(time, &mut signals);
        }

        signals
    }

    fn arrives_listen(
        &mut self,
        segment: &Segment,
        isn: &IsnGenerator,
        time: Instant,
        signals: &mut Signals,
    ) {
        let flags = segment.repr.flags;
        if flags.rst() {
            return;
        }

        if flags.ack() {
            signals.segments.extend(Self::reset_for(segment));
            return;
        }

        if !flags.syn() {
            return;
        }

        let iss = isn.get_isn(self.tuple, time);
        self.recv.initial_seq = segment.repr.seq_number;
        self.recv.next = segment.repr.seq_number + 1;
        self.send.initial_seq = iss;
        self.send.unacked = iss;
        self.send.next = iss + 1;
        self.send.window = segment.repr.window_len;
        self.send.last_window_update_seq = segment.repr.seq_number;
        self.send.last_window_update_ack = iss;
        self.remote_mss = segment.repr.max_seg_size().unwrap_or(DEFAULT_REMOTE_MSS);
        self.set_state(State::SynReceived);

        let syn_ack = self.syn_segment(true);
        self.transmit(syn_ack, time, signals);
    }

    fn arrives_syn_sent(&mut self, segment: &Segment, time: Instant, signals: &mut Signals) {
        let repr = &segment.repr;
        let flags = repr.flags;

        if flags.ack() {
            // SND.UNA < SEG.ACK =< SND.NXT, and SND.UNA is still the ISS.
            if !repr.ack_number.is_between(self.send.unacked + 1, self.send.next + 1) {
                signals.segments.extend(Self::reset_for(segment));
                signals.dropped = Some(Error::SequenceOutOfWindow);
                return;
            }
        }

        if flags.rst() {
            if flags.ack() {
                log::warn!("{}: connection refused", self.tuple);
                self.set_state(State::Closed);
                self.destroy(Notification::Reset, signals);
            }
            return;
        }

        if !flags.syn() {
            return;
        }

        self.recv.initial_seq = repr.seq_number;
        self.recv.next = repr.seq_number + 1;
        self.remote_mss = repr.max_seg_size().unwrap_or(DEFAULT_REMOTE_MSS);

        if flags.ack() {
            self.acknowledge(repr.ack_number, time);
        }

        if self.send.unacked != self.send.initial_seq {
            self.update_send_window(repr);
            self.set_state(State::Established);
            signals.notification = Some(Notification::Established);
            self.flush(time, true, signals);
        } else {
            // Simultaneous open, our SYN is answered by a SYN.
            self.set_state(State::SynReceived);
            self.update_send_window(repr);
            self.retransmit.clear();
            let syn_ack = self.syn_segment(true);
            self.transmit(syn_ack, time, signals);
        }
    }

    fn arrives_time_wait(&mut self, segment: &Segment, time: Instant, signals: &mut Signals) {
        let flags = segment.repr.flags;
        if flags.rst() {
            if self.acceptable(segment) {
                log::warn!("{}: reset by remote in {}", self.tuple, self.current);
                self.set_state(State::Closed);
                self.destroy(Notification::Reset, signals);
            }
            return;
        }

        // Only a retransmission of the FIN we acknowledged, the remote did not get our ACK.
        if flags.fin() && segment.seq_end() == self.recv.next {
            signals.segments.push(self.ack_segment());
            self.timers.time_wait = Expiration::When(time + self.config.time_wait());
        }
    }

    fn arrives_synchronized(&mut self, segment: &Segment, time: Instant, signals: &mut Signals) {
        let repr = &segment.repr;
        let flags = repr.flags;

        if !self.acceptable(segment) {
            net_debug!("{}: unacceptable seq={} len={}, expected {}",
                self.tuple, repr.seq_number, segment.sequence_len(), self.recv.next);
            if !flags.rst() {
                signals.segments.push(self.ack_segment());
            }
            signals.dropped = Some(Error::SequenceOutOfWindow);
            return;
        }

        if flags.rst() {
            log::warn!("{}: reset by remote in {}", self.tuple, self.current);
            self.set_state(State::Closed);
            self.destroy(Notification::Reset, signals);
            return;
        }

        if flags.syn() {
            log::warn!("{}: SYN in window in {}, resetting", self.tuple, self.current);
            let rst = self.segment(Flags::RST, self.send.next, Vec::new());
            signals.segments.push(rst);
            self.set_state(State::Closed);
            self.destroy(Notification::Reset, signals);
            signals.dropped = Some(Error::ProtocolViolation);
            return;
        }

        if !flags.ack() {
            return;
        }

        let ack = repr.ack_number;
        if self.current == State::SynReceived {
            if ack.is_between(self.send.unacked + 1, self.send.next + 1) {
                self.set_state(State::Established);
                signals.notification = Some(Notification::Established);
            } else {
                signals.segments.extend(Self::reset_for(segment));
                return;
            }
        }

        if ack > self.send.next {
            // Acknowledges something we never sent.
            signals.segments.push(self.ack_segment());
            return;
        }

        if self.send.unacked <= ack {
            if self.send.last_window_update_seq < repr.seq_number
                || (self.send.last_window_update_seq == repr.seq_number
                    && self.send.last_window_update_ack <= ack)
            {
                self.update_send_window(repr);
            }
            if self.send.unacked != ack {
                self.acknowledge(ack, time);
            }
        }

        match self.current {
            State::FinWait1 if self.fin_acked() => self.set_state(State::FinWait2),
            State::Closing if self.fin_acked() => {
                self.enter_time_wait(time);
                return;
            },
            State::LastAck if self.fin_acked() => {
                self.set_state(State::Closed);
                self.destroy(Notification::Closed, signals);
                return;
            },
            _ => {},
        }

        let receiving = match self.current {
            State::Established | State::FinWait1 | State::FinWait2 => true,
            _ => false,
        };

        if flags.urg() && receiving {
            self.recv.urgent = repr.urgent_at;
        }

        let mut ack_needed = false;
        if !segment.payload.is_empty() && receiving {
            self.receive_text(segment);
            ack_needed = true;
        }

        if flags.fin() {
            ack_needed = true;
            if segment.seq_end() == self.recv.next + 1 {
                self.recv.next += 1;
                match self.current {
                    State::SynReceived | State::Established => self.set_state(State::CloseWait),
                    State::FinWait1 if self.fin_acked() => self.enter_time_wait(time),
                    State::FinWait1 => self.set_state(State::Closing),
                    State::FinWait2 => self.enter_time_wait(time),
                    _ => {},
                }
            }
        }

        self.flush(time, ack_needed, signals);
    }

    /// Check a segment against the receive window.
    ///
    /// ```text
    /// Segment Receive  Test
    /// Length  Window
    /// ------- -------  -------------------------------------------
    ///    0       0     SEG.SEQ = RCV.NXT
    ///    0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///   >0       0     not acceptable
    ///   >0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///               or RCV.NXT =< SEG.SEQ+SEG.LEN-1 < RCV.NXT+RCV.WND
    /// ```
    fn acceptable(&self, segment: &Segment) -> bool {
        let seq = segment.repr.seq_number;
        let len = segment.sequence_len();
        let start = self.recv.next;
        let end = self.recv.next + usize::from(self.recv.window);

        match (len, self.recv.window) {
            (0, 0) => seq == start,
            (0, _) => seq.is_between(start, end),
            (_, 0) => false,
            (_, _) => seq.is_between(start, end) || (seq + (len - 1)).is_between(start, end),
        }
    }

    /// Append the in-order part of the payload to the receive buffer.
    fn receive_text(&mut self, segment: &Segment) {
        let seq = segment.repr.seq_number;
        if seq > self.recv.next {
            net_debug!("{}: out of order segment at {}, expected {}",
                self.tuple, seq, self.recv.next);
            return;
        }

        let skip = self.recv.next.distance(seq) as usize;
        let fresh = match segment.payload.get(skip..) {
            Some(fresh) if !fresh.is_empty() => fresh,
            _ => return,
        };

        let room = usize::from(self.config.receive_buffer).saturating_sub(self.received.len());
        let count = fresh.len().min(room);
        self.received.extend(&fresh[..count]);
        self.recv.next += count;
        self.update_receive_window();
    }

    fn update_receive_window(&mut self) {
        let room = usize::from(self.config.receive_buffer).saturating_sub(self.received.len());
        self.recv.window = room as u16;
    }

    fn update_send_window(&mut self, repr: &TcpRepr) {
        self.send.window = repr.window_len;
        self.send.last_window_update_seq = repr.seq_number;
        self.send.last_window_update_ack = repr.ack_number;
    }

    /// Advance SND.UNA and drop everything that is fully acknowledged.
    fn acknowledge(&mut self, ack: SeqNumber, time: Instant) {
        self.send.unacked = ack;
        while let Some(front) = self.retransmit.front() {
            if front.seq_end() <= ack {
                self.retransmit.pop_front();
            } else {
                break;
            }
        }

        self.timers.retries = 0;
        self.timers.timeout = self.config.retransmit_timeout;
        self.timers.retransmit = if self.retransmit.is_empty() {
            Expiration::Never
        } else {
            Expiration::When(time + self.timers.timeout)
        };
    }

    fn fin_acked(&self) -> bool {
        match self.fin_seq {
            Some(fin) => fin + 1 == self.send.unacked,
            None => false,
        }
    }

    fn enter_time_wait(&mut self, time: Instant) {
        self.set_state(State::TimeWait);
        self.retransmit.clear();
        self.timers.retransmit = Expiration::Never;
        self.timers.time_wait = Expiration::When(time + self.config.time_wait());
    }

    fn retransmit_timeout(&mut self, time: Instant, signals: &mut Signals) {
        self.timers.retries += 1;
        if self.timers.retries > self.config.max_retransmits {
            log::warn!("{}: no answer after {} retransmissions", self.tuple, self.config.max_retransmits);
            self.set_state(State::Closed);
            self.destroy(Notification::TimedOut, signals);
            return;
        }

        let ack = self.recv.next;
        let window = self.recv.window;
        if let Some(front) = self.retransmit.front_mut() {
            if front.repr.flags.ack() {
                front.repr.ack_number = ack;
            }
            front.repr.window_len = window;
            net_debug!("{}: retransmitting {}", self.tuple, front);
            signals.segments.push(front.clone());
        }

        self.timers.timeout = (self.timers.timeout * 2).min(self.config.max_retransmit_timeout);
        self.timers.retransmit = Expiration::When(time + self.timers.timeout);
    }

    /// Send as much queued data as the window allows, then a pending FIN.
    ///
    /// A pure ACK is only sent when `ack_needed` and nothing else went out.
    fn flush(&mut self, time: Instant, mut ack_needed: bool, signals: &mut Signals) {
        let sending = match self.current {
            State::Established | State::CloseWait | State::FinWait1 | State::LastAck => true,
            _ => false,
        };

        while sending && self.fin_seq.is_none() && !self.unsent.is_empty() {
            let in_flight = self.send.next.distance(self.send.unacked) as usize;
            let room = usize::from(self.send.window).saturating_sub(in_flight);
            let mss = usize::from(self.remote_mss.min(self.config.max_seg_size));
            let size = match self.unsent.len().min(room).min(mss) {
                // Zero window probe.
                0 if in_flight == 0 => 1,
                0 => break,
                size => size,
            };

            let payload: Vec<u8> = self.unsent.drain(..size).collect();
            let flags = if self.unsent.is_empty() { Flags::ACK | Flags::PSH } else { Flags::ACK };
            let segment = self.segment(flags, self.send.next, payload);
            self.send.next += size;
            self.transmit(segment, time, signals);
            ack_needed = false;
        }

        if sending && self.fin_queued && self.unsent.is_empty() {
            let fin = self.segment(Flags::FIN | Flags::ACK, self.send.next, Vec::new());
            self.fin_queued = false;
            self.fin_seq = Some(self.send.next);
            self.send.next += 1;
            self.transmit(fin, time, signals);
            ack_needed = false;
        }

        if ack_needed {
            signals.segments.push(self.ack_segment());
        }
    }

    /// Send a segment, remembering it for retransmission if it occupies sequence space.
    fn transmit(&mut self, segment: Segment, time: Instant, signals: &mut Signals) {
        if segment.sequence_len() > 0 {
            self.retransmit.push_back(segment.clone());
            if self.timers.retransmit == Expiration::Never {
                self.timers.retransmit = Expiration::When(time + self.timers.timeout);
            }
        }
        signals.segments.push(segment);
    }

    fn segment(&self, flags: Flags, seq_number: SeqNumber, payload: Vec<u8>) -> Segment {
        let ack_number = if flags.ack() { self.recv.next } else { SeqNumber(0) };
        Segment::new(TcpRepr {
            src_port: self.tuple.local_port,
            dst_port: self.tuple.remote_port,
            seq_number,
            ack_number,
            flags,
            window_len: self.recv.window,
            checksum: 0,
            urgent_at: 0,
            options: Options::EMPTY,
            payload_len: 0,
        }, payload)
    }

    fn ack_segment(&self) -> Segment {
        self.segment(Flags::ACK, self.send.next, Vec::new())
    }

    fn syn_segment(&self, ack: bool) -> Segment {
        let flags = if ack { Flags::SYN | Flags::ACK } else { Flags::SYN };
        let mut segment = self.segment(flags, self.send.initial_seq, Vec::new());

        let mut mss = [0; 4];
        TcpOption::MaxSegmentSize(self.config.max_seg_size).emit(&mut mss);
        segment.repr.options = Options::new(&mss).unwrap_or(Options::EMPTY);
        segment
    }

    fn set_state(&mut self, state: State) {
        if state != self.current {
            log::debug!("{}: {} -> {}", self.tuple, self.current, state);
        }
        self.previous = self.current;
        self.current = state;
    }

    fn destroy(&mut self, notification: Notification, signals: &mut Signals) {
        self.clear();
        signals.notification = Some(notification);
        signals.delete = true;
    }

    fn clear(&mut self) {
        self.retransmit.clear();
        self.unsent.clear();
        self.fin_queued = false;
        self.timers.retransmit = Expiration::Never;
        self.timers.time_wait = Expiration::Never;
    }
}

impl State {
    /// Whether the handshake has completed at some point.
    pub fn synchronized(self) -> bool {
        match self {
            State::Closed | State::Listen | State::SynSent | State::SynReceived => false,
            _ => true,
        }
    }
}

impl Notification {
    /// The error an application operation on the connection would have observed.
    pub fn as_error(self) -> Option<Error> {
        match self {
            Notification::Reset => Some(Error::ConnectionReset),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::Closing => "CLOSING",
            State::TimeWait => "TIME-WAIT",
            State::CloseWait => "CLOSE-WAIT",
            State::LastAck => "LAST-ACK",
        };
        f.write_str(name)
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}
