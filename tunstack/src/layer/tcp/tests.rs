//! Tcp layer tests.
//!
//! Each test drives the endpoint with hand-made inbound segments, as if they had been decoded by
//! the engine, and inspects the segments it queues in return. Some tests connect two endpoints
//! directly. See the integration tests for the full path through a device.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::layer::Error;
use crate::time::{Duration, Instant};
use crate::wire::{IpProtocol, Ipv4Address, Ipv4Repr, Options};
use crate::wire::{TcpFlags as Flags, TcpRepr, TcpSegment, TcpSeqNumber as SeqNumber};
use super::*;

const LOCAL: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const REMOTE: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

const TUPLE: FourTuple = FourTuple {
    local: LOCAL,
    remote: REMOTE,
    local_port: 80,
    remote_port: 4000,
};

const IRS: u32 = 100;

fn isn() -> IsnGenerator {
    IsnGenerator::from_key(0x0123_4567, 0x89ab_cdef)
}

fn endpoint() -> Endpoint {
    Endpoint::with_isn(Config::default(), isn())
}

fn at(millis: i64) -> Instant {
    Instant::from_millis(millis)
}

fn deliver(
    endpoint: &Endpoint,
    flags: Flags,
    seq: u32,
    ack: SeqNumber,
    payload: &[u8],
    time: Instant,
) -> Result<(), Error> {
    let segment = TcpSegment::new(TcpRepr {
        src_port: TUPLE.remote_port,
        dst_port: TUPLE.local_port,
        seq_number: SeqNumber(seq),
        ack_number: ack,
        flags,
        window_len: 1024,
        checksum: 0,
        urgent_at: 0,
        options: Options::EMPTY,
        payload_len: 0,
    }, payload.to_vec());
    let ip = Ipv4Repr::new(REMOTE, LOCAL, IpProtocol::Tcp, segment.repr.buffer_len());
    endpoint.process(&ip, &segment, time)
}

fn outbound(endpoint: &Endpoint) -> Vec<TcpSegment> {
    endpoint.drain_outbound()
        .into_iter()
        .map(|transmit| {
            assert_eq!(transmit.tuple, TUPLE);
            transmit.segment
        })
        .collect()
}

fn single(endpoint: &Endpoint) -> TcpRepr {
    let mut segments = outbound(endpoint);
    assert_eq!(segments.len(), 1, "expected exactly one segment: {:?}", segments);
    segments.remove(0).repr
}

/// Run a passive handshake with the remote starting at `irs`, returning our ISS.
fn establish(endpoint: &Endpoint, irs: u32, time: Instant) -> (SlotKey, SeqNumber) {
    endpoint.open(Open::Passive, TUPLE, time).unwrap();
    deliver(endpoint, Flags::SYN, irs, SeqNumber(0), &[], time).unwrap();
    let syn_ack = single(endpoint);
    let iss = syn_ack.seq_number;

    deliver(endpoint, Flags::ACK, irs + 1, iss + 1, &[], time).unwrap();
    assert!(outbound(endpoint).is_empty());

    let event = endpoint.poll_notification().unwrap();
    assert_eq!(event.notification, Notification::Established);
    assert_eq!(event.tuple, TUPLE);
    (event.key, iss)
}

#[test]
fn passive_handshake() {
    let endpoint = endpoint();
    let listener = endpoint.open(Open::Passive, TUPLE, at(0)).unwrap();
    assert_eq!(endpoint.status(listener), Some(State::Listen));

    deliver(&endpoint, Flags::SYN, IRS, SeqNumber(0), &[], at(0)).unwrap();

    let syn_ack = single(&endpoint);
    assert_eq!(syn_ack.flags, Flags::SYN | Flags::ACK);
    assert_eq!(syn_ack.ack_number, SeqNumber(IRS + 1));
    assert_eq!(syn_ack.seq_number, isn().get_isn(TUPLE, at(0)));
    assert_eq!(syn_ack.max_seg_size(), Some(Config::default().max_seg_size));
    assert_eq!((syn_ack.src_port, syn_ack.dst_port), (80, 4000));

    let key = endpoint.lookup(&TUPLE).unwrap();
    assert_ne!(key, listener);
    assert_eq!(endpoint.status(key), Some(State::SynReceived));
    // The listener keeps listening.
    assert_eq!(endpoint.status(listener), Some(State::Listen));
    assert_eq!(endpoint.len(), 2);

    let iss = syn_ack.seq_number;
    deliver(&endpoint, Flags::ACK, IRS + 1, iss + 1, &[], at(10)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), Some(State::Established));

    let event = endpoint.poll_notification().unwrap();
    assert_eq!(event.key, key);
    assert_eq!(event.notification, Notification::Established);
    assert!(endpoint.poll_notification().is_none());
}

#[test]
fn active_open() {
    let endpoint = endpoint();
    let key = endpoint.open(Open::Active, TUPLE, at(0)).unwrap();

    let syn = single(&endpoint);
    let iss = isn().get_isn(TUPLE, at(0));
    assert_eq!(syn.flags, Flags::SYN);
    assert_eq!(syn.seq_number, iss);
    assert!(syn.max_seg_size().is_some());
    assert_eq!(endpoint.status(key), Some(State::SynSent));

    deliver(&endpoint, Flags::SYN | Flags::ACK, 300, iss + 1, &[], at(5)).unwrap();
    assert_eq!(endpoint.status(key), Some(State::Established));

    let ack = single(&endpoint);
    assert_eq!(ack.flags, Flags::ACK);
    assert_eq!(ack.seq_number, iss + 1);
    assert_eq!(ack.ack_number, SeqNumber(301));

    let event = endpoint.poll_notification().unwrap();
    assert_eq!((event.key, event.notification), (key, Notification::Established));
}

#[test]
fn active_open_bad_ack() {
    let endpoint = endpoint();
    let key = endpoint.open(Open::Active, TUPLE, at(0)).unwrap();
    let iss = single(&endpoint).seq_number;

    let result = deliver(&endpoint, Flags::SYN | Flags::ACK, 300, iss + 5, &[], at(5));
    assert_eq!(result, Err(Error::SequenceOutOfWindow));

    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, iss + 5);
    assert_eq!(endpoint.status(key), Some(State::SynSent));
}

#[test]
fn active_open_refused() {
    let endpoint = endpoint();
    let key = endpoint.open(Open::Active, TUPLE, at(0)).unwrap();
    let iss = single(&endpoint).seq_number;

    deliver(&endpoint, Flags::RST | Flags::ACK, 0, iss + 1, &[], at(5)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Reset);
}

#[test]
fn simultaneous_open() {
    let endpoint = endpoint();
    let key = endpoint.open(Open::Active, TUPLE, at(0)).unwrap();
    let iss = single(&endpoint).seq_number;

    deliver(&endpoint, Flags::SYN, 700, SeqNumber(0), &[], at(5)).unwrap();
    assert_eq!(endpoint.status(key), Some(State::SynReceived));

    let syn_ack = single(&endpoint);
    assert_eq!(syn_ack.flags, Flags::SYN | Flags::ACK);
    assert_eq!(syn_ack.seq_number, iss);
    assert_eq!(syn_ack.ack_number, SeqNumber(701));

    deliver(&endpoint, Flags::ACK, 701, iss + 1, &[], at(7)).unwrap();
    assert_eq!(endpoint.status(key), Some(State::Established));
}

#[test]
fn out_of_window() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, 499, at(0));

    endpoint.checkout(key).unwrap().recv.window = 100;

    let result = deliver(&endpoint, Flags::ACK, 700, iss + 1, b"late", at(10));
    assert_eq!(result, Err(Error::SequenceOutOfWindow));

    let ack = single(&endpoint);
    assert_eq!(ack.flags, Flags::ACK);
    assert_eq!(ack.ack_number, SeqNumber(500));
    assert_eq!(ack.seq_number, iss + 1);
    assert_eq!(endpoint.status(key), Some(State::Established));
}

#[test]
fn reset_in_syn_received() {
    let endpoint = endpoint();
    let listener = endpoint.open(Open::Passive, TUPLE, at(0)).unwrap();
    deliver(&endpoint, Flags::SYN, IRS, SeqNumber(0), &[], at(0)).unwrap();
    let _ = outbound(&endpoint);
    assert!(endpoint.lookup(&TUPLE).is_some());

    deliver(&endpoint, Flags::RST, IRS + 1, SeqNumber(0), &[], at(1)).unwrap();

    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.lookup(&TUPLE), None);
    let reset = endpoint.poll_notification().unwrap().notification;
    assert_eq!(reset, Notification::Reset);
    assert_eq!(reset.as_error(), Some(Error::ConnectionReset));
    assert_eq!(endpoint.status(listener), Some(State::Listen));
}

#[test]
fn reset_outside_window_ignored() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));
    endpoint.checkout(key).unwrap().recv.window = 100;

    let result = deliver(&endpoint, Flags::RST, IRS + 1000, iss + 1, &[], at(1));
    assert_eq!(result, Err(Error::SequenceOutOfWindow));
    // Never answer a RST.
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), Some(State::Established));
}

#[test]
fn data_transfer() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    deliver(&endpoint, Flags::ACK | Flags::PSH, IRS + 1, iss + 1, b"hello", at(1)).unwrap();
    let ack = single(&endpoint);
    assert_eq!(ack.ack_number, SeqNumber(IRS + 6));
    assert_eq!(ack.window_len, Config::default().receive_buffer - 5);

    assert_eq!(endpoint.receive(key, 1024).unwrap(), b"hello");
    assert_eq!(endpoint.receive(key, 1024).unwrap(), b"");

    endpoint.send(key, b"world", at(2)).unwrap();
    let mut segments = outbound(&endpoint);
    assert_eq!(segments.len(), 1);
    let data = segments.remove(0);
    assert_eq!(data.repr.flags, Flags::ACK | Flags::PSH);
    assert_eq!(data.repr.seq_number, iss + 1);
    assert_eq!(data.repr.ack_number, SeqNumber(IRS + 6));
    assert_eq!(data.payload, b"world");

    deliver(&endpoint, Flags::ACK, IRS + 6, iss + 6, &[], at(3)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.checkout(key).unwrap().send.unacked, iss + 6);
}

#[test]
fn duplicate_data_reacknowledged() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    deliver(&endpoint, Flags::ACK, IRS + 1, iss + 1, b"abc", at(1)).unwrap();
    let _ = outbound(&endpoint);
    // Retransmission overlapping with data we already have.
    deliver(&endpoint, Flags::ACK, IRS + 1, iss + 1, b"abcdef", at(2)).unwrap();
    assert_eq!(single(&endpoint).ack_number, SeqNumber(IRS + 7));
    assert_eq!(endpoint.receive(key, 100).unwrap(), b"abcdef");
}

#[test]
fn out_of_order_dropped() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    deliver(&endpoint, Flags::ACK, IRS + 11, iss + 1, b"later", at(1)).unwrap();
    assert_eq!(single(&endpoint).ack_number, SeqNumber(IRS + 1));
    assert_eq!(endpoint.receive(key, 100).unwrap(), b"");
}

#[test]
fn segmentation_by_mss() {
    let config = Config { max_seg_size: 100, ..Config::default() };
    let endpoint = Endpoint::with_isn(config, isn());
    let (key, iss) = establish(&endpoint, IRS, at(0));

    endpoint.send(key, &[0xaa; 250], at(1)).unwrap();
    let segments = outbound(&endpoint);
    let sizes: Vec<_> = segments.iter().map(|seg| seg.payload.len()).collect();
    assert_eq!(sizes, [100, 100, 50]);
    assert_eq!(segments[1].repr.seq_number, iss + 101);
    assert!(!segments[0].repr.flags.psh());
    assert!(segments[2].repr.flags.psh());
}

#[test]
fn send_window_limits_data() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    // The remote announced a window of 1024.
    endpoint.send(key, &[0; 2000], at(1)).unwrap();
    let sent: usize = outbound(&endpoint).iter().map(|seg| seg.payload.len()).sum();
    assert_eq!(sent, 1024);

    deliver(&endpoint, Flags::ACK, IRS + 1, iss + 1025, &[], at(2)).unwrap();
    let sent: usize = outbound(&endpoint).iter().map(|seg| seg.payload.len()).sum();
    assert_eq!(sent, 2000 - 1024);
}

#[test]
fn passive_close() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 1, &[], at(1)).unwrap();
    let ack = single(&endpoint);
    assert_eq!(ack.flags, Flags::ACK);
    assert_eq!(ack.ack_number, SeqNumber(IRS + 2));
    assert_eq!(endpoint.status(key), Some(State::CloseWait));
    assert_eq!(endpoint.receive(key, 10), Err(Error::ConnectionClosing));

    endpoint.close(key, at(2)).unwrap();
    let fin = single(&endpoint);
    assert_eq!(fin.flags, Flags::FIN | Flags::ACK);
    assert_eq!(fin.seq_number, iss + 1);
    assert_eq!(endpoint.status(key), Some(State::LastAck));

    deliver(&endpoint, Flags::ACK, IRS + 2, iss + 2, &[], at(3)).unwrap();
    assert_eq!(endpoint.lookup(&TUPLE), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Closed);
}

#[test]
fn fin_follows_queued_data() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    endpoint.send(key, b"bye", at(1)).unwrap();
    endpoint.close(key, at(1)).unwrap();
    let segments = outbound(&endpoint);
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].payload, b"bye");
    assert!(segments[1].repr.flags.fin());
    assert_eq!(segments[1].repr.seq_number, iss + 4);

    assert_eq!(endpoint.send(key, b"more", at(2)), Err(Error::ConnectionClosing));
}

#[test]
fn active_close_time_wait() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));
    let time_wait = Config::default().time_wait();

    endpoint.close(key, at(0)).unwrap();
    assert_eq!(single(&endpoint).seq_number, iss + 1);
    assert_eq!(endpoint.status(key), Some(State::FinWait1));

    deliver(&endpoint, Flags::ACK, IRS + 1, iss + 2, &[], at(100)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), Some(State::FinWait2));

    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 2, &[], at(1_000)).unwrap();
    assert_eq!(single(&endpoint).ack_number, SeqNumber(IRS + 2));
    assert_eq!(endpoint.status(key), Some(State::TimeWait));

    // The remote missed our ACK and retransmits its FIN, which restarts the timer.
    let again = at(30_000);
    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 2, &[], again).unwrap();
    assert_eq!(single(&endpoint).ack_number, SeqNumber(IRS + 2));

    endpoint.poll_timers(at(1_000) + time_wait);
    assert_eq!(endpoint.status(key), Some(State::TimeWait));
    assert!(endpoint.poll_notification().is_none());

    endpoint.poll_timers(again + time_wait);
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Closed);
}

/// Close actively until TIME-WAIT, returning at 1000 ms.
fn time_wait(endpoint: &Endpoint) -> (SlotKey, SeqNumber) {
    let (key, iss) = establish(endpoint, IRS, at(0));
    endpoint.close(key, at(0)).unwrap();
    deliver(endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 2, &[], at(1_000)).unwrap();
    let _ = outbound(endpoint);
    assert_eq!(endpoint.status(key), Some(State::TimeWait));
    (key, iss)
}

#[test]
fn reset_in_time_wait() {
    let endpoint = endpoint();
    let (key, iss) = time_wait(&endpoint);

    deliver(&endpoint, Flags::RST, IRS + 2, iss + 2, &[], at(2_000)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), None);

    let event = endpoint.poll_notification().unwrap();
    assert_eq!(event.notification, Notification::Reset);
    assert_eq!(event.notification.as_error(), Some(Error::ConnectionReset));
}

#[test]
fn stray_fin_in_time_wait() {
    let endpoint = endpoint();
    let (key, iss) = time_wait(&endpoint);

    // Not a retransmission of the FIN we acknowledged.
    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 500, iss + 2, &[], at(2_000)).unwrap();
    assert!(outbound(&endpoint).is_empty());

    endpoint.poll_timers(at(1_000) + Config::default().time_wait());
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Closed);
}

#[test]
fn simultaneous_close() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    endpoint.close(key, at(0)).unwrap();
    let _ = outbound(&endpoint);

    // The remote closes before it saw our FIN.
    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 1, &[], at(1)).unwrap();
    assert_eq!(single(&endpoint).ack_number, SeqNumber(IRS + 2));
    assert_eq!(endpoint.status(key), Some(State::Closing));

    deliver(&endpoint, Flags::ACK, IRS + 2, iss + 2, &[], at(2)).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), Some(State::TimeWait));
}

/// Hand everything `from` queued to `to`, returning the number of segments.
fn carry(from: &Endpoint, to: &Endpoint, time: Instant) -> usize {
    let transmits = from.drain_outbound();
    let count = transmits.len();
    for Transmit { tuple, segment } in transmits {
        let ip = Ipv4Repr::new(tuple.local, tuple.remote, IpProtocol::Tcp, segment.repr.buffer_len());
        to.process(&ip, &segment, time).unwrap();
    }
    count
}

#[test]
fn simultaneous_close_between_endpoints() {
    let server = endpoint();
    let client = endpoint();
    let mirrored = FourTuple {
        local: TUPLE.remote,
        remote: TUPLE.local,
        local_port: TUPLE.remote_port,
        remote_port: TUPLE.local_port,
    };

    server.open(Open::Passive, TUPLE, at(0)).unwrap();
    let client_key = client.open(Open::Active, mirrored, at(0)).unwrap();
    assert_eq!(carry(&client, &server, at(1)), 1);
    assert_eq!(carry(&server, &client, at(2)), 1);
    assert_eq!(carry(&client, &server, at(3)), 1);

    let server_key = server.poll_notification().unwrap().key;
    assert_eq!(client.poll_notification().unwrap().notification, Notification::Established);
    assert_eq!(server.status(server_key), Some(State::Established));
    assert_eq!(client.status(client_key), Some(State::Established));

    // Both FINs are in flight before either arrives.
    server.close(server_key, at(10)).unwrap();
    client.close(client_key, at(10)).unwrap();
    let server_fin = server.drain_outbound();
    let client_fin = client.drain_outbound();
    assert_eq!((server_fin.len(), client_fin.len()), (1, 1));
    for (to, transmits) in vec![(&client, server_fin), (&server, client_fin)] {
        for Transmit { tuple, segment } in transmits {
            assert!(segment.repr.flags.fin());
            let ip = Ipv4Repr::new(tuple.local, tuple.remote, IpProtocol::Tcp, segment.repr.buffer_len());
            to.process(&ip, &segment, at(11)).unwrap();
        }
    }
    assert_eq!(server.status(server_key), Some(State::Closing));
    assert_eq!(client.status(client_key), Some(State::Closing));

    assert_eq!(carry(&server, &client, at(12)), 1);
    assert_eq!(carry(&client, &server, at(12)), 1);
    assert_eq!(server.status(server_key), Some(State::TimeWait));
    assert_eq!(client.status(client_key), Some(State::TimeWait));
    assert!(server.drain_outbound().is_empty());
    assert!(client.drain_outbound().is_empty());
}

#[test]
fn syn_in_window_resets() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    let result = deliver(&endpoint, Flags::SYN, IRS + 1, SeqNumber(0), &[], at(1));
    assert_eq!(result, Err(Error::ProtocolViolation));

    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, iss + 1);
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Reset);
}

#[test]
fn abort() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    endpoint.abort(key).unwrap();
    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, iss + 1);
    assert_eq!(endpoint.status(key), None);
    assert!(endpoint.poll_notification().is_none());
    assert_eq!(endpoint.abort(key), Err(Error::NoConnection));

    // Aborting a listener is silent.
    let listener = endpoint.lookup(&TUPLE.listener()).unwrap();
    endpoint.abort(listener).unwrap();
    assert!(outbound(&endpoint).is_empty());
    assert!(endpoint.is_empty());
}

#[test]
fn abort_in_last_ack() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 1, &[], at(1)).unwrap();
    let _ = outbound(&endpoint);
    endpoint.close(key, at(2)).unwrap();
    let _ = outbound(&endpoint);
    assert_eq!(endpoint.status(key), Some(State::LastAck));

    endpoint.abort(key).unwrap();
    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, iss + 2);
    assert_eq!(endpoint.status(key), None);
}

#[test]
fn abort_in_closing() {
    let endpoint = endpoint();
    let (key, iss) = establish(&endpoint, IRS, at(0));

    endpoint.close(key, at(0)).unwrap();
    let _ = outbound(&endpoint);
    deliver(&endpoint, Flags::FIN | Flags::ACK, IRS + 1, iss + 1, &[], at(1)).unwrap();
    let _ = outbound(&endpoint);
    assert_eq!(endpoint.status(key), Some(State::Closing));

    endpoint.abort(key).unwrap();
    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, iss + 2);
    assert_eq!(endpoint.status(key), None);
    assert!(endpoint.poll_notification().is_none());
}

#[test]
fn retransmission_backoff() {
    let endpoint = endpoint();
    let key = endpoint.open(Open::Active, TUPLE, at(0)).unwrap();
    let syn = single(&endpoint);

    endpoint.poll_timers(at(999));
    assert!(outbound(&endpoint).is_empty());

    // Default timeout of one second, doubling each time.
    for &deadline in &[1_000, 3_000, 7_000, 15_000, 31_000] {
        endpoint.poll_timers(at(deadline - 1));
        assert!(outbound(&endpoint).is_empty());
        endpoint.poll_timers(at(deadline));
        assert_eq!(single(&endpoint), syn);
    }

    endpoint.poll_timers(at(63_000));
    assert!(outbound(&endpoint).is_empty());
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::TimedOut);
}

#[test]
fn retransmission_capped() {
    let config = Config {
        max_retransmit_timeout: Duration::from_secs(2),
        max_retransmits: 10,
        ..Config::default()
    };
    let endpoint = Endpoint::with_isn(config, isn());
    endpoint.open(Open::Active, TUPLE, at(0)).unwrap();
    let _ = outbound(&endpoint);

    for &deadline in &[1_000, 3_000, 5_000, 7_000] {
        endpoint.poll_timers(at(deadline));
        assert_eq!(outbound(&endpoint).len(), 1);
    }
}

#[test]
fn illegal_calls() {
    let endpoint = endpoint();
    let listener = endpoint.open(Open::Passive, TUPLE, at(0)).unwrap();
    assert_eq!(endpoint.send(listener, b"data", at(0)), Err(Error::Illegal));
    assert_eq!(
        endpoint.open(Open::Passive, TUPLE, at(0)),
        Err(Error::ConnectionExists));

    endpoint.close(listener, at(0)).unwrap();
    assert_eq!(endpoint.send(listener, b"data", at(0)), Err(Error::NoConnection));
    assert_eq!(endpoint.status(listener), None);
}

#[test]
fn no_listener() {
    let endpoint = endpoint();
    let result = deliver(&endpoint, Flags::SYN, IRS, SeqNumber(0), b"x", at(0));
    assert_eq!(result, Err(Error::NoConnection));

    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST | Flags::ACK);
    assert_eq!(rst.seq_number, SeqNumber(0));
    assert_eq!(rst.ack_number, SeqNumber(IRS + 2));

    // A RST for nothing is silently dropped.
    let result = deliver(&endpoint, Flags::RST, IRS, SeqNumber(0), &[], at(0));
    assert_eq!(result, Err(Error::NoConnection));
    assert!(outbound(&endpoint).is_empty());
}

#[test]
fn ack_to_listener_resets() {
    let endpoint = endpoint();
    endpoint.open(Open::Passive, TUPLE, at(0)).unwrap();

    deliver(&endpoint, Flags::ACK, IRS, SeqNumber(555), &[], at(0)).unwrap();
    let rst = single(&endpoint);
    assert_eq!(rst.flags, Flags::RST);
    assert_eq!(rst.seq_number, SeqNumber(555));
    assert_eq!(endpoint.lookup(&TUPLE), None);
}

#[test]
fn checkout_is_exclusive() {
    let endpoint = Arc::new(endpoint());
    let (key, _) = establish(&endpoint, IRS, at(0));
    let done = Arc::new(AtomicBool::new(false));

    let checkout = endpoint.checkout(key).unwrap();
    let worker = {
        let endpoint = Arc::clone(&endpoint);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            endpoint.send(key, b"x", at(1)).unwrap();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(std::time::Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));
    assert_eq!(checkout.state(), State::Established);
    drop(checkout);

    worker.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(outbound(&endpoint).len(), 1);
}

#[test]
fn remove_then_recreate() {
    let endpoint = endpoint();
    let (key, _) = establish(&endpoint, IRS, at(0));

    let removed = endpoint.remove(&TUPLE).unwrap();
    assert_eq!(removed.state(), State::Established);
    assert_eq!(endpoint.status(key), None);

    let again = endpoint.create(Connection::listen(TUPLE, Config::default())).unwrap();
    assert_ne!(again, key);
    assert_eq!(
        endpoint.create(Connection::listen(TUPLE, Config::default())),
        Err(Error::ConnectionExists));
}
