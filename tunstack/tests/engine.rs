//! Drives the engine through an in-memory device with encoded datagrams.
use std::sync::Arc;

use tunstack::engine::Engine;
use tunstack::layer::tcp::{Config, Endpoint, FourTuple, Notification, Open, State};
use tunstack::nic::external::External;
use tunstack::time::Instant;
use tunstack::wire::{ipv4, Checksum, IpProtocol, Ipv4Address, Ipv4Repr, Options};
use tunstack::wire::{TcpFlags, TcpRepr, TcpSegment, TcpSeqNumber};

const LOCAL: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const REMOTE: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const LOCAL_PORT: u16 = 7;
const REMOTE_PORT: u16 = 50_000;

fn at(millis: i64) -> Instant {
    Instant::from_millis(millis)
}

fn listening() -> Engine<External> {
    let endpoint = Arc::new(Endpoint::new(Config::default()));
    let listener = FourTuple {
        local: LOCAL,
        remote: Ipv4Address::UNSPECIFIED,
        local_port: LOCAL_PORT,
        remote_port: 0,
    };
    endpoint.open(Open::Passive, listener, at(0)).unwrap();
    Engine::new(External::new(), endpoint)
}

fn datagram(flags: TcpFlags, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
    let segment = TcpSegment::new(TcpRepr {
        src_port: REMOTE_PORT,
        dst_port: LOCAL_PORT,
        seq_number: TcpSeqNumber(seq),
        ack_number: TcpSeqNumber(ack),
        flags,
        window_len: 8192,
        checksum: 0,
        urgent_at: 0,
        options: Options::EMPTY,
        payload_len: 0,
    }, payload.to_vec());
    let tcp = segment.serialize(REMOTE, LOCAL).unwrap();
    Ipv4Repr::new(REMOTE, LOCAL, IpProtocol::Tcp, tcp.len())
        .serialize(&tcp)
        .unwrap()
}

/// Decode everything the engine wrote, verifying all checksums.
fn sent(engine: &mut Engine<External>) -> Vec<(Ipv4Repr, TcpSegment)> {
    engine.device_mut()
        .drain_outbound()
        .iter()
        .map(|packet| {
            let (ip, payload) = ipv4::parse(packet, Checksum::Manual).unwrap();
            let segment = TcpSegment::parse(&ip, payload, Checksum::Manual).unwrap();
            (ip, segment)
        })
        .collect()
}

fn exchange(engine: &mut Engine<External>, packet: Vec<u8>, time: Instant) -> Vec<TcpSegment> {
    engine.device_mut().push_inbound(packet);
    assert!(engine.poll(time).unwrap());
    sent(engine).into_iter().map(|(_, segment)| segment).collect()
}

#[test]
fn handshake_echo_close() {
    let mut engine = listening();

    let replies = exchange(&mut engine, datagram(TcpFlags::SYN, 1000, 0, &[]), at(0));
    assert_eq!(replies.len(), 1);
    let syn_ack = &replies[0].repr;
    assert_eq!(syn_ack.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(syn_ack.ack_number, TcpSeqNumber(1001));
    assert_eq!((syn_ack.src_port, syn_ack.dst_port), (LOCAL_PORT, REMOTE_PORT));
    let iss = syn_ack.seq_number.0;
    let ours = |offset: u32| iss.wrapping_add(offset);

    let replies = exchange(&mut engine, datagram(TcpFlags::ACK, 1001, ours(1), &[]), at(1));
    assert!(replies.is_empty());

    let endpoint = Arc::clone(engine.endpoint());
    let event = endpoint.poll_notification().unwrap();
    assert_eq!(event.notification, Notification::Established);
    let key = event.key;

    let ping = datagram(TcpFlags::ACK | TcpFlags::PSH, 1001, ours(1), b"ping");
    let replies = exchange(&mut engine, ping, at(2));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].repr.ack_number, TcpSeqNumber(1005));

    let data = endpoint.receive(key, 100).unwrap();
    assert_eq!(data, b"ping");
    endpoint.send(key, &data, at(3)).unwrap();
    assert_eq!(engine.flush().unwrap(), 1);
    let echoed = sent(&mut engine);
    assert_eq!(echoed[0].1.payload, b"ping");
    assert_eq!(echoed[0].1.repr.seq_number, TcpSeqNumber(ours(1)));

    let fin = datagram(TcpFlags::FIN | TcpFlags::ACK, 1005, ours(5), &[]);
    let replies = exchange(&mut engine, fin, at(4));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].repr.ack_number, TcpSeqNumber(1006));
    assert_eq!(endpoint.status(key), Some(State::CloseWait));

    endpoint.close(key, at(5)).unwrap();
    engine.flush().unwrap();
    let fin = sent(&mut engine);
    assert!(fin[0].1.repr.flags.fin());

    let replies = exchange(&mut engine, datagram(TcpFlags::ACK, 1006, ours(6), &[]), at(6));
    assert!(replies.is_empty());
    assert_eq!(endpoint.status(key), None);
    assert_eq!(endpoint.poll_notification().unwrap().notification, Notification::Closed);
}

#[test]
fn outbound_headers() {
    let mut engine = listening();
    engine.device_mut().push_inbound(datagram(TcpFlags::SYN, 1, 0, &[]));
    engine.device_mut().push_inbound(datagram(TcpFlags::ACK, 77, 88, &[]));
    engine.poll(at(0)).unwrap();
    engine.poll(at(0)).unwrap();

    let packets = sent(&mut engine);
    assert_eq!(packets.len(), 2);
    for (ip, _) in &packets {
        assert_eq!((ip.src_addr, ip.dst_addr), (LOCAL, REMOTE));
        assert_eq!(ip.hop_limit, 64);
        assert_eq!(ip.flags & Ipv4Repr::DONT_FRAG, Ipv4Repr::DONT_FRAG);
        assert!(!ip.is_fragment());
    }
    assert_eq!(packets[1].0.ident, packets[0].0.ident.wrapping_add(1));
}

#[test]
fn refused_without_listener() {
    let mut engine = Engine::new(External::new(), Arc::new(Endpoint::new(Config::default())));

    let replies = exchange(&mut engine, datagram(TcpFlags::SYN, 500, 0, &[]), at(0));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].repr.flags, TcpFlags::RST | TcpFlags::ACK);
    assert_eq!(replies[0].repr.ack_number, TcpSeqNumber(501));
}

#[test]
fn bad_checksum_dropped() {
    let mut corrupt = datagram(TcpFlags::SYN, 1000, 0, &[]);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xff;

    let mut engine = listening();
    let replies = exchange(&mut engine, corrupt.clone(), at(0));
    assert!(replies.is_empty());
    assert_eq!(engine.endpoint().len(), 1);

    // The same packet passes when checksums are not verified.
    let mut engine = listening().with_checksum(Checksum::Ignored);
    let replies = exchange(&mut engine, corrupt, at(0));
    assert_eq!(replies.len(), 1);
}

#[test]
fn retransmits_through_device() {
    let mut engine = listening();
    exchange(&mut engine, datagram(TcpFlags::SYN, 1000, 0, &[]), at(0));

    assert!(!engine.poll(at(500)).unwrap());
    assert!(sent(&mut engine).is_empty());

    assert!(!engine.poll(at(1000)).unwrap());
    let again = sent(&mut engine);
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].1.repr.flags, TcpFlags::SYN | TcpFlags::ACK);
}
