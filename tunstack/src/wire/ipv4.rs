use core::fmt;
use core::str::FromStr;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Options, Result};
use super::ip::checksum;
use super::field::Field;

pub use super::IpProtocol as Protocol;

/// The time to live used for outgoing datagrams.
pub const DEFAULT_HOP_LIMIT: u8 = 64;

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the address into a `u32` in network endian byte order.
    pub fn to_network_integer(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Query whether the address falls into the "unspecified" range.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }
}

impl From<::std::net::Ipv4Addr> for Address {
    fn from(x: ::std::net::Ipv4Addr) -> Address {
        Address(x.octets())
    }
}

impl From<Address> for ::std::net::Ipv4Addr {
    fn from(Address(x): Address) -> ::std::net::Ipv4Addr {
        x.into()
    }
}

impl FromStr for Address {
    type Err = ::std::net::AddrParseError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        ::std::net::Ipv4Addr::from_str(s).map(Address::from)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

byte_wrapper! {
    /// A byte sequence representing an IPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
}

/// The length of a header without options.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

/// The largest total length representable in the header.
pub const MAX_TOTAL_LEN: usize = 0xffff;

impl ipv4 {
    /// Imbue a raw octet buffer with IPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &ipv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with IPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&ipv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// View the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::MalformedHeader)` if the buffer is shorter than a minimal header, the
    /// header length field is below its minimum, or the lengths are inconsistent with each other
    /// or with the buffer. Returns `Err(Error::UnsupportedVersion)` for anything but version 4.
    ///
    /// Bytes beyond the total length are permitted, they are ignored as padding.
    ///
    /// The result of this check is invalidated by calling [set_header_len]
    /// and [set_total_len].
    ///
    /// [set_header_len]: #method.set_header_len
    /// [set_total_len]: #method.set_total_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::MalformedHeader)
        } else if self.version() != 4 {
            Err(Error::UnsupportedVersion)
        } else if usize::from(self.header_len()) < HEADER_LEN {
            Err(Error::MalformedHeader)
        } else if len < usize::from(self.header_len()) {
            Err(Error::MalformedHeader)
        } else if u16::from(self.header_len()) > self.total_len() {
            Err(Error::MalformedHeader)
        } else if len < usize::from(self.total_len()) {
            Err(Error::MalformedHeader)
        } else {
            Ok(())
        }
    }

    /// Return the version field.
    #[inline]
    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        (self.0[field::VER_IHL] & 0x0f) * 4
    }

    /// Return the type of service byte (DSCP and ECN).
    #[inline]
    pub fn tos(&self) -> u8 {
        self.0[field::DSCP_ECN]
    }

    /// Return the total length field.
    #[inline]
    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the fragment identification field.
    #[inline]
    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::IDENT])
    }

    /// Return the three flag bits, including the reserved one.
    #[inline]
    pub fn flags(&self) -> u8 {
        (NetworkEndian::read_u16(&self.0[field::FLG_OFF]) >> 13) as u8
    }

    /// Return the "don't fragment" flag.
    #[inline]
    pub fn dont_frag(&self) -> bool {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x4000 != 0
    }

    /// Return the "more fragments" flag.
    #[inline]
    pub fn more_frags(&self) -> bool {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x2000 != 0
    }

    /// Return the fragment offset, in units of eight octets.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x1fff
    }

    /// Return the time to live field.
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.0[field::TTL]
    }

    /// Return the protocol field.
    #[inline]
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.0[field::PROTOCOL])
    }

    /// Return the header checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    /// Return the destination address field.
    #[inline]
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Return the options, all bytes between the fixed header and the payload.
    pub fn options_slice(&self) -> &[u8] {
        &self.0[HEADER_LEN..usize::from(self.header_len())]
    }

    /// Validate the header checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0[..usize::from(self.header_len())]) == !0
    }

    /// Set the version field.
    #[inline]
    pub fn set_version(&mut self, value: u8) {
        self.0[field::VER_IHL] = (self.0[field::VER_IHL] & !0xf0) | (value << 4);
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        self.0[field::VER_IHL] = (self.0[field::VER_IHL] & !0x0f) | ((value / 4) & 0x0f);
    }

    /// Set the type of service byte.
    #[inline]
    pub fn set_tos(&mut self, value: u8) {
        self.0[field::DSCP_ECN] = value
    }

    /// Set the total length field.
    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    /// Set the fragment identification field.
    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::IDENT], value)
    }

    /// Set the three flag bits.
    #[inline]
    pub fn set_flags(&mut self, value: u8) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLG_OFF]);
        let raw = (raw & 0x1fff) | (u16::from(value & 0x7) << 13);
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], raw);
    }

    /// Set the fragment offset, in units of eight octets.
    #[inline]
    pub fn set_frag_offset(&mut self, value: u16) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLG_OFF]);
        let raw = (raw & 0xe000) | (value & 0x1fff);
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], raw);
    }

    /// Set the time to live field.
    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::TTL] = value
    }

    /// Set the protocol field.
    #[inline]
    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into()
    }

    /// Set the header checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the source address field.
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Set the destination address field.
    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Return the options as a mutable byte slice.
    pub fn options_mut_slice(&mut self) -> &mut [u8] {
        let end = usize::from(self.header_len());
        &mut self.0[HEADER_LEN..end]
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            !checksum::data(&self.0[..usize::from(self.header_len())])
        };
        self.set_checksum(checksum)
    }

    /// Compute the range of the payload without accessing it.
    ///
    /// Contrary to `payload_slice`, this only requires the packet to have a valid header but need
    /// not have a consistent length for the payload itself.
    pub fn payload_range(&self) -> Field {
        let header_end = usize::from(self.header_len());
        let total_len = usize::from(self.total_len());
        header_end..total_len
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        let range = self.payload_range();
        &self.0[range]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let range = self.payload_range();
        &mut self.0[range]
    }
}

impl AsRef<[u8]> for ipv4 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Internet Protocol version 4 packet header.
///
/// Keeps every header field, so that emitting a parsed representation reproduces the original
/// header. Only the total length and the checksum are always recomputed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source of the packet.
    pub src_addr:    Address,
    /// The destination of the packet.
    pub dst_addr:    Address,
    /// The encapsulated protocol identifier.
    pub protocol:    Protocol,
    /// The type of service byte.
    pub tos:         u8,
    /// The identification field.
    pub ident:       u16,
    /// The three flag bits, in the order reserved, don't fragment, more fragments.
    pub flags:       u8,
    /// The fragment offset, in units of eight octets.
    pub frag_offset: u16,
    /// The remaining hop limit of the packet.
    pub hop_limit:   u8,
    /// The header checksum as it was received.
    pub checksum:    u16,
    /// The raw header options.
    pub options:     Options,
    /// The length of the payload.
    pub payload_len: usize,
}

impl Repr {
    /// The "don't fragment" bit within `flags`.
    pub const DONT_FRAG: u8 = 0b010;
    /// The "more fragments" bit within `flags`.
    pub const MORE_FRAGS: u8 = 0b001;

    /// A header for an outgoing, unfragmented datagram without options.
    pub fn new(src_addr: Address, dst_addr: Address, protocol: Protocol, payload_len: usize)
        -> Self
    {
        Repr {
            src_addr,
            dst_addr,
            protocol,
            tos: 0,
            ident: 0,
            flags: Self::DONT_FRAG,
            frag_offset: 0,
            hop_limit: DEFAULT_HOP_LIMIT,
            checksum: 0,
            options: Options::EMPTY,
            payload_len,
        }
    }

    /// Parse an Internet Protocol version 4 packet and return a high-level representation.
    pub fn parse(packet: &ipv4, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        // Valid checksum is expected.
        if checksum.manual() && !packet.verify_checksum() { return Err(Error::ChecksumMismatch) }

        let options = Options::new(packet.options_slice())
            .ok_or(Error::MalformedHeader)?;
        let payload_len = usize::from(packet.total_len()) - usize::from(packet.header_len());

        Ok(Repr {
            src_addr:    packet.src_addr(),
            dst_addr:    packet.dst_addr(),
            protocol:    packet.protocol(),
            tos:         packet.tos(),
            ident:       packet.ident(),
            flags:       packet.flags(),
            frag_offset: packet.frag_offset(),
            hop_limit:   packet.hop_limit(),
            checksum:    packet.checksum(),
            options,
            payload_len,
        })
    }

    /// Return the length of the header that will be emitted from this representation.
    pub fn header_len(&self) -> usize {
        HEADER_LEN + self.options.padded_len()
    }

    /// Return the length of the whole datagram.
    pub fn total_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// Check if this is only part of a fragmented datagram.
    pub fn is_fragment(&self) -> bool {
        self.flags & Self::MORE_FRAGS != 0 || self.frag_offset != 0
    }

    /// Emit a high-level representation into an Internet Protocol version 4 packet.
    ///
    /// The buffer must be at least `total_len` long and the total length must be representable,
    /// see [`serialize`] for a checked version.
    ///
    /// [`serialize`]: #method.serialize
    pub fn emit(&self, packet: &mut ipv4, checksum: Checksum) {
        packet.set_version(4);
        packet.set_header_len(self.header_len() as u8);
        packet.set_tos(self.tos);
        packet.set_total_len(self.total_len() as u16);
        packet.set_ident(self.ident);
        packet.set_flags(self.flags);
        packet.set_frag_offset(self.frag_offset);
        packet.set_hop_limit(self.hop_limit);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);

        let options = packet.options_mut_slice();
        let (data, padding) = options.split_at_mut(self.options.len());
        data.copy_from_slice(self.options.as_slice());
        padding.iter_mut().for_each(|byte| *byte = 0);

        if checksum.manual() {
            packet.fill_checksum();
        } else {
            // make sure we get a consistently zeroed checksum,
            // since implementations might rely on it
            packet.set_checksum(0);
        }
    }

    /// Build a complete datagram with this header and the payload.
    ///
    /// The payload length of the representation is ignored and replaced by the length of
    /// `payload`.
    pub fn serialize(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let repr = Repr { payload_len: payload.len(), ..*self };
        let total_len = repr.total_len();
        if total_len > MAX_TOTAL_LEN {
            return Err(Error::PayloadTooLarge);
        }

        let mut buffer = vec![0; total_len];
        let packet = ipv4::new_unchecked_mut(&mut buffer);
        repr.emit(packet, Checksum::Manual);
        packet.payload_mut_slice().copy_from_slice(payload);
        Ok(buffer)
    }
}

/// Decode a datagram into its header and payload.
///
/// Any bytes beyond the total length of the datagram are not part of the payload.
pub fn parse(bytes: &[u8], checksum: Checksum) -> Result<(Repr, &[u8])> {
    let packet = ipv4::new_checked(bytes)?;
    let repr = Repr::parse(packet, checksum)?;
    Ok((repr, packet.payload_slice()))
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv4 src={} dst={} proto={} len={} ttl={}",
               self.src_addr, self.dst_addr, self.protocol, self.payload_len, self.hop_limit)?;
        if self.is_fragment() {
            write!(f, " id={} off={}", self.ident, self.frag_offset)?;
        }
        if !self.options.is_empty() {
            write!(f, " opts={}", self.options.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static PACKET_BYTES: [u8; 30] =
        [0x45, 0x00, 0x00, 0x1e,
         0x01, 0x02, 0x62, 0x03,
         0x1a, 0x01, 0xd5, 0x6e,
         0x11, 0x12, 0x13, 0x14,
         0x21, 0x22, 0x23, 0x24,
         0xaa, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00,
         0x00, 0xff];

    static PAYLOAD_BYTES: [u8; 10] =
        [0xaa, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00,
         0x00, 0xff];

    #[test]
    fn test_deconstruct() {
        let packet = ipv4::new_unchecked(&PACKET_BYTES[..]);
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.tos(), 0);
        assert_eq!(packet.total_len(), 30);
        assert_eq!(packet.ident(), 0x102);
        assert_eq!(packet.more_frags(), true);
        assert_eq!(packet.dont_frag(), true);
        assert_eq!(packet.flags(), 0b011);
        assert_eq!(packet.frag_offset(), 0x203);
        assert_eq!(packet.hop_limit(), 0x1a);
        assert_eq!(packet.protocol(), Protocol::Icmp);
        assert_eq!(packet.checksum(), 0xd56e);
        assert_eq!(packet.src_addr(), Address([0x11, 0x12, 0x13, 0x14]));
        assert_eq!(packet.dst_addr(), Address([0x21, 0x22, 0x23, 0x24]));
        assert_eq!(packet.verify_checksum(), true);
        assert_eq!(packet.options_slice(), &[]);
        assert_eq!(packet.payload_slice(), &PAYLOAD_BYTES[..]);
    }

    #[test]
    fn test_construct() {
        let mut bytes = vec![0xa5; 30];
        let packet = ipv4::new_unchecked_mut(&mut bytes);
        packet.set_version(4);
        packet.set_header_len(20);
        packet.set_tos(0);
        packet.set_total_len(30);
        packet.set_ident(0x102);
        packet.set_flags(0b011);
        packet.set_frag_offset(0x203);
        packet.set_hop_limit(0x1a);
        packet.set_protocol(Protocol::Icmp);
        packet.set_src_addr(Address([0x11, 0x12, 0x13, 0x14]));
        packet.set_dst_addr(Address([0x21, 0x22, 0x23, 0x24]));
        packet.fill_checksum();
        packet.payload_mut_slice().copy_from_slice(&PAYLOAD_BYTES[..]);
        assert_eq!(packet.as_bytes(), &PACKET_BYTES[..]);
    }

    #[test]
    fn test_parse_and_reserialize() {
        let (repr, payload) = parse(&PACKET_BYTES, Checksum::Manual).unwrap();
        assert_eq!(repr.src_addr, Address([0x11, 0x12, 0x13, 0x14]));
        assert_eq!(repr.payload_len, 10);
        assert!(repr.is_fragment());
        assert_eq!(payload, &PAYLOAD_BYTES[..]);

        let bytes = repr.serialize(payload).unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn test_options_and_padding() {
        // Header with one word of options, followed by link layer padding.
        let mut bytes = vec![0; 32];
        {
            let packet = ipv4::new_unchecked_mut(&mut bytes);
            packet.set_version(4);
            packet.set_header_len(24);
            packet.set_total_len(28);
            packet.set_flags(Repr::DONT_FRAG);
            packet.set_hop_limit(64);
            packet.set_protocol(Protocol::Tcp);
            packet.set_src_addr(Address::new(10, 0, 0, 1));
            packet.set_dst_addr(Address::new(10, 0, 0, 2));
            packet.options_mut_slice().copy_from_slice(&[0x94, 0x04, 0x00, 0x00]);
            packet.payload_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
            packet.fill_checksum();
        }
        bytes[28..].copy_from_slice(&[0xee; 4]);

        let (repr, payload) = parse(&bytes, Checksum::Manual).unwrap();
        assert_eq!(repr.options.as_slice(), &[0x94, 0x04, 0x00, 0x00]);
        assert_eq!(repr.header_len(), 24);
        assert_eq!(payload, &[1, 2, 3, 4]);

        let serialized = repr.serialize(payload).unwrap();
        assert_eq!(&serialized[..], &bytes[..28]);
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse(&PACKET_BYTES[..19], Checksum::Manual), Err(Error::MalformedHeader));
        // Total length claims more than the buffer holds.
        assert_eq!(parse(&PACKET_BYTES[..29], Checksum::Manual), Err(Error::MalformedHeader));

        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x44;
        assert_eq!(parse(&bytes, Checksum::Ignored), Err(Error::MalformedHeader));

        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x4f;
        assert_eq!(parse(&bytes, Checksum::Ignored), Err(Error::MalformedHeader));
    }

    #[test]
    fn test_version() {
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x65;
        assert_eq!(parse(&bytes, Checksum::Manual), Err(Error::UnsupportedVersion));
    }

    #[test]
    fn test_checksum() {
        let mut bytes = PACKET_BYTES;
        bytes[8] = 0x1b;
        assert_eq!(parse(&bytes, Checksum::Manual), Err(Error::ChecksumMismatch));
        assert!(parse(&bytes, Checksum::Ignored).is_ok());
    }

    #[test]
    fn test_serialize_fills_lengths() {
        let repr = Repr::new(
            Address::new(10, 0, 0, 1),
            Address::new(10, 0, 0, 2),
            Protocol::Tcp,
            0);
        let bytes = repr.serialize(&[0x55; 6]).unwrap();
        let packet = ipv4::new_checked(&bytes).unwrap();
        assert_eq!(packet.total_len(), 26);
        assert!(packet.verify_checksum());
        assert!(packet.dont_frag());
        assert_eq!(packet.hop_limit(), DEFAULT_HOP_LIMIT);

        let too_large = vec![0; MAX_TOTAL_LEN];
        assert_eq!(repr.serialize(&too_large), Err(Error::PayloadTooLarge));
    }
}
