use core::{fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Options, Result};
use super::ip::checksum;
use super::ipv4::{self, Address, Protocol};

pub use super::seq::SeqNumber;

/// A set of tcp flags.
///
/// Holds the twelve low bits of the data offset word: three reserved bits, the explicit
/// congestion bits and the six control flags. Reserved bits are kept so that a parsed header can
/// be reproduced exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u16);

byte_wrapper! {
    /// A byte sequence representing a TCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) fn OPTIONS(length: u8) -> Field {
        URGENT.end..(length as usize)
    }

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;
    pub(crate) const FLG_URG: u16 = 0x020;
    pub(crate) const FLG_ECE: u16 = 0x040;
    pub(crate) const FLG_CWR: u16 = 0x080;
    pub(crate) const FLG_NS:  u16 = 0x100;
    pub(crate) const FLG_ALL: u16 = 0xfff;

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
    pub(crate) const OPT_WS:  u8 = 0x03;
    pub(crate) const OPT_SACKPERM: u8 = 0x04;
}

/// The length of a header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

impl tcp {
    /// Imbue a raw octet buffer with TCP packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &tcp {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with TCP packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut tcp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&tcp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// View the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::MalformedSegment)` if the buffer is shorter than a minimal header or
    /// the data offset points before the end of the fixed header or beyond the buffer.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::MalformedSegment)
        } else {
            let header_len = usize::from(self.header_len());
            if header_len < HEADER_LEN || len < header_len {
                Err(Error::MalformedSegment)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACK_NUM]))
    }

    /// Read all flags at once.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u16(&self.0[field::FLAGS]) & field::FLG_ALL)
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the raw option bytes.
    pub fn options_slice(&self) -> &[u8] {
        &self.0[field::OPTIONS(self.header_len())]
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[usize::from(self.header_len())..]
    }

    /// Validate the segment checksum with the pseudo header of the enclosing datagram.
    pub fn verify_checksum(&self, src_addr: Address, dst_addr: Address) -> bool {
        let length = self.0.len() as u16;
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, length),
            checksum::data(&self.0),
        ]) == !0
    }

    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set all flags at once, keeping the header length.
    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !field::FLG_ALL) | (flags.0 & field::FLG_ALL);
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, length: u8) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & field::FLG_ALL) | (u16::from(length) / 4) << 12;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Return the option bytes as a mutable slice.
    pub fn options_mut_slice(&mut self) -> &mut [u8] {
        let range = field::OPTIONS(self.header_len());
        &mut self.0[range]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let start = usize::from(self.header_len());
        &mut self.0[start..]
    }

    /// Compute and fill in the checksum, covering the whole buffer.
    pub fn fill_checksum(&mut self, src_addr: Address, dst_addr: Address) {
        self.set_checksum(0);
        let length = self.0.len() as u16;
        let checksum = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, length),
            checksum::data(&self.0),
        ]);
        self.set_checksum(checksum)
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! flag_accessors {
    ($( $get:ident, $set:ident, $bit:path, $name:literal; )*) => {
        $(
            #[doc = "Return the "]
            #[doc = $name]
            #[doc = " flag."]
            #[inline]
            pub fn $get(self) -> bool {
                self.0 & $bit != 0
            }

            #[doc = "Set the "]
            #[doc = $name]
            #[doc = " flag."]
            #[inline]
            pub fn $set(&mut self, value: bool) {
                if value {
                    self.0 |= $bit
                } else {
                    self.0 &= !$bit
                }
            }
        )*
    }
}

impl Flags {
    /// Only the FIN flag.
    pub const FIN: Flags = Flags(field::FLG_FIN);
    /// Only the SYN flag.
    pub const SYN: Flags = Flags(field::FLG_SYN);
    /// Only the RST flag.
    pub const RST: Flags = Flags(field::FLG_RST);
    /// Only the PSH flag.
    pub const PSH: Flags = Flags(field::FLG_PSH);
    /// Only the ACK flag.
    pub const ACK: Flags = Flags(field::FLG_ACK);
    /// Only the URG flag.
    pub const URG: Flags = Flags(field::FLG_URG);

    flag_accessors! {
        fin, set_fin, field::FLG_FIN, "FIN";
        syn, set_syn, field::FLG_SYN, "SYN";
        rst, set_rst, field::FLG_RST, "RST";
        psh, set_psh, field::FLG_PSH, "PSH";
        ack, set_ack, field::FLG_ACK, "ACK";
        urg, set_urg, field::FLG_URG, "URG";
        ece, set_ece, field::FLG_ECE, "ECE";
        cwr, set_cwr, field::FLG_CWR, "CWR";
        ns, set_ns, field::FLG_NS, "NS";
    }

    /// The sequence space occupied by the control flags alone.
    ///
    /// Both SYN and FIN count as one octet.
    pub fn sequence_len(self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin())
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (self.syn(), "SYN"),
            (self.fin(), "FIN"),
            (self.rst(), "RST"),
            (self.psh(), "PSH"),
            (self.ack(), "ACK"),
            (self.urg(), "URG"),
        ];

        let mut first = true;
        for &(_, name) in names.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }

        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// A representation of a single TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    /// Marks the end of the option list.
    EndOfList,
    /// Padding between options.
    NoOperation,
    /// The largest segment the sender of the option wants to receive.
    MaxSegmentSize(u16),
    /// Window scale shift count.
    WindowScale(u8),
    /// Selective acknowledgements may be used.
    SackPermitted,
    /// Any other option, not interpreted.
    Unknown {
        /// The option kind.
        kind: u8,
        /// The option data, without kind and length.
        data: &'a [u8],
    },
}

impl<'a> TcpOption<'a> {
    /// Parse the first option in the buffer, returning the rest of the buffer.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.get(0).ok_or(Error::MalformedSegment)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error::MalformedSegment)? as usize;
                let data = buffer.get(2..length).ok_or(Error::MalformedSegment)?;
                option = match (kind, length) {
                    (field::OPT_MSS, 4) =>
                        TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
                    (field::OPT_MSS, _) =>
                        return Err(Error::MalformedSegment),
                    (field::OPT_WS, 3) =>
                        TcpOption::WindowScale(data[0]),
                    (field::OPT_WS, _) =>
                        return Err(Error::MalformedSegment),
                    (field::OPT_SACKPERM, 2) =>
                        TcpOption::SackPermitted,
                    (field::OPT_SACKPERM, _) =>
                        return Err(Error::MalformedSegment),
                    (_, _) =>
                        TcpOption::Unknown { kind, data },
                };
            }
        }
        Ok((&buffer[length..], option))
    }

    /// The number of bytes this option occupies.
    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList => 1,
            TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::Unknown { data, .. } => 2 + data.len()
        }
    }

    /// Write the option to the start of the buffer, returning the rest of the buffer.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than `buffer_len`.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                // There may be padding space which also should be initialized.
                for p in buffer.iter_mut() {
                    *p = field::OPT_END;
                }
            }
            TcpOption::NoOperation => {
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                buffer[0] = field::OPT_MSS;
                buffer[1] = length as u8;
                NetworkEndian::write_u16(&mut buffer[2..4], value)
            }
            TcpOption::WindowScale(value) => {
                buffer[0] = field::OPT_WS;
                buffer[1] = length as u8;
                buffer[2] = value;
            }
            TcpOption::SackPermitted => {
                buffer[0] = field::OPT_SACKPERM;
                buffer[1] = length as u8;
            }
            TcpOption::Unknown { kind, data: provided } => {
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(provided)
            }
        }
        &mut buffer[length..]
    }
}

/// A high-level representation of a TCP header.
///
/// Every field is kept as received. The acknowledgement number is only meaningful when the ACK
/// flag is set and the urgent pointer only with URG.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source port.
    pub src_port:    u16,
    /// The destination port.
    pub dst_port:    u16,
    /// The sequence number of the first octet, or of the SYN.
    pub seq_number:  SeqNumber,
    /// The next sequence number the sender expects to receive.
    pub ack_number:  SeqNumber,
    /// Control flags and reserved bits.
    pub flags:       Flags,
    /// The receive window of the sender.
    pub window_len:  u16,
    /// The checksum as received.
    pub checksum:    u16,
    /// The urgent pointer.
    pub urgent_at:   u16,
    /// The raw header options.
    pub options:     Options,
    /// The length of the payload.
    pub payload_len: usize,
}

impl Repr {
    /// Parse a TCP segment with the addresses of the enclosing datagram.
    pub fn parse(packet: &tcp, src_addr: Address, dst_addr: Address, checksum: Checksum)
        -> Result<Repr>
    {
        packet.check_len()?;
        if checksum.manual() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::ChecksumMismatch);
        }

        let options = Options::new(packet.options_slice())
            .ok_or(Error::MalformedSegment)?;

        Ok(Repr {
            src_port:    packet.src_port(),
            dst_port:    packet.dst_port(),
            seq_number:  packet.seq_number(),
            ack_number:  packet.ack_number(),
            flags:       packet.flags(),
            window_len:  packet.window_len(),
            checksum:    packet.checksum(),
            urgent_at:   packet.urgent_at(),
            options,
            payload_len: packet.payload_slice().len(),
        })
    }

    /// The length of the header that will be emitted.
    pub fn header_len(&self) -> usize {
        HEADER_LEN + self.options.padded_len()
    }

    /// The length of the header and the payload.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// The sequence space occupied by this segment.
    pub fn sequence_len(&self) -> usize {
        self.payload_len + self.flags.sequence_len()
    }

    /// Find the maximum segment size option, if any.
    ///
    /// Malformed options end the search.
    pub fn max_seg_size(&self) -> Option<u16> {
        let mut options = self.options.as_slice();
        while !options.is_empty() {
            match TcpOption::parse(options) {
                Ok((_, TcpOption::EndOfList)) | Err(_) => break,
                Ok((_, TcpOption::MaxSegmentSize(mss))) => return Some(mss),
                Ok((rest, _)) => options = rest,
            }
        }
        None
    }

    /// Emit the header into a segment buffer.
    ///
    /// The buffer must be exactly `buffer_len` long, the payload is not written. The checksum
    /// covers the payload so it must be filled in afterwards with `fill_checksum` unless
    /// checksums are `Ignored`.
    pub fn emit(&self, packet: &mut tcp) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number);
        packet.set_header_len(self.header_len() as u8);
        packet.set_flags(self.flags);
        packet.set_window_len(self.window_len);
        packet.set_checksum(0);
        packet.set_urgent_at(self.urgent_at);

        let options = packet.options_mut_slice();
        let (data, padding) = options.split_at_mut(self.options.len());
        data.copy_from_slice(self.options.as_slice());
        padding.iter_mut().for_each(|byte| *byte = field::OPT_END);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} {} seq={}",
               self.src_port, self.dst_port, self.flags, self.seq_number)?;
        if self.flags.ack() {
            write!(f, " ack={}", self.ack_number)?;
        }
        write!(f, " win={} len={}", self.window_len, self.payload_len)?;
        if self.flags.urg() {
            write!(f, " urg={}", self.urgent_at)?;
        }
        if let Some(mss) = self.max_seg_size() {
            write!(f, " mss={}", mss)?;
        }
        Ok(())
    }
}

/// A decoded TCP segment with its payload.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Segment {
    /// The header.
    pub repr: Repr,
    /// The data carried by the segment.
    pub payload: Vec<u8>,
}

impl Segment {
    /// Combine a header and a payload, fixing up the payload length of the header.
    pub fn new(repr: Repr, payload: Vec<u8>) -> Self {
        let repr = Repr { payload_len: payload.len(), ..repr };
        Segment { repr, payload }
    }

    /// Decode the payload of an IPv4 datagram as a TCP segment.
    ///
    /// Fails with `NotTcp` if the datagram carries a different protocol.
    pub fn parse(ip_repr: &ipv4::Repr, bytes: &[u8], checksum: Checksum) -> Result<Segment> {
        if ip_repr.protocol != Protocol::Tcp {
            return Err(Error::NotTcp);
        }

        let packet = tcp::new_checked(bytes)?;
        let repr = Repr::parse(packet, ip_repr.src_addr, ip_repr.dst_addr, checksum)?;
        Ok(Segment {
            repr,
            payload: packet.payload_slice().to_vec(),
        })
    }

    /// Encode the segment with a checksum over the pseudo header of the given addresses.
    ///
    /// Fails with `PayloadTooLarge` if the segment would not fit into a single datagram.
    pub fn serialize(&self, src_addr: Address, dst_addr: Address) -> Result<Vec<u8>> {
        let repr = Repr { payload_len: self.payload.len(), ..self.repr };
        let len = repr.buffer_len();
        if len > ipv4::MAX_TOTAL_LEN - ipv4::HEADER_LEN {
            return Err(Error::PayloadTooLarge);
        }

        let mut buffer = vec![0; len];
        let packet = tcp::new_unchecked_mut(&mut buffer);
        repr.emit(packet);
        packet.payload_mut_slice().copy_from_slice(&self.payload);
        packet.fill_checksum(src_addr, dst_addr);
        Ok(buffer)
    }

    /// The sequence space occupied by this segment.
    pub fn sequence_len(&self) -> usize {
        self.payload.len() + self.repr.flags.sequence_len()
    }

    /// The sequence number following the last octet of this segment.
    pub fn seq_end(&self) -> SeqNumber {
        self.repr.seq_number + self.sequence_len()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}
