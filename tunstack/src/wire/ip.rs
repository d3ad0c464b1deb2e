use core::fmt;

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        /// Internet Control Message Protocol.
        Icmp = 0x01,
        /// Transmission Control Protocol.
        Tcp  = 0x06,
        /// User Datagram Protocol.
        Udp  = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp        => write!(f, "ICMP"),
            Protocol::Tcp         => write!(f, "TCP"),
            Protocol::Udp         => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id)
        }
    }
}

/// The internet checksum, shared by the IPv4 header and the TCP segment.
pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::Protocol;
    use crate::wire::ipv4::Address;

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    ///
    /// A trailing odd byte is treated as if padded with a zero byte.
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the IPv4 pseudo header checksum.
    ///
    /// The `length` is the length of the upper layer header and payload.
    pub fn pseudo_header(src_addr: Address, dst_addr: Address, protocol: Protocol, length: u16)
        -> u16
    {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..])
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv4::Address;

    #[test]
    fn checksum_odd_length_pads_with_zero() {
        assert_eq!(checksum::data(&[0x12, 0x34, 0x56]), checksum::data(&[0x12, 0x34, 0x56, 0x00]));
        assert_eq!(checksum::data(&[0xab]), 0xab00);
    }

    #[test]
    fn checksum_folds_carries() {
        // 0xffff + 0x0001 wraps around to 0x0001.
        assert_eq!(checksum::data(&[0xff, 0xff, 0x00, 0x01]), 0x0001);
        assert_eq!(checksum::combine(&[0xffff, 0x0002]), 0x0002);
    }

    #[test]
    fn checksum_long_data() {
        // Crosses the chunk boundary.
        let bytes = [0x01u8; 70];
        assert_eq!(checksum::data(&bytes), 35 * 0x0101);
    }

    #[test]
    fn pseudo_header_sum() {
        let src = Address::new(10, 0, 0, 1);
        let dst = Address::new(10, 0, 0, 2);
        let expected = checksum::data(&[10, 0, 0, 1, 10, 0, 0, 2, 0, 6, 0, 20]);
        assert_eq!(checksum::pseudo_header(src, dst, Protocol::Tcp, 20), expected);
    }

    #[test]
    fn protocol_conversion() {
        assert_eq!(Protocol::from(6), Protocol::Tcp);
        assert_eq!(Protocol::from(0x2f), Protocol::Unknown(0x2f));
        assert_eq!(u8::from(Protocol::Udp), 0x11);
        assert_eq!(format!("{}", Protocol::Unknown(0x2f)), "0x2f");
    }
}
