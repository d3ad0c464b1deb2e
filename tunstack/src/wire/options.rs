use core::fmt;

/// Raw header options, carried opaquely.
///
/// Both the IPv4 and the TCP header reserve at most 40 bytes for options. They are stored inline
/// so that header representations stay `Copy`. The length is always a multiple of four when
/// parsed from a packet; emitting pads shorter options with zero (end of list) bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Options {
    len: u8,
    bytes: [u8; Options::MAX_LEN],
}

impl Options {
    /// The maximum number of option bytes in an IPv4 or TCP header.
    pub const MAX_LEN: usize = 40;

    /// No options at all.
    pub const EMPTY: Options = Options { len: 0, bytes: [0; Options::MAX_LEN] };

    /// Copy options from raw bytes.
    ///
    /// Returns `None` if there are more than 40 bytes.
    pub fn new(data: &[u8]) -> Option<Self> {
        if data.len() > Self::MAX_LEN {
            return None;
        }

        let mut bytes = [0; Self::MAX_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Some(Options { len: data.len() as u8, bytes })
    }

    /// The option bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// The number of option bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Check if there are no options.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length when emitted, rounded up to a multiple of four.
    pub fn padded_len(&self) -> usize {
        (self.len() + 3) & !3
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::EMPTY
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding() {
        let options = Options::new(&[1, 2, 3]).unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options.padded_len(), 4);
        assert_eq!(options.as_slice(), &[1, 2, 3]);
        assert_eq!(Options::EMPTY.padded_len(), 0);
        assert!(Options::new(&[0; 41]).is_none());
    }
}
