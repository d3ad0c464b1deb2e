use core::fmt;

/// The error type for decoding and encoding packets.
///
/// None of these are fatal to the engine. A packet failing to decode is logged and dropped
/// without any reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The IP header could not be parsed.
    ///
    /// The packet may be shorter than the minimum header, declare a header length shorter than
    /// the minimum or longer than the data, or declare a total length that does not fit the
    /// received data.
    MalformedHeader,

    /// The IP version field was not 4.
    UnsupportedVersion,

    /// The IP datagram does not carry TCP.
    NotTcp,

    /// The TCP segment could not be parsed.
    ///
    /// Fewer bytes than a minimal TCP header, or a data offset pointing outside the segment.
    MalformedSegment,

    /// An incoming header or segment had an incorrect checksum.
    ///
    /// Checksum checks have a switch to disable them, see [`Checksum`].
    ///
    /// [`Checksum`]: enum.Checksum.html
    ChecksumMismatch,

    /// The outgoing packet would not fit the 16-bit length fields.
    PayloadTooLarge,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedHeader    => write!(f, "malformed ip header"),
            Error::UnsupportedVersion => write!(f, "unsupported ip version"),
            Error::NotTcp             => write!(f, "not a tcp segment"),
            Error::MalformedSegment   => write!(f, "malformed tcp segment"),
            Error::ChecksumMismatch   => write!(f, "checksum error"),
            Error::PayloadTooLarge    => write!(f, "payload too large"),
        }
    }
}

impl std::error::Error for Error { }
