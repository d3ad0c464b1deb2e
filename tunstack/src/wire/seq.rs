//! Sequence number arithmetic.
//!
//! Sequence numbers live in a circular space modulo 2^32. Two numbers are compared by the sign of
//! their wrapping difference, which is meaningful as long as they are less than 2^31 apart. This is
//! always the case for numbers within one send or receive window.
use core::{cmp, fmt, ops};

/// A TCP sequence number.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// Check if this lies in the window starting at `start` and ending before `end`.
    ///
    /// The window is the half-open circular interval `[start, end)`, so `start` itself is
    /// contained while `end` is not. An interval with `start == end` is empty.
    pub fn is_between(self, start: SeqNumber, end: SeqNumber) -> bool {
        self.0.wrapping_sub(start.0) < end.0.wrapping_sub(start.0)
    }

    /// The number of sequence numbers from `earlier` to `self`, counting forward.
    pub fn distance(self, earlier: SeqNumber) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

/// Check if `a` lies in the circular interval `[b, c)`.
pub fn is_between(a: SeqNumber, b: SeqNumber, c: SeqNumber) -> bool {
    a.is_between(b, c)
}

/// Check if `a` is at or before `b` in sequence space.
pub fn less_eq(a: SeqNumber, b: SeqNumber) -> bool {
    a <= b
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        (self.0.wrapping_sub(other.0) as i32).partial_cmp(&0)
    }
}
