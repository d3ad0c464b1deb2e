/*! Time structures.

The `time` module contains structures used to represent both
absolute and relative time.

 - [Instant] is used to represent absolute time.
 - [Duration] is used to represet relative time.
 - [Expiration] is a deadline of a timer which may also be disarmed.

The state machine never reads a clock itself, every event is passed the current `Instant` by the
caller. Only the engine loop consults [`Instant::now`].

[Instant]: struct.Instant.html
[Duration]: struct.Duration.html
[Expiration]: enum.Expiration.html
[`Instant::now`]: struct.Instant.html#method.now
*/
use core::{cmp, fmt, ops};
use std::sync::OnceLock;
pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `i64` value that
/// represents a number of milliseconds, monotonically increasing
/// since an arbitrary moment in time, such as process startup.
///
/// * A value of `0` is inherently arbitrary.
/// * A value less than `0` indicates a time before the starting
///   point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    /// The milliseconds since the starting point.
    pub millis: i64,
}

/// An expiration time, inversion of `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The timer fires at this instant.
    When(Instant),
    /// The timer is not armed.
    Never,
}

use Expiration::{When, Never};

static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();

impl Instant {
    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// The current time of the monotonic clock.
    ///
    /// The starting point is the first call of this function in the process.
    pub fn now() -> Instant {
        let epoch = *EPOCH.get_or_init(std::time::Instant::now);
        let elapsed = epoch.elapsed();
        Instant::from_millis(elapsed.as_millis() as i64)
    }

    /// The fractional number of milliseconds that have passed
    /// since the beginning of time.
    pub fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The number of whole seconds that have passed since the
    /// beginning of time.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since
    /// the biginning of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl Expiration {
    /// Check if the deadline lies at or before `now`.
    pub fn is_expired(self, now: Instant) -> bool {
        match self {
            When(deadline) => deadline <= now,
            Never => false,
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis - rhs.as_millis() as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).abs() as u64)
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

impl From<Option<Instant>> for Expiration {
    fn from(opt: Option<Instant>) -> Self {
        match opt {
            Some(instant) => When(instant),
            None => Never,
        }
    }
}

impl From<Expiration> for Option<Instant> {
    fn from(opt: Expiration) -> Self {
        match opt {
            When(instant) => Some(instant),
            Never => None,
        }
    }
}

impl cmp::PartialOrd<Self> for Expiration {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Expiration {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (*self, *other) {
            (Never, Never) => cmp::Ordering::Equal,
            (Never, When(_)) => cmp::Ordering::Greater,
            (When(_), Never) => cmp::Ordering::Less,
            (When(ref a), When(ref b)) => a.cmp(b),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_instant_ops() {
        // std::ops::Add
        assert_eq!(Instant::from_millis(4) + Duration::from_millis(6), Instant::from_millis(10));
        // std::ops::Sub
        assert_eq!(Instant::from_millis(7) - Duration::from_millis(5), Instant::from_millis(2));
        assert_eq!(Instant::from_millis(7) - Instant::from_millis(10), Duration::from_millis(3));
    }

    #[test]
    fn test_instant_getters() {
        let instant = Instant::from_millis(5674);
        assert_eq!(instant.secs(), 5);
        assert_eq!(instant.millis(), 674);
        assert_eq!(instant.total_millis(), 5674);
    }

    #[test]
    fn test_instant_display() {
        assert_eq!(format!("{}", Instant::from_millis(5674)), "5.674s");
        assert_eq!(format!("{}", Instant::from_millis(5000)), "5.000s");
        assert_eq!(format!("{}", Instant::from_millis(5005)), "5.005s");
    }

    #[test]
    fn test_now_is_monotonic() {
        let first = Instant::now();
        let second = Instant::now();
        assert!(first <= second);
    }

    #[test]
    fn test_expiration() {
        let deadline = Expiration::When(Instant::from_millis(100));
        assert!(!deadline.is_expired(Instant::from_millis(99)));
        assert!(deadline.is_expired(Instant::from_millis(100)));
        assert!(!Expiration::Never.is_expired(Instant::from_millis(i64::max_value())));
        assert!(deadline < Expiration::Never);
    }
}
