//! Virtual time for logical processes

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Simulated timestamp shared by every logical process.
///
/// Virtual time is a plain ordered scalar; it never relates to wall-clock time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VirtualTime(i64);

impl VirtualTime {
    /// The initial clock of every logical process.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Largest representable timestamp.
    pub const MAX: VirtualTime = VirtualTime(i64::MAX);

    /// Create a timestamp from a raw tick count
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Get the raw tick count
    pub const fn ticks(&self) -> i64 {
        self.0
    }

    /// Timestamp `delta` ticks after this one, saturating at [`VirtualTime::MAX`]
    pub fn after(&self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

impl Add<i64> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: i64) -> Self::Output {
        self.after(rhs)
    }
}

impl From<i64> for VirtualTime {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl From<i32> for VirtualTime {
    fn from(ticks: i32) -> Self {
        Self(i64::from(ticks))
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_and_arithmetic() {
        let t = VirtualTime::new(5);
        assert!(VirtualTime::ZERO < t);
        assert_eq!(t + 3, VirtualTime::new(8));
        assert_eq!(VirtualTime::MAX.after(1), VirtualTime::MAX);
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let json = serde_json::to_string(&VirtualTime::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: VirtualTime = serde_json::from_str("7").unwrap();
        assert_eq!(back, VirtualTime::new(7));
    }
}
