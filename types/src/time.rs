//! Transaction time, supplied by the host runtime.
//!
//! The service never reads a local clock: every "now" comparison derives
//! from the deterministic per-transaction timestamp, so re-execution of the
//! same transaction observes the same time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A host-assigned transaction timestamp with nanosecond precision.
///
/// Persisted documents carry it as a single integer of Unix nanoseconds so
/// rich-query sorts on time fields compare numerically; the service layer
/// converts to whole seconds at the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxTime {
    secs: i64,
    nanos: u32,
}

impl TxTime {
    pub const EPOCH: Self = Self { secs: 0, nanos: 0 };

    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub fn unix_nanos(&self) -> i128 {
        self.secs as i128 * 1_000_000_000 + self.nanos as i128
    }

    /// Zero-padded 19-digit nano fragment used in state keys, so key order
    /// equals time order for any timestamp this side of year 2262.
    pub fn key_fragment(&self) -> String {
        format!("{:019}", self.unix_nanos())
    }

    /// This time shifted `secs` seconds into the past, floored at the epoch.
    pub fn seconds_ago(&self, secs: i64) -> TxTime {
        TxTime {
            secs: (self.secs - secs).max(0),
            nanos: self.nanos,
        }
    }
}

impl TxTime {
    /// Rebuild from an integer of Unix nanoseconds.
    pub fn from_unix_nanos(nanos: i64) -> Self {
        Self {
            secs: nanos.div_euclid(1_000_000_000),
            nanos: nanos.rem_euclid(1_000_000_000) as u32,
        }
    }
}

impl Serialize for TxTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.unix_nanos() as i64)
    }
}

impl<'de> Deserialize<'de> for TxTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(TxTime::from_unix_nanos(nanos))
    }
}

impl fmt::Display for TxTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fragment_sorts_like_time() {
        let a = TxTime::new(100, 5);
        let b = TxTime::new(100, 6);
        let c = TxTime::new(101, 0);
        assert!(a.key_fragment() < b.key_fragment());
        assert!(b.key_fragment() < c.key_fragment());
    }

    #[test]
    fn unix_nanos() {
        assert_eq!(TxTime::new(2, 3).unix_nanos(), 2_000_000_003);
    }

    #[test]
    fn seconds_ago_floors_at_epoch() {
        let t = TxTime::new(100, 7);
        assert_eq!(t.seconds_ago(40), TxTime::new(60, 7));
        assert_eq!(t.seconds_ago(500), TxTime::new(0, 7));
    }

    #[test]
    fn ordering() {
        assert!(TxTime::new(1, 999_999_999) < TxTime::new(2, 0));
        assert!(TxTime::new(2, 1) > TxTime::new(2, 0));
    }

    #[test]
    fn serde_as_integer_nanos() {
        let t = TxTime::new(5, 25);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "5000000025");
        let back: TxTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
