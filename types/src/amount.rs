//! Arbitrary-precision signed token amounts.
//!
//! Amounts serialize as bare JSON number literals, never strings, so
//! downstream consumers must parse JSON numbers with arbitrary precision.
//! Arithmetic follows a copy convention: every operation returns a fresh
//! value and never mutates its operands.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::AmountError;

/// An arbitrary-precision signed integer amount.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigInt);

impl Amount {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn from_i64(v: i64) -> Self {
        Self(BigInt::from(v))
    }

    /// Parse a decimal integer, optionally signed.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        BigInt::from_str(s)
            .map(Self)
            .map_err(|_| AmountError::Parse(s.to_owned()))
    }

    pub fn add(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }

    pub fn neg(&self) -> Amount {
        Amount(-&self.0)
    }

    pub fn abs(&self) -> Amount {
        Amount(self.0.abs())
    }

    /// -1, 0 or 1.
    pub fn sign(&self) -> i8 {
        match self.0.sign() {
            num_bigint::Sign::Minus => -1,
            num_bigint::Sign::NoSign => 0,
            num_bigint::Sign::Plus => 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Construction from a raw big integer; used by the fee math.
    pub fn from_big(v: BigInt) -> Self {
        Self(v)
    }

    pub fn into_big(self) -> BigInt {
        self.0
    }
}

impl From<BigInt> for Amount {
    fn from(v: BigInt) -> Self {
        Self(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // arbitrary_precision keeps the literal intact for any magnitude.
        serde_json::Number::from_string_unchecked(self.0.to_string()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = serde_json::Number::deserialize(deserializer)?;
        let repr = n.to_string();
        if repr.contains(['.', 'e', 'E']) {
            return Err(D::Error::custom(AmountError::Float(repr)));
        }
        Amount::parse(&repr).map_err(D::Error::custom)
    }
}

impl PartialOrd<i64> for Amount {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.0.partial_cmp(&BigInt::from(*other))
    }
}

impl PartialEq<i64> for Amount {
    fn eq(&self, other: &i64) -> bool {
        self.0 == BigInt::from(*other)
    }
}
