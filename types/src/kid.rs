//! Identity ids issued by the identity service.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AddressError;

/// The stable 40-hex identifier of an end-user identity.
///
/// Stored lowercase; holder sets sort by this form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kid(String);

impl Kid {
    pub fn new(s: &str) -> Result<Self, AddressError> {
        if s.len() != 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::Length);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_forty_hex() {
        let k = Kid::new("0123456789ABCDEF0123456789abcdef01234567").unwrap();
        assert_eq!(k.as_str(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(Kid::new("short").is_err());
        assert!(Kid::new("zz23456789abcdef0123456789abcdef01234567").is_err());
    }
}
