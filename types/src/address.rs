//! Token-bound account addresses.
//!
//! Textual format: `<code><2 hex type><40 hex id hash><8 hex checksum>`,
//! uppercase, total length `code.len() + 50`.
//!
//! The 20-byte id hash is either the identity hash of a personal holder
//! (used verbatim when the input is already 40 hex chars) or derived from an
//! arbitrary id via the Shake256 XOF. Joint accounts hash the creating
//! transaction id instead, so their addresses are unique per transaction.
//! Checksum: first 4 bytes of Blake2b-256(code ++ type byte ++ id hash).

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use std::fmt;

use crate::error::AddressError;
use crate::kid::Kid;

type Blake2b256 = Blake2b<U32>;

/// Hex length of the encoded body after the token code: 2 + 40 + 8.
const BODY_LEN: usize = 50;
/// Token codes are 3 to 6 uppercase alphanumerics starting with a letter.
const CODE_MIN: usize = 3;
const CODE_MAX: usize = 6;

/// Whether an account is held by a single identity or a set of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountType {
    Personal,
    Joint,
}

impl AccountType {
    pub fn as_byte(&self) -> u8 {
        match self {
            AccountType::Personal => 0x00,
            AccountType::Joint => 0x01,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(AccountType::Personal),
            0x01 => Some(AccountType::Joint),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Personal => write!(f, "personal"),
            AccountType::Joint => write!(f, "joint"),
        }
    }
}

/// A token-bound account address. Immutable, compared by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    code: String,
    account_type: AccountType,
    hash: [u8; 20],
    checksum: [u8; 4],
}

/// Validate the token code shape: 3–6 uppercase alphanumerics, first char
/// alphabetic (so the code/body split on parse is unambiguous).
pub fn validate_code(code: &str) -> Result<(), AddressError> {
    if code.len() < CODE_MIN || code.len() > CODE_MAX {
        return Err(AddressError::TokenCode);
    }
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return Err(AddressError::TokenCode),
    }
    if !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(AddressError::TokenCode);
    }
    Ok(())
}

/// Checksum = Blake2b-256(code ++ type ++ hash)[0..4].
fn checksum(code: &str, account_type: AccountType, hash: &[u8; 20]) -> [u8; 4] {
    let mut hasher = Blake2b256::new();
    Digest::update(&mut hasher, code.as_bytes());
    Digest::update(&mut hasher, [account_type.as_byte()]);
    Digest::update(&mut hasher, hash);
    let digest = hasher.finalize();
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Derive the 20-byte id hash from an arbitrary identity string.
///
/// A 40-hex input is an identity hash already and is used verbatim;
/// anything else is fed through the Shake256 XOF.
fn id_hash(id: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    if id.len() == 40 {
        if let Ok(bytes) = hex::decode(id) {
            out.copy_from_slice(&bytes);
            return out;
        }
    }
    let mut xof = Shake256::default();
    xof.update(id.as_bytes());
    xof.finalize_xof().read(&mut out);
    out
}

impl Address {
    /// Personal account address for a token and identity.
    pub fn personal(code: &str, id: &str) -> Result<Self, AddressError> {
        validate_code(code)?;
        let hash = id_hash(id);
        let checksum = checksum(code, AccountType::Personal, &hash);
        Ok(Self {
            code: code.to_owned(),
            account_type: AccountType::Personal,
            hash,
            checksum,
        })
    }

    /// Joint account address, salted by the creating transaction id.
    pub fn joint(code: &str, tx_id: &str) -> Result<Self, AddressError> {
        validate_code(code)?;
        let mut hasher = Blake2b256::new();
        Digest::update(&mut hasher, tx_id.as_bytes());
        let digest = hasher.finalize();
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest[..20]);
        let checksum = checksum(code, AccountType::Joint, &hash);
        Ok(Self {
            code: code.to_owned(),
            account_type: AccountType::Joint,
            hash,
            checksum,
        })
    }

    /// Parse and validate a textual address. The input is uppercased first,
    /// so parsing is case-insensitive.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.to_ascii_uppercase();
        if s.len() < CODE_MIN + BODY_LEN || s.len() > CODE_MAX + BODY_LEN {
            return Err(AddressError::Length);
        }
        let (code, body) = s.split_at(s.len() - BODY_LEN);
        validate_code(code)?;
        let bytes = hex::decode(body).map_err(|_| AddressError::Length)?;
        let account_type =
            AccountType::from_byte(bytes[0]).ok_or(AddressError::AccountType)?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[1..21]);
        let mut given = [0u8; 4];
        given.copy_from_slice(&bytes[21..25]);
        if given != checksum(code, account_type, &hash) {
            return Err(AddressError::Checksum);
        }
        Ok(Self {
            code: code.to_owned(),
            account_type,
            hash,
            checksum: given,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn is_joint(&self) -> bool {
        self.account_type == AccountType::Joint
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    /// Lowercase 40-hex of the id hash. For personal accounts this is the
    /// holder's identity id.
    pub fn kid_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Whether `kid` is the holder encoded in a personal address.
    pub fn holds(&self, kid: &Kid) -> bool {
        self.account_type == AccountType::Personal && self.kid_hex() == kid.as_str()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = Vec::with_capacity(25);
        body.push(self.account_type.as_byte());
        body.extend_from_slice(&self.hash);
        body.extend_from_slice(&self.checksum);
        write!(f, "{}{}", self.code, hex::encode_upper(body))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(D::Error::custom)
    }
}
