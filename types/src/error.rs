//! Errors produced by the fundamental types.

use thiserror::Error;

/// Reasons an account address fails to parse or validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid account address: length")]
    Length,

    #[error("invalid account address: token code")]
    TokenCode,

    #[error("invalid account address: account type")]
    AccountType,

    #[error("invalid account address: checksum")]
    Checksum,
}

/// Errors from amount parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid amount: {0}")]
    Parse(String),

    #[error("amount must be an integer, got {0}")]
    Float(String),
}
