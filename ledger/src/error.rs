//! Ledger error model.
//!
//! Domain errors are "responsible": their message is user-visible and
//! propagates verbatim. Everything else is internal — the service layer logs
//! it and answers with a generic per-operation message so storage details
//! never leak to callers.

use tessera_store::StoreError;
use tessera_types::{AddressError, AmountError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    InvalidAccountAddr(#[from] AddressError),

    #[error("account already exists")]
    ExistedAccount,

    #[error("account not found: {0}")]
    NotExistedAccount(String),

    #[error("token not issued: {0}")]
    NotIssuedToken(String),

    #[error("token already issued: {0}")]
    ExistedToken(String),

    #[error("supply violation: {0}")]
    Supply(String),

    #[error("duplicate pay chunk, retry the transaction")]
    DuplicatePay,

    #[error("duplicate unwrap: external tx already redeemed")]
    DuplicateUnwrap,

    #[error("no utxo chunks in the window {window}")]
    NotExistUtxoChunks { window: String },

    #[error("invalid access")]
    InvalidAccess,

    #[error("no authority: {0}")]
    NoAuthority(String),

    #[error("account is suspended: {0}")]
    Suspended(String),

    #[error("not enough balance: {0}")]
    NotEnoughBalance(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("too many signers")]
    TooManySigners,

    #[error("invalid contract document: {0}")]
    InvalidContractDocument(String),

    #[error("wrap bridge not configured for {0}")]
    NoWrapBridge(String),

    #[error("pending balance not withdrawable: {0}")]
    NotWithdrawable(String),

    #[error("{0}")]
    Other(String),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Whether the message is safe (and meant) to reach the caller verbatim.
    pub fn responsible(&self) -> bool {
        !matches!(self, LedgerError::Store(_) | LedgerError::Internal(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => LedgerError::Internal(format!("missing state {key}")),
            other => LedgerError::Store(other),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Internal(format!("serialization error: {e}"))
    }
}

impl From<AmountError> for LedgerError {
    fn from(e: AmountError) -> Self {
        LedgerError::InvalidAmount(e.to_string())
    }
}
