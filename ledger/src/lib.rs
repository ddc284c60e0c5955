//! The tessera ledger: tokens, accounts, balances, pay chunks, fees,
//! wrap/unwrap, pending balances, and the multi-sig contract bridge.
//!
//! Every engine is a thin borrowing wrapper over the host runtime; state
//! changes commit atomically with the host transaction, so engines never
//! roll anything back themselves.

pub mod account;
pub mod balance;
pub mod contract;
pub mod error;
pub mod fee;
pub mod pay;
pub mod pending;
pub mod prune;
pub mod token;
pub mod wrap;

pub use account::{Account, AccountLedger, HolderEdge};
pub use balance::{Balance, BalanceLedger, BalanceLog, LogType};
pub use contract::{ContractBridge, ContractDoc, DeferredOp, MAX_SIGNERS};
pub use error::LedgerError;
pub use fee::{refresh_fee_policy, FeeLedger, FeePolicy, FeeRate, FeeRecord};
pub use pay::{PayChunk, PayLedger, PruneReceipt};
pub use pending::{PendingBalance, PendingLedger, PendingType};
pub use prune::{PruneFold, PRUNE_BATCH, SAFE_PRUNE_MARGIN_SECS};
pub use token::{Token, TokenRegistry};
pub use wrap::{UnwrapReceipt, WrapLedger};
