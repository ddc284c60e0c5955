//! Persisted key layout.
//!
//! Every record family has a fixed prefix; time-keyed families embed the
//! zero-padded nano fragment so lexicographic key order equals time order.

use tessera_types::{Address, Kid, TxTime};

pub const TOKEN: &str = "TKN_";
pub const ACCOUNT: &str = "ACC_";
pub const HOLDER: &str = "HLD_";
pub const BALANCE: &str = "BLC_";
pub const BALANCE_LOG: &str = "LOG_";
pub const PENDING_BALANCE: &str = "PBL_";
pub const PAY: &str = "PAY_";
pub const FEE: &str = "FEE_";
pub const UNWRAP: &str = "UNWRAP_";
pub const PRUNE: &str = "PRN_";

pub fn token(code: &str) -> String {
    format!("{TOKEN}{code}")
}

pub fn account(addr: &Address) -> String {
    format!("{ACCOUNT}{addr}")
}

pub fn holder(kid: &Kid, addr: &Address) -> String {
    format!("{HOLDER}{kid}_{addr}")
}

/// Prefix of every holder edge belonging to one identity.
pub fn holder_prefix(kid: &Kid) -> String {
    format!("{HOLDER}{kid}_")
}

pub fn balance(addr: &Address) -> String {
    format!("{BALANCE}{addr}")
}

pub fn balance_log(addr: &Address, t: &TxTime) -> String {
    format!("{BALANCE_LOG}{addr}_{}", t.key_fragment())
}

pub fn balance_log_prefix(addr: &Address) -> String {
    format!("{BALANCE_LOG}{addr}_")
}

pub fn pending_balance(id: &str) -> String {
    format!("{PENDING_BALANCE}{id}")
}

pub fn pay(addr: &Address, t: &TxTime) -> String {
    format!("{PAY}{addr}_{}", t.key_fragment())
}

pub fn pay_prefix(addr: &Address) -> String {
    format!("{PAY}{addr}_")
}

pub fn fee(code: &str, t: &TxTime, seq: u32) -> String {
    format!("{FEE}{code}_{}", fee_id(t, seq))
}

pub fn fee_prefix(code: &str) -> String {
    format!("{FEE}{code}_")
}

/// Fee id fragment: `<sec:010><nsec:09>_<seq>`, unique within a transaction
/// via the sequence counter.
pub fn fee_id(t: &TxTime, seq: u32) -> String {
    format!("{:010}{:09}_{seq}", t.secs(), t.nanos())
}

pub fn unwrap_receipt(ext_tx_id: &str) -> String {
    format!("{UNWRAP}{ext_tx_id}")
}

pub fn prune_receipt(addr: &Address, t: &TxTime) -> String {
    format!("{PRUNE}{addr}_{}", t.key_fragment())
}

/// Exclusive upper bound for a prefix scan: the prefix with its last byte
/// incremented. Keys are ASCII, so this never overflows in practice.
pub fn range_end(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    if let Some(last) = bytes.last_mut() {
        *last += 1;
    }
    String::from_utf8(bytes).expect("prefix stays ASCII")
}

/// The immediate lexicographic successor of a key; turns an inclusive bound
/// into an exclusive one (and a cursor into a resume point).
pub fn key_after(key: &str) -> String {
    format!("{key}\u{0}")
}
