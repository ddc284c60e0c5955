//! Operation handlers, one module per operation family.

pub mod account;
pub mod balance;
pub mod contract;
pub mod fee;
pub mod pay;
pub mod token;
pub mod transfer;
pub mod wrap;

use serde_json::{json, Value};
use tessera_ledger::LedgerError;
use tessera_store::KvPage;

/// How long a contract stays open when the caller gives no expiry.
pub const DEFAULT_CONTRACT_EXPIRY_SECS: i64 = 7 * 24 * 3600;

/// Render a result page as `{entries, bookmark}` with decoded documents.
pub(crate) fn page_json(page: &KvPage) -> Result<Value, LedgerError> {
    let mut entries = Vec::with_capacity(page.entries.len());
    for entry in &page.entries {
        let doc: Value = serde_json::from_slice(&entry.value)
            .map_err(|e| LedgerError::Internal(format!("undecodable document: {e}")))?;
        entries.push(doc);
    }
    Ok(json!({ "entries": entries, "bookmark": page.bookmark }))
}
