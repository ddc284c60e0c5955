//! `fee/*` operations.

use serde_json::{json, Value};
use tessera_ledger::{FeeLedger, LedgerError, TokenRegistry};
use tessera_store::Host;
use tessera_types::Kid;

use crate::params;

use super::page_json;

/// `fee/list <code> [bookmark] [size] [start] [end]`
pub fn list<H: Host>(host: &H, _kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let code = params::required(call_params, 0, "code")?.to_ascii_uppercase();
    TokenRegistry::new(host).get(&code)?;
    let bookmark = params::optional(call_params, 1);
    let size = params::page_size(params::optional(call_params, 2))?;
    let start = match params::optional(call_params, 3) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };
    let end = match params::optional(call_params, 4) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };
    let page = FeeLedger::new(host).list(&code, start, end, size, bookmark)?;
    page_json(&page)
}

/// `fee/prune <code> <safe> [end_time_seconds]` — genesis holders fold
/// accrued fees into the genesis balance.
pub fn prune<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let code = params::required(call_params, 0, "code")?.to_ascii_uppercase();
    let safe = params::boolean(params::required(call_params, 1, "safe flag")?);
    let until = match params::optional(call_params, 2) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };

    let registry = TokenRegistry::new(host);
    let mut token = registry.get(&code)?;
    registry.genesis_account(&token)?.assert_holder(kid)?;

    let fold = FeeLedger::new(host).prune(&mut token, until, safe)?;
    Ok(json!({
        "sum": fold.sum,
        "start_key": fold.start_key,
        "end_key": fold.end_key,
        "next_key": fold.next_key,
        "last_pruned_fee_id": token.last_pruned_fee_id,
    }))
}
