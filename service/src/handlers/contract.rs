//! `contract/*` operations: delegation to the coordination service, plus
//! the coordinator-only execute/cancel callbacks.

use serde_json::{json, Value};
use tessera_ledger::{ContractBridge, ContractDoc, LedgerError};
use tessera_store::Host;
use tessera_types::Kid;

use crate::{config, params};

/// Forward a contract query or vote to the coordination service verbatim;
/// the coordinator authenticates the original submitter itself.
pub fn delegate<H: Host>(
    host: &H,
    _kid: &Kid,
    action: &str,
    call_params: &[&str],
) -> Result<Value, LedgerError> {
    let mut args = vec![action];
    args.extend_from_slice(call_params);
    let response = host
        .invoke(&config::coordinator_service(), &args)
        .map_err(LedgerError::from)?;
    Ok(match serde_json::from_slice::<Value>(&response) {
        Ok(value) => value,
        Err(_) => json!(String::from_utf8_lossy(&response)),
    })
}

/// `contract/execute <contract_id> <document>` — coordinator callback when
/// every signer approved.
pub fn execute<H: Host>(host: &H, call_params: &[&str]) -> Result<Value, LedgerError> {
    assert_coordinator(host)?;
    let contract_id = params::required(call_params, 0, "contract id")?;
    let doc = ContractDoc::parse(params::required(call_params, 1, "document")?)?;
    ContractBridge::new(host, &config::coordinator_service()).execute(contract_id, &doc)
}

/// `contract/cancel <contract_id> <document>` — coordinator callback on
/// expiry or rejection.
pub fn cancel_callback<H: Host>(host: &H, call_params: &[&str]) -> Result<Value, LedgerError> {
    assert_coordinator(host)?;
    let contract_id = params::required(call_params, 0, "contract id")?;
    let doc = ContractDoc::parse(params::required(call_params, 1, "document")?)?;
    ContractBridge::new(host, &config::coordinator_service()).cancel(contract_id, &doc)
}

/// Whether the executing transaction came in from the coordination
/// service. Callback entry points accept nobody else.
pub fn from_coordinator<H: Host>(host: &H) -> bool {
    host.caller_service()
        .is_some_and(|caller| caller == config::coordinator_service())
}

fn assert_coordinator<H: Host>(host: &H) -> Result<(), LedgerError> {
    if from_coordinator(host) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccess)
    }
}
