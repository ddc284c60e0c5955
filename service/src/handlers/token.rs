//! `token/*` operations.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tessera_ledger::{ContractBridge, ContractDoc, LedgerError, TokenRegistry};
use tessera_store::Host;
use tessera_types::Kid;

use crate::{config, params};

use super::DEFAULT_CONTRACT_EXPIRY_SECS;

/// `token/create <code> <decimal> <max> <initial> [coholders…]`
///
/// With co-holders the creation itself needs every operator's signature,
/// so it defers as a contract; alone, the caller issues directly.
pub fn create<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let code = params::required(call_params, 0, "code")?.to_ascii_uppercase();
    let decimal = params::integer(params::required(call_params, 1, "decimal")?)?;
    if !(0..=255).contains(&decimal) {
        return Err(LedgerError::InvalidAmount("decimal out of range".into()));
    }
    let max_supply = params::non_negative_amount(params::required(call_params, 2, "max supply")?)?;
    let initial_supply =
        params::non_negative_amount(params::required(call_params, 3, "initial supply")?)?;

    let mut holders: BTreeSet<Kid> = [kid.clone()].into();
    for extra in call_params.iter().skip(4) {
        if extra.is_empty() {
            continue;
        }
        holders.insert(Kid::new(extra).map_err(LedgerError::InvalidAccountAddr)?);
    }

    let registry = TokenRegistry::new(host);
    if holders.len() > 1 {
        // Reject early what the executor would reject later.
        tessera_types::address::validate_code(&code)?;
        if registry.get(&code).is_ok() {
            return Err(LedgerError::ExistedToken(code));
        }
        let doc = ContractDoc::create(&code, decimal as u8, &max_supply, &initial_supply, &holders);
        let bridge = ContractBridge::new(host, &config::coordinator_service());
        let op = bridge.defer(&doc, DEFAULT_CONTRACT_EXPIRY_SECS, &holders)?;
        return Ok(json!({ "contract_id": op.contract_id }));
    }

    let token = registry.create(&code, decimal as u8, max_supply, initial_supply, &holders, kid)?;
    Ok(serde_json::to_value(&token)?)
}

/// `token/get <code>`
pub fn get<H: Host>(host: &H, _kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let code = params::required(call_params, 0, "code")?.to_ascii_uppercase();
    let token = TokenRegistry::new(host).get(&code)?;
    Ok(serde_json::to_value(&token)?)
}

/// `token/mint <code> <amount>` — genesis holders only; a joint genesis
/// with several operators defers as a contract.
pub fn mint<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    operate(host, kid, call_params, true)
}

/// `token/burn <code> <amount>` — same authority rules as mint.
pub fn burn<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    operate(host, kid, call_params, false)
}

fn operate<H: Host>(
    host: &H,
    kid: &Kid,
    call_params: &[&str],
    minting: bool,
) -> Result<Value, LedgerError> {
    let code = params::required(call_params, 0, "code")?.to_ascii_uppercase();
    let amount = params::positive_amount(params::required(call_params, 1, "amount")?)?;

    let registry = TokenRegistry::new(host);
    let mut token = registry.get(&code)?;
    let genesis = registry.genesis_account(&token)?;
    genesis.assert_holder(kid)?;

    let signers = genesis.signers();
    if signers.len() > 1 {
        let doc = if minting {
            ContractDoc::mint(&code, &amount)
        } else {
            ContractDoc::burn(&code, &amount)
        };
        let bridge = ContractBridge::new(host, &config::coordinator_service());
        let op = bridge.defer(&doc, DEFAULT_CONTRACT_EXPIRY_SECS, &signers)?;
        return Ok(json!({ "contract_id": op.contract_id }));
    }

    let supply = if minting {
        registry.mint(&mut token, &amount)?
    } else {
        registry.burn(&mut token, &amount)?
    };
    Ok(json!({ "token": code, "supply": supply }))
}
