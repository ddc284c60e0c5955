//! `wrap` and `unwrap` operations.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tessera_ledger::{
    AccountLedger, BalanceLedger, ContractBridge, ContractDoc, LedgerError, TokenRegistry,
    WrapLedger,
};
use tessera_store::Host;
use tessera_types::{Address, Kid};

use crate::{config, params};

use super::DEFAULT_CONTRACT_EXPIRY_SECS;

/// `wrap <sender> <ext_code> <ext_id> <amount> <fee> [memo] [expiry]
/// [extra_signers…]`
pub fn wrap<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let sender_address = Address::parse(params::required(call_params, 0, "sender")?)?;
    let ext_code = params::required(call_params, 1, "external chain code")?;
    let ext_id = params::required(call_params, 2, "external address")?;
    let amount = params::positive_amount(params::required(call_params, 3, "amount")?)?;
    let fee = params::non_negative_amount(params::required(call_params, 4, "fee")?)?;
    let memo = params::memo(params::optional(call_params, 5))?;
    let expiry = match params::optional(call_params, 6) {
        Some(text) => params::integer(text)?,
        None => DEFAULT_CONTRACT_EXPIRY_SECS,
    };

    let sender = AccountLedger::new(host).get(&sender_address)?;
    sender.assert_holder(kid)?;
    let token = TokenRegistry::new(host).get(sender.token())?;
    // The bridge must be configured before anything is escrowed.
    token.bridge_account(ext_code)?;

    let mut signers: BTreeSet<Kid> = sender.signers();
    for extra in call_params.iter().skip(7) {
        if extra.is_empty() {
            continue;
        }
        signers.insert(Kid::new(extra).map_err(LedgerError::InvalidAccountAddr)?);
    }

    if signers.len() > 1 {
        sender.assert_not_suspended()?;
        let bridge = ContractBridge::new(host, &config::coordinator_service());
        let mut balance = BalanceLedger::new(host).get_or_create(sender.address())?;
        let op = bridge.defer_with_escrow(
            &mut balance,
            amount.clone(),
            Some(fee.clone()),
            |pb_id| {
                ContractDoc::wrap(
                    pb_id,
                    &sender_address,
                    ext_code,
                    ext_id,
                    &amount,
                    &fee,
                    memo.unwrap_or(""),
                )
            },
            expiry,
            &signers,
            memo,
        )?;
        return Ok(json!({
            "pending_balance_id": op.pending_balance_id,
            "contract_id": op.contract_id,
        }));
    }

    let log = WrapLedger::new(host).wrap(&token, &sender, &amount, &fee, ext_code, ext_id, memo)?;
    Ok(serde_json::to_value(&log)?)
}

/// `unwrap <receiver> <ext_code> <ext_id> <ext_tx_id> <amount> [memo]` —
/// settled by a bridge holder, at most once per external transaction.
pub fn unwrap<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let receiver_address = Address::parse(params::required(call_params, 0, "receiver")?)?;
    let ext_code = params::required(call_params, 1, "external chain code")?;
    let ext_id = params::required(call_params, 2, "external address")?;
    let ext_tx_id = params::required(call_params, 3, "external transaction id")?;
    let amount = params::positive_amount(params::required(call_params, 4, "amount")?)?;
    let memo = params::memo(params::optional(call_params, 5))?;

    let receiver = AccountLedger::new(host).get(&receiver_address)?;
    let token = TokenRegistry::new(host).get(receiver.token())?;
    let log = WrapLedger::new(host).unwrap(
        &token,
        &receiver,
        &amount,
        ext_code,
        ext_id,
        ext_tx_id,
        memo,
        kid,
    )?;
    Ok(serde_json::to_value(&log)?)
}
