//! The `transfer` operation.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tessera_ledger::{
    AccountLedger, BalanceLedger, ContractBridge, ContractDoc, FeeLedger, LedgerError, LogType,
    PendingLedger, TokenRegistry,
};
use tessera_store::Host;
use tessera_types::{Address, Kid, TxTime};

use crate::{config, params};

use super::DEFAULT_CONTRACT_EXPIRY_SECS;

/// `transfer <sender|empty> <receiver> <amount> [memo] [lock_until]
/// [expiry] [extra_signers…]`
///
/// Multi-holder senders and explicit extra signers defer through the
/// contract bridge, mirroring `pay`. A future `lock_until` turns the
/// receiver's credit into a pending balance they withdraw once the lock
/// passes.
pub fn transfer<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let receiver_address = Address::parse(params::required(call_params, 1, "receiver")?)?;
    let amount = params::positive_amount(params::required(call_params, 2, "amount")?)?;
    let memo = params::memo(params::optional(call_params, 3))?;
    let lock_until = match params::optional(call_params, 4) {
        Some(text) => params::integer(text)?,
        None => 0,
    };
    let expiry = match params::optional(call_params, 5) {
        Some(text) => params::integer(text)?,
        None => DEFAULT_CONTRACT_EXPIRY_SECS,
    };

    let sender = params::resolve_sender(
        host,
        kid,
        params::optional(call_params, 0).unwrap_or(""),
        &receiver_address,
    )?;
    sender.assert_holder(kid)?;
    let accounts = AccountLedger::new(host);
    let receiver = accounts.get(&receiver_address)?;
    if sender.address() == receiver.address() {
        return Err(LedgerError::Other("sender and receiver must differ".into()));
    }
    if sender.token() != receiver.token() {
        return Err(LedgerError::Other("not an account of this token".into()));
    }
    sender.assert_not_suspended()?;
    receiver.assert_not_suspended()?;
    let token = TokenRegistry::new(host).get(sender.token())?;

    let mut signers: BTreeSet<Kid> = sender.signers();
    for extra in call_params.iter().skip(6) {
        if extra.is_empty() {
            continue;
        }
        signers.insert(Kid::new(extra).map_err(LedgerError::InvalidAccountAddr)?);
    }

    let fees = FeeLedger::new(host);
    let balances = BalanceLedger::new(host);

    if signers.len() > 1 {
        let fee = fees.quote_fee(&token, "transfer", &amount)?;
        let bridge = ContractBridge::new(host, &config::coordinator_service());
        let mut balance = balances.get_or_create(sender.address())?;
        let sender_address = sender.address().clone();
        let op = bridge.defer_with_escrow(
            &mut balance,
            amount.clone(),
            Some(fee),
            |pb_id| {
                ContractDoc::transfer(
                    pb_id,
                    &sender_address,
                    &receiver_address,
                    &amount,
                    memo.unwrap_or(""),
                    lock_until,
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

    // Synchronous path: debit the sender with the fee folded in, then land
    // the credit (or hold it until the lock passes).
    let fee = fees.apply_fee(&token, "transfer", sender.address(), &amount)?;
    let mut sender_balance = balances.get_or_create(sender.address())?;
    let log = balances.apply(
        &mut sender_balance,
        &amount.add(&fee).neg(),
        LogType::Send,
        memo,
        Some(receiver_address.to_string()),
        None,
    )?;

    let now = host.tx_time();
    if lock_until > now.secs() {
        let held = PendingLedger::new(host).hold(
            &receiver_address,
            amount,
            sender.address(),
            TxTime::new(lock_until, 0),
        )?;
        return Ok(json!({ "log": log, "pending_balance_id": held.id }));
    }

    let mut receiver_balance = balances.get_or_create(&receiver_address)?;
    balances.apply(
        &mut receiver_balance,
        &amount,
        LogType::Receive,
        memo,
        Some(sender.address().to_string()),
        None,
    )?;
    Ok(serde_json::to_value(&log)?)
}
