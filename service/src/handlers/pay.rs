//! `pay` and `pay/*` operations.

use serde_json::{json, Value};
use tessera_ledger::{
    AccountLedger, BalanceLedger, ContractBridge, ContractDoc, FeeLedger, LedgerError, PayLedger,
    TokenRegistry,
};
use tessera_store::Host;
use tessera_types::{Address, Kid};

use crate::{config, params};

use super::{page_json, DEFAULT_CONTRACT_EXPIRY_SECS};

/// `pay <sender|empty> <receiver> <amount> [memo] [expiry]`
///
/// A single-signer sender pays synchronously. A joint sender with several
/// holders escrows the value and opens a contract instead; the chunk is
/// written when the last holder approves.
pub fn pay<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let receiver_address = Address::parse(params::required(call_params, 1, "receiver")?)?;
    let amount = params::positive_amount(params::required(call_params, 2, "amount")?)?;
    let memo = params::memo(params::optional(call_params, 3))?;

    let sender = params::resolve_sender(
        host,
        kid,
        params::optional(call_params, 0).unwrap_or(""),
        &receiver_address,
    )?;
    sender.assert_holder(kid)?;
    let accounts = AccountLedger::new(host);
    let receiver = accounts.get(&receiver_address)?;
    let token = TokenRegistry::new(host).get(sender.token())?;

    let signers = sender.signers();
    if signers.len() > 1 {
        sender.assert_not_suspended()?;
        receiver.assert_not_suspended()?;
        let expiry = match params::optional(call_params, 4) {
            Some(text) => params::integer(text)?,
            None => DEFAULT_CONTRACT_EXPIRY_SECS,
        };
        let fee = FeeLedger::new(host).quote_fee(&token, "pay", &amount)?;
        let bridge = ContractBridge::new(host, &config::coordinator_service());
        let mut balance = BalanceLedger::new(host).get_or_create(sender.address())?;
        let sender_address = sender.address().clone();
        let op = bridge.defer_with_escrow(
            &mut balance,
            amount.clone(),
            Some(fee),
            |pb_id| {
                ContractDoc::pay(
                    pb_id,
                    &sender_address,
                    &receiver_address,
                    &amount,
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

    let (_, log) = PayLedger::new(host).pay(&token, &sender, &receiver, &amount, memo)?;
    Ok(serde_json::to_value(&log)?)
}

/// `pay/refund <original_pay_key> <amount> [memo]` — issued by the holder
/// of the account that received the original pay.
pub fn refund<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let parent_key = params::required(call_params, 0, "original pay key")?;
    let amount = params::positive_amount(params::required(call_params, 1, "amount")?)?;
    let memo = params::memo(params::optional(call_params, 2))?;

    let pays = PayLedger::new(host);
    let parent = pays.get_chunk(parent_key)?;
    let merchant = AccountLedger::new(host).get(&parent.owner)?;
    merchant.assert_holder(kid)?;
    let token = TokenRegistry::new(host).get(merchant.token())?;

    let (_, log) = pays.refund(&token, &merchant, parent_key, &amount, memo)?;
    Ok(serde_json::to_value(&log)?)
}

/// `pay/prune <token|address> <safe> [end_time_seconds]`
pub fn prune<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let target = params::required(call_params, 0, "token or address")?;
    let safe = params::boolean(params::required(call_params, 1, "safe flag")?);
    let until = match params::optional(call_params, 2) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };

    let (_, owner) = params::resolve_account(host, kid, target)?;
    owner.assert_holder(kid)?;
    let mut balance = BalanceLedger::new(host).get_or_create(owner.address())?;
    let fold = PayLedger::new(host).prune(&owner, &mut balance, until, safe)?;
    Ok(json!({
        "sum": fold.sum,
        "start_key": fold.start_key,
        "end_key": fold.end_key,
        "next_key": fold.next_key,
        "balance": balance.amount,
    }))
}

/// `pay/list <token|address> [asc|desc] [bookmark] [size] [start] [end]`
pub fn list<H: Host>(host: &H, kid: &Kid, call_params: &[&str]) -> Result<Value, LedgerError> {
    let target = params::required(call_params, 0, "token or address")?;
    let (_, owner) = params::resolve_account(host, kid, target)?;
    let ascending = match params::optional(call_params, 1) {
        Some("asc") => true,
        Some("desc") | None => false,
        Some(other) => {
            return Err(LedgerError::Other(format!("unknown sort order: {other}")));
        }
    };
    let bookmark = params::optional(call_params, 2);
    let size = params::page_size(params::optional(call_params, 3))?;
    let start = match params::optional(call_params, 4) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };
    let end = match params::optional(call_params, 5) {
        Some(text) => Some(params::integer(text)?),
        None => None,
    };
    let page = PayLedger::new(host).list(owner.address(), ascending, start, end, size, bookmark)?;
    page_json(&page)
}
