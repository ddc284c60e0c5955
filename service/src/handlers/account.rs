//! `account/*` operations.

use serde_json::{json, Value};
use tessera_ledger::{AccountLedger, BalanceLedger, LedgerError, TokenRegistry};
use tessera_store::Host;
use tessera_types::{Address, Kid};

use crate::params;

use super::page_json;

/// `account/create <token>` — the caller's personal account for a token.
pub fn create<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let code = params::required(params, 0, "token")?.to_ascii_uppercase();
    // The token must be issued before accounts attach to it.
    TokenRegistry::new(host).get(&code)?;
    let account = AccountLedger::new(host).create_personal(&code, kid)?;
    Ok(serde_json::to_value(&account)?)
}

/// `account/get <token|address>` — the account plus its current balance.
pub fn get<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let target = params::required(params, 0, "token or address")?;
    let (_, account) = params::resolve_account(host, kid, target)?;
    let balance = BalanceLedger::new(host).get_or_create(account.address())?;
    Ok(json!({ "account": account, "balance": balance.amount }))
}

/// `account/list [<token>] [<bookmark>]` — accounts the caller holds.
pub fn list<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let (token, bookmark) = match (params::optional(params, 0), params::optional(params, 1)) {
        (Some(first), second @ Some(_)) => (Some(first.to_ascii_uppercase()), second),
        (Some(first), None) if params::is_token_code(first) => {
            (Some(first.to_ascii_uppercase()), None)
        }
        (first, _) => (None, first),
    };
    let page = AccountLedger::new(host).list_by_holder(
        kid,
        token.as_deref(),
        params::DEFAULT_PAGE_SIZE,
        bookmark,
    )?;
    page_json(&page)
}

/// `account/holder/add <address> <kid>`
pub fn holder_add<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let address = Address::parse(params::required(params, 0, "address")?)?;
    let holder = Kid::new(params::required(params, 1, "kid")?)
        .map_err(LedgerError::InvalidAccountAddr)?;
    let account = AccountLedger::new(host).add_holder(&address, &holder, kid)?;
    Ok(serde_json::to_value(&account)?)
}

/// `account/holder/remove <address> <kid>`
pub fn holder_remove<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let address = Address::parse(params::required(params, 0, "address")?)?;
    let holder = Kid::new(params::required(params, 1, "kid")?)
        .map_err(LedgerError::InvalidAccountAddr)?;
    let account = AccountLedger::new(host).remove_holder(&address, &holder, kid)?;
    Ok(serde_json::to_value(&account)?)
}

/// `account/suspend <address>`
pub fn suspend<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let address = Address::parse(params::required(params, 0, "address")?)?;
    let account = AccountLedger::new(host).suspend(&address, kid)?;
    Ok(serde_json::to_value(&account)?)
}

/// `account/unsuspend <address>`
pub fn unsuspend<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let address = Address::parse(params::required(params, 0, "address")?)?;
    let account = AccountLedger::new(host).unsuspend(&address, kid)?;
    Ok(serde_json::to_value(&account)?)
}
