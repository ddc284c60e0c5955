//! `balance/*` operations.

use serde_json::Value;
use tessera_ledger::{AccountLedger, BalanceLedger, LedgerError, PendingLedger};
use tessera_store::Host;
use tessera_types::Kid;

use crate::params;

use super::page_json;

/// `balance/logs <token|address> [<bookmark>]` — the balance timeline,
/// newest first.
pub fn logs<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let target = params::required(params, 0, "token or address")?;
    let (_, account) = params::resolve_account(host, kid, target)?;
    let page = BalanceLedger::new(host).logs(
        account.address(),
        params::DEFAULT_PAGE_SIZE,
        params::optional(params, 1),
    )?;
    page_json(&page)
}

/// `balance/pending/get <pb_id>`
pub fn pending_get<H: Host>(host: &H, _kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let id = params::required(params, 0, "pending balance id")?;
    let pending = PendingLedger::new(host).get(id)?;
    Ok(serde_json::to_value(&pending)?)
}

/// `balance/pending/list <token|address> [sort] [<bookmark>]` — sorted by
/// `pending_time` (default) or `created_time`.
pub fn pending_list<H: Host>(host: &H, kid: &Kid, params: &[&str]) -> Result<Value, LedgerError> {
    let target = params::required(params, 0, "token or address")?;
    let (_, account) = params::resolve_account(host, kid, target)?;
    let sort = params::optional(params, 1).map(|s| s.trim_start_matches("sort="));
    let by_created = match sort {
        Some("created_time") => true,
        Some("pending_time") | None => false,
        Some(other) => {
            return Err(LedgerError::Other(format!("unknown sort field: {other}")));
        }
    };
    let page = PendingLedger::new(host).list(
        account.address(),
        by_created,
        params::DEFAULT_PAGE_SIZE,
        params::optional(params, 2),
    )?;
    page_json(&page)
}

/// `balance/pending/withdraw <pb_id>` — release a matured pending balance
/// into the holder's account.
pub fn pending_withdraw<H: Host>(
    host: &H,
    kid: &Kid,
    params: &[&str],
) -> Result<Value, LedgerError> {
    let id = params::required(params, 0, "pending balance id")?;
    let pendings = PendingLedger::new(host);
    let pending = pendings.get(id)?;
    let account = AccountLedger::new(host).get(&pending.account)?;
    account.assert_holder(kid)?;

    let balances = BalanceLedger::new(host);
    let mut balance = balances.get_or_create(&pending.account)?;
    pendings.withdraw_by_holder(&pending, &mut balance)?;
    Ok(serde_json::to_value(&balance)?)
}

/// `balance/pending/orphans` — contract escrows that never learned a
/// contract id; repair surface.
pub fn pending_orphans<H: Host>(
    host: &H,
    _kid: &Kid,
    params: &[&str],
) -> Result<Value, LedgerError> {
    let page = PendingLedger::new(host)
        .orphans(params::DEFAULT_PAGE_SIZE, params::optional(params, 0))?;
    page_json(&page)
}
