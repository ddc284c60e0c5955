//! Operation routing.
//!
//! One table maps every operation name to its handler and authentication
//! mode. `contract/cancel` is special: invoked by the coordination service
//! it is the cancel callback, invoked by a user it delegates the
//! cancellation vote to the coordinator.

use serde_json::{json, Value};
use tessera_ledger::LedgerError;
use tessera_store::Host;
use tracing::error;

use crate::{auth, handlers};

/// Every operation this service answers.
pub const OPERATIONS: &[&str] = &[
    "account/create",
    "account/get",
    "account/holder/add",
    "account/holder/remove",
    "account/list",
    "account/suspend",
    "account/unsuspend",
    "balance/logs",
    "balance/pending/get",
    "balance/pending/list",
    "balance/pending/orphans",
    "balance/pending/withdraw",
    "contract/approve",
    "contract/cancel",
    "contract/disapprove",
    "contract/execute",
    "contract/get",
    "contract/list",
    "fee/list",
    "fee/prune",
    "pay",
    "pay/list",
    "pay/prune",
    "pay/refund",
    "token/burn",
    "token/create",
    "token/get",
    "token/mint",
    "transfer",
    "unwrap",
    "ver",
    "wrap",
];

/// Entry point: dispatch one operation and answer JSON bytes, or a plain
/// error message. Responsible messages pass through verbatim; internal
/// failures are logged and collapsed to a generic per-operation message.
pub fn invoke<H: Host>(host: &H, op: &str, params: &[&str]) -> Result<Vec<u8>, String> {
    match route(host, op, params) {
        Ok(value) => serde_json::to_vec(&value).map_err(|e| {
            error!(op, error = %e, "response serialization failed");
            format!("failed to {op}")
        }),
        Err(e) if e.responsible() => Err(e.to_string()),
        Err(e) => {
            error!(op, error = %e, "operation failed");
            Err(format!("failed to {op}"))
        }
    }
}

fn route<H: Host>(host: &H, op: &str, params: &[&str]) -> Result<Value, LedgerError> {
    use handlers::{account, balance, contract, fee, pay, token, transfer, wrap};

    match op {
        // ── Account ─────────────────────────────────────────────────────
        "account/create" => account::create(host, &auth::authenticate(host, true)?, params),
        "account/get" => account::get(host, &auth::authenticate(host, false)?, params),
        "account/list" => account::list(host, &auth::authenticate(host, false)?, params),
        "account/holder/add" => account::holder_add(host, &auth::authenticate(host, true)?, params),
        "account/holder/remove" => {
            account::holder_remove(host, &auth::authenticate(host, true)?, params)
        }
        "account/suspend" => account::suspend(host, &auth::authenticate(host, true)?, params),
        "account/unsuspend" => account::unsuspend(host, &auth::authenticate(host, true)?, params),

        // ── Balance ─────────────────────────────────────────────────────
        "balance/logs" => balance::logs(host, &auth::authenticate(host, false)?, params),
        "balance/pending/get" => {
            balance::pending_get(host, &auth::authenticate(host, false)?, params)
        }
        "balance/pending/list" => {
            balance::pending_list(host, &auth::authenticate(host, false)?, params)
        }
        "balance/pending/orphans" => {
            balance::pending_orphans(host, &auth::authenticate(host, false)?, params)
        }
        "balance/pending/withdraw" => {
            balance::pending_withdraw(host, &auth::authenticate(host, true)?, params)
        }

        // ── Pay ─────────────────────────────────────────────────────────
        "pay" => pay::pay(host, &auth::authenticate(host, true)?, params),
        "pay/refund" => pay::refund(host, &auth::authenticate(host, true)?, params),
        "pay/prune" => pay::prune(host, &auth::authenticate(host, true)?, params),
        "pay/list" => pay::list(host, &auth::authenticate(host, false)?, params),

        // ── Transfer ────────────────────────────────────────────────────
        "transfer" => transfer::transfer(host, &auth::authenticate(host, true)?, params),

        // ── Token ───────────────────────────────────────────────────────
        "token/create" => token::create(host, &auth::authenticate(host, true)?, params),
        "token/get" => token::get(host, &auth::authenticate(host, false)?, params),
        "token/mint" => token::mint(host, &auth::authenticate(host, true)?, params),
        "token/burn" => token::burn(host, &auth::authenticate(host, true)?, params),

        // ── Fee ─────────────────────────────────────────────────────────
        "fee/list" => fee::list(host, &auth::authenticate(host, false)?, params),
        "fee/prune" => fee::prune(host, &auth::authenticate(host, true)?, params),

        // ── Wrap ────────────────────────────────────────────────────────
        "wrap" => wrap::wrap(host, &auth::authenticate(host, true)?, params),
        "unwrap" => wrap::unwrap(host, &auth::authenticate(host, true)?, params),

        // ── Contract ────────────────────────────────────────────────────
        "contract/execute" => contract::execute(host, params),
        "contract/cancel" if contract::from_coordinator(host) => {
            contract::cancel_callback(host, params)
        }
        "contract/approve" | "contract/cancel" | "contract/disapprove" => {
            let kid = auth::authenticate(host, true)?;
            let action = op.trim_start_matches("contract/");
            contract::delegate(host, &kid, action, params)
        }
        "contract/get" | "contract/list" => {
            let kid = auth::authenticate(host, false)?;
            let action = op.trim_start_matches("contract/");
            contract::delegate(host, &kid, action, params)
        }

        "ver" => Ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),

        other => Err(LedgerError::Other(format!("unknown operation: {other}"))),
    }
}
