//! End-to-end scenarios driving the public ledger API over the in-memory
//! host, including the conservation audit across mixed operations.

use std::collections::BTreeSet;

use tessera_ledger::{
    Account, AccountLedger, Balance, BalanceLedger, ContractBridge, ContractDoc, FeeLedger,
    LogType, PayChunk, PayLedger, PendingBalance, TokenRegistry, WrapLedger,
};
use tessera_store::{keys, Host, MemHost, StoreError};
use tessera_types::{Amount, Kid, TxTime};

fn kid(n: u8) -> Kid {
    Kid::new(&format!("{:040x}", n)).unwrap()
}

fn coordinator_host() -> MemHost {
    let host = MemHost::new();
    host.set_invoke_handler(|service, args| {
        if service == "contract" && args.first() == Some(&"create") {
            Ok(b"ctr-1".to_vec())
        } else {
            Err(StoreError::Invoke {
                service: service.to_owned(),
                message: "unexpected invoke".into(),
            })
        }
    });
    host
}

fn balance_of(host: &MemHost, account: &Account) -> Balance {
    BalanceLedger::new(host)
        .get_or_create(account.address())
        .unwrap()
}

/// Sum of all balances, unpruned chunks, and escrowed value for one token,
/// which conservation says must equal the recorded supply plus unpruned
/// fees (fees leave the payer at debit time but only reach the genesis
/// balance at fee-prune time).
fn audit(host: &MemHost, code: &str) -> Amount {
    let mut total = Amount::zero();
    for key in host.keys_with_prefix(keys::BALANCE) {
        let balance: Balance =
            serde_json::from_slice(&host.get_state(&key).unwrap().unwrap()).unwrap();
        if balance.address.code() == code {
            total = total.add(&balance.amount);
        }
    }
    for key in host.keys_with_prefix(keys::PAY) {
        let chunk: PayChunk =
            serde_json::from_slice(&host.get_state(&key).unwrap().unwrap()).unwrap();
        if chunk.owner.code() != code {
            continue;
        }
        let owner_balance = BalanceLedger::new(host).get_or_create(&chunk.owner).unwrap();
        let pruned = owner_balance
            .last_pruned_pay_id
            .as_deref()
            .is_some_and(|cursor| chunk.key.as_str() <= cursor);
        if !pruned {
            total = total.add(&chunk.amount);
        }
    }
    for key in host.keys_with_prefix(keys::PENDING_BALANCE) {
        let pending: PendingBalance =
            serde_json::from_slice(&host.get_state(&key).unwrap().unwrap()).unwrap();
        if pending.account.code() == code {
            total = total.add(&pending.total());
        }
    }
    for key in host.keys_with_prefix(&format!("{}{}_", keys::FEE, code)) {
        let value = host.get_state(&key).unwrap().unwrap();
        let record: tessera_ledger::FeeRecord = serde_json::from_slice(&value).unwrap();
        // Unpruned fees are in flight between payer and genesis.
        let token = TokenRegistry::new(host).get(code).unwrap();
        let pruned = token
            .last_pruned_fee_id
            .as_deref()
            .is_some_and(|cursor| record.id.as_str() <= cursor);
        if !pruned {
            total = total.add(&record.amount);
        }
    }
    total
}

struct World {
    host: MemHost,
    payer: Account,
    merchant: Account,
}

fn world_with_policy(policy: Option<&str>) -> World {
    let host = coordinator_host();
    host.begin_tx("tx-create", TxTime::new(1_000, 0));
    let operator: BTreeSet<Kid> = [kid(9)].into();
    let registry = TokenRegistry::new(&host);
    let mut token = registry
        .create(
            "AUD",
            2,
            Amount::from_i64(1_000_000),
            Amount::zero(),
            &operator,
            &kid(9),
        )
        .unwrap();
    if let Some(text) = policy {
        token.fee_policy = Some(text.to_owned());
        registry.put(&token).unwrap();
        tessera_ledger::refresh_fee_policy("AUD");
    }

    let accounts = AccountLedger::new(&host);
    let payer = accounts.create_personal("AUD", &kid(1)).unwrap();
    let merchant = accounts.create_personal("AUD", &kid(2)).unwrap();

    // Mint into genesis, then move spending money to the payer.
    host.begin_tx("tx-mint", TxTime::new(1_010, 0));
    registry.mint(&mut token, &Amount::from_i64(100_000)).unwrap();

    host.begin_tx("tx-fund", TxTime::new(1_020, 0));
    let balances = BalanceLedger::new(&host);
    let mut genesis = balances.get_or_create(&token.genesis_account).unwrap();
    balances
        .apply(
            &mut genesis,
            &Amount::from_i64(-50_000),
            LogType::Send,
            None,
            Some(payer.address().to_string()),
            None,
        )
        .unwrap();
    let mut payer_balance = balances.get_or_create(payer.address()).unwrap();
    balances
        .apply(
            &mut payer_balance,
            &Amount::from_i64(50_000),
            LogType::Receive,
            None,
            Some(token.genesis_account.to_string()),
            None,
        )
        .unwrap();

    World {
        host,
        payer,
        merchant,
    }
}

#[test]
fn conservation_holds_across_mixed_operations() {
    let w = world_with_policy(Some("pay=0.01"));
    let registry = TokenRegistry::new(&w.host);
    let token = registry.get("AUD").unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    // A pay with a 1% fee.
    w.host.begin_tx("tx-pay", TxTime::new(1_100, 0));
    let pays = PayLedger::new(&w.host);
    let (chunk, _) = pays
        .pay(
            &token,
            &w.payer,
            &w.merchant,
            &Amount::from_i64(10_000),
            Some("order-1"),
        )
        .unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    // A partial refund.
    w.host.begin_tx("tx-refund", TxTime::new(1_200, 0));
    pays.refund(&token, &w.merchant, &chunk.key, &Amount::from_i64(2_500), None)
        .unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    // Merchant folds the history.
    w.host.begin_tx("tx-prune", TxTime::new(10_000, 0));
    let mut merchant_balance = balance_of(&w.host, &w.merchant);
    let fold = pays
        .prune(&w.merchant, &mut merchant_balance, None, false)
        .unwrap();
    assert_eq!(fold.sum, 7_500);
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    // Genesis settles the accrued fee.
    w.host.begin_tx("tx-fee-prune", TxTime::new(10_100, 0));
    let mut token = registry.get("AUD").unwrap();
    let fee_fold = FeeLedger::new(&w.host)
        .prune(&mut token, None, false)
        .unwrap();
    assert_eq!(fee_fold.sum, 100);
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    // An escrowed multi-sig pay keeps the audit stable too.
    w.host.begin_tx("tx-defer", TxTime::new(10_200, 0));
    let bridge = ContractBridge::new(&w.host, "contract");
    let signers: BTreeSet<Kid> = [kid(1), kid(7)].into();
    let sender_address = w.payer.address().clone();
    let receiver_address = w.merchant.address().clone();
    let mut payer_balance = balance_of(&w.host, &w.payer);
    bridge
        .defer_with_escrow(
            &mut payer_balance,
            Amount::from_i64(1_000),
            None,
            |pb_id| {
                ContractDoc::pay(
                    pb_id,
                    &sender_address,
                    &receiver_address,
                    &Amount::from_i64(1_000),
                    "",
                )
            },
            3_600,
            &signers,
            None,
        )
        .unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);
}

#[test]
fn prune_cursor_is_monotonic() {
    let w = world_with_policy(None);
    let registry = TokenRegistry::new(&w.host);
    let token = registry.get("AUD").unwrap();
    let pays = PayLedger::new(&w.host);

    let mut cursors = Vec::new();
    for round in 0..3 {
        let secs = 2_000 + round * 100;
        w.host
            .begin_tx(&format!("tx-pay-{round}"), TxTime::new(secs, 0));
        pays.pay(&token, &w.payer, &w.merchant, &Amount::from_i64(10), None)
            .unwrap();

        w.host
            .begin_tx(&format!("tx-prune-{round}"), TxTime::new(secs + 50, 0));
        let mut merchant_balance = balance_of(&w.host, &w.merchant);
        pays.prune(&w.merchant, &mut merchant_balance, None, false)
            .unwrap();
        cursors.push(merchant_balance.last_pruned_pay_id.unwrap());
    }
    assert!(cursors.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn locked_transfer_releases_through_pending_withdraw() {
    let w = world_with_policy(None);
    let registry = TokenRegistry::new(&w.host);
    let token = registry.get("AUD").unwrap();

    // Deferred transfer with a future lock: escrow, execute, then the
    // receiver withdraws after the release time.
    w.host.begin_tx("tx-defer", TxTime::new(2_000, 0));
    let bridge = ContractBridge::new(&w.host, "contract");
    let signers: BTreeSet<Kid> = [kid(1), kid(7)].into();
    let sender_address = w.payer.address().clone();
    let receiver_address = w.merchant.address().clone();
    let mut payer_balance = balance_of(&w.host, &w.payer);
    let mut doc_holder = None;
    let op = bridge
        .defer_with_escrow(
            &mut payer_balance,
            Amount::from_i64(500),
            None,
            |pb_id| {
                let doc = ContractDoc::transfer(
                    pb_id,
                    &sender_address,
                    &receiver_address,
                    &Amount::from_i64(500),
                    "",
                    3_000,
                );
                doc_holder = Some(doc.clone());
                doc
            },
            3_600,
            &signers,
            None,
        )
        .unwrap();
    assert_eq!(balance_of(&w.host, &w.payer).amount, 49_500);

    w.host.begin_tx("tx-exec", TxTime::new(2_100, 0));
    bridge.execute(&op.contract_id, &doc_holder.unwrap()).unwrap();
    // Locked: no balance movement yet.
    assert!(balance_of(&w.host, &w.merchant).amount.is_zero());

    let pendings = tessera_ledger::PendingLedger::new(&w.host);
    let page = pendings.list(&receiver_address, false, 10, None).unwrap();
    assert_eq!(page.entries.len(), 1);
    let held: PendingBalance = serde_json::from_slice(&page.entries[0].value).unwrap();

    // Before the lock passes, withdraw is refused.
    w.host.begin_tx("tx-early", TxTime::new(2_500, 0));
    let mut merchant_balance = balance_of(&w.host, &w.merchant);
    assert!(pendings
        .withdraw_by_holder(&held, &mut merchant_balance)
        .is_err());

    // After it passes, the credit lands.
    w.host.begin_tx("tx-withdraw", TxTime::new(3_100, 0));
    pendings
        .withdraw_by_holder(&held, &mut merchant_balance)
        .unwrap();
    assert_eq!(merchant_balance.amount, 500);
    assert_eq!(audit(&w.host, "AUD"), token.supply);
}

#[test]
fn suspended_accounts_move_no_value() {
    let w = world_with_policy(None);
    let registry = TokenRegistry::new(&w.host);
    let token = registry.get("AUD").unwrap();

    w.host.begin_tx("tx-suspend", TxTime::new(2_000, 0));
    let accounts = AccountLedger::new(&w.host);
    let suspended = accounts.suspend(w.payer.address(), &kid(1)).unwrap();

    w.host.begin_tx("tx-pay", TxTime::new(2_100, 0));
    let pays = PayLedger::new(&w.host);
    assert!(pays
        .pay(&token, &suspended, &w.merchant, &Amount::from_i64(10), None)
        .is_err());

    // Unsuspend and the same pay goes through.
    w.host.begin_tx("tx-unsuspend", TxTime::new(2_200, 0));
    let active = accounts.unsuspend(w.payer.address(), &kid(1)).unwrap();
    w.host.begin_tx("tx-pay-2", TxTime::new(2_300, 0));
    pays.pay(&token, &active, &w.merchant, &Amount::from_i64(10), None)
        .unwrap();
}

#[test]
fn wrap_unwrap_round_trip_conserves() {
    let w = world_with_policy(None);
    let registry = TokenRegistry::new(&w.host);
    let mut token = registry.get("AUD").unwrap();

    // Configure a bridge held by the operator.
    w.host.begin_tx("tx-bridge", TxTime::new(2_000, 0));
    let accounts = AccountLedger::new(&w.host);
    let bridge_account = accounts.create_personal("AUD", &kid(9)).unwrap();
    token.wrap_bridge = Some(
        [("ETH".to_owned(), bridge_account.address().clone())]
            .into_iter()
            .collect(),
    );
    registry.put(&token).unwrap();

    w.host.begin_tx("tx-wrap", TxTime::new(2_100, 0));
    let wraps = WrapLedger::new(&w.host);
    wraps
        .wrap(
            &token,
            &w.payer,
            &Amount::from_i64(2_000),
            &Amount::from_i64(20),
            "ETH",
            "0xdest",
            None,
        )
        .unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);

    w.host.begin_tx("tx-unwrap", TxTime::new(2_200, 0));
    wraps
        .unwrap(
            &token,
            &w.merchant,
            &Amount::from_i64(1_500),
            "ETH",
            "0xsrc",
            "ext-tx-9",
            None,
            &kid(9),
        )
        .unwrap();
    assert_eq!(audit(&w.host, "AUD"), token.supply);
    assert_eq!(balance_of(&w.host, &w.merchant).amount, 1_500);

    // At most once per external transaction id.
    w.host.begin_tx("tx-unwrap-2", TxTime::new(2_300, 0));
    assert!(wraps
        .unwrap(
            &token,
            &w.merchant,
            &Amount::from_i64(1_500),
            "ETH",
            "0xsrc",
            "ext-tx-9",
            None,
            &kid(9),
        )
        .is_err());
}
