//! The pay-chunk engine.
//!
//! A payment debits the payer immediately and leaves an immutable positive
//! chunk under the merchant's address; the merchant's balance only moves
//! when they prune. A refund credits the payer immediately and leaves a
//! negative chunk under the merchant's address rooted at the original chunk,
//! so the merchant's next prune nets it out and the refund total stays
//! bounded by the original amount. Chunk keys carry the transaction nano
//! timestamp: one chunk per owner per transaction, collisions abort.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tessera_store::host::SortSpec;
use tessera_store::{keys, Host, KvPage, StateGateway, StoreError};
use tessera_types::{Address, Amount, TxTime};
use tracing::{debug, info};

use crate::account::Account;
use crate::balance::{Balance, BalanceLedger, BalanceLog, LogType};
use crate::error::LedgerError;
use crate::fee::FeeLedger;
use crate::prune::{fold_window, PruneFold, SAFE_PRUNE_MARGIN_SECS};
use crate::token::Token;

/// One immutable user↔merchant value movement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayChunk {
    #[serde(rename = "@pay")]
    pub key: String,
    pub owner: Address,
    pub amount: Amount,
    /// Counterparty address: the payer for positive chunks, the refund
    /// receiver for negative ones.
    pub rid: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memo: Option<String>,
    pub created: TxTime,
}

/// A prune receipt, written alongside the cursor advance for audits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PruneReceipt {
    #[serde(rename = "@prune")]
    pub owner: Address,
    pub start_key: String,
    pub end_key: String,
    pub sum: Amount,
    pub scanned: usize,
    pub created: TxTime,
}

pub struct PayLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> PayLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    pub fn get_chunk(&self, key: &str) -> Result<PayChunk, LedgerError> {
        self.gw
            .get::<PayChunk>(key)?
            .ok_or_else(|| LedgerError::Other(format!("pay chunk not found: {key}")))
    }

    /// Pay `amount` from `sender` to `receiver`: debit the sender (amount
    /// plus policy fee) and append the positive chunk under the receiver.
    pub fn pay(
        &self,
        token: &Token,
        sender: &Account,
        receiver: &Account,
        amount: &Amount,
        memo: Option<&str>,
    ) -> Result<(PayChunk, BalanceLog), LedgerError> {
        check_parties(token, sender, receiver, amount)?;

        let host = self.gw.host();
        let now = host.tx_time();
        let fee = FeeLedger::new(host).apply_fee(token, "pay", sender.address(), amount)?;

        let chunk = self.write_chunk(
            receiver.address(),
            amount.clone(),
            sender.address().to_string(),
            None,
            memo,
        )?;

        let balances = BalanceLedger::new(host);
        let mut balance = balances.get_or_create(sender.address())?;
        let log = balances.apply(
            &mut balance,
            &amount.add(&fee).neg(),
            LogType::Pay,
            memo,
            Some(receiver.address().to_string()),
            Some(chunk.key.clone()),
        )?;
        debug!(chunk = %chunk.key, %amount, created = %now, "pay chunk appended");
        Ok((chunk, log))
    }

    /// Refund part of an earlier pay. The caller operates the merchant
    /// account that owns the original chunk; the payer is credited now and
    /// the negative chunk parks under the merchant until their next prune.
    pub fn refund(
        &self,
        token: &Token,
        merchant: &Account,
        parent_key: &str,
        amount: &Amount,
        memo: Option<&str>,
    ) -> Result<(PayChunk, BalanceLog), LedgerError> {
        let parent = self.get_chunk(parent_key)?;
        if !parent.amount.is_positive() {
            return Err(LedgerError::Other("cannot refund a refund".into()));
        }
        if parent.owner != *merchant.address() {
            return Err(LedgerError::NoAuthority(format!(
                "original pay belongs to {}",
                parent.owner
            )));
        }
        let payer_account = crate::account::AccountLedger::new(self.gw.host())
            .get(&Address::parse(&parent.rid)?)?;
        check_parties(token, merchant, &payer_account, amount)?;

        let refunded = self.refunded_sum(&parent)?;
        if refunded.add(amount) > parent.amount {
            return Err(LedgerError::Other(
                "can't exceed the original pay amount".into(),
            ));
        }

        let chunk = self.write_chunk(
            merchant.address(),
            amount.neg(),
            parent.rid.clone(),
            Some(parent_key.to_owned()),
            memo,
        )?;

        let balances = BalanceLedger::new(self.gw.host());
        let mut payer_balance = balances.get_or_create(payer_account.address())?;
        let log = balances.apply(
            &mut payer_balance,
            amount,
            LogType::Refund,
            memo,
            Some(merchant.address().to_string()),
            Some(chunk.key.clone()),
        )?;
        Ok((chunk, log))
    }

    /// Sum of refunds already rooted at a positive chunk, as a positive
    /// number.
    pub fn refunded_sum(&self, parent: &PayChunk) -> Result<Amount, LedgerError> {
        let prefix = keys::pay_prefix(&parent.owner);
        let end = keys::range_end(&prefix);
        let mut sum = Amount::zero();
        let mut bookmark: Option<String> = None;
        loop {
            let page = self.gw.range(&prefix, &end, 0, bookmark.as_deref())?;
            for entry in &page.entries {
                let chunk: PayChunk = self.gw.decode(&entry.value)?;
                if chunk.parent_key.as_deref() == Some(parent.key.as_str()) {
                    sum = sum.add(&chunk.amount.abs());
                }
            }
            match page.bookmark {
                Some(bm) => bookmark = Some(bm),
                None => break,
            }
        }
        Ok(sum)
    }

    /// Fold the owner's unpruned chunks into their balance.
    ///
    /// The window runs from the balance's cursor (exclusive) to `until`
    /// (inclusive), clamped to `tx_time − 10min` when `safe` is set. At most
    /// [`crate::prune::PRUNE_BATCH`] chunks fold per call; `next_key` in the
    /// result tells the caller to come back for the rest.
    pub fn prune(
        &self,
        owner: &Account,
        balance: &mut Balance,
        until_secs: Option<i64>,
        safe: bool,
    ) -> Result<PruneFold, LedgerError> {
        let host = self.gw.host();
        let now = host.tx_time();
        let mut until = match until_secs {
            Some(secs) => TxTime::new(secs, 999_999_999),
            None => now,
        };
        if safe {
            let margin = now.seconds_ago(SAFE_PRUNE_MARGIN_SECS);
            if until > margin {
                until = margin;
            }
        }

        let start = match &balance.last_pruned_pay_id {
            Some(cursor) => keys::key_after(cursor),
            None => keys::pay_prefix(owner.address()),
        };
        let end = keys::pay(owner.address(), &next_nano(until));

        let fold = fold_window(&self.gw, &start, &end, |_, value| {
            let chunk: PayChunk = serde_json::from_slice(value)
                .map_err(|e| LedgerError::Internal(format!("bad pay chunk: {e}")))?;
            Ok(chunk.amount)
        })?
        .ok_or_else(|| LedgerError::NotExistUtxoChunks {
            window: format!(
                "({} .. {}]",
                balance.last_pruned_pay_id.as_deref().unwrap_or("epoch"),
                until.secs()
            ),
        })?;

        balance.last_pruned_pay_id = Some(fold.end_key.clone());
        let balances = BalanceLedger::new(host);
        balances.apply(
            balance,
            &fold.sum,
            LogType::PrunePay,
            None,
            None,
            Some(format!("{} .. {}", fold.start_key, fold.end_key)),
        )?;

        let receipt = PruneReceipt {
            owner: owner.address().clone(),
            start_key: fold.start_key.clone(),
            end_key: fold.end_key.clone(),
            sum: fold.sum.clone(),
            scanned: fold.scanned,
            created: now,
        };
        self.gw
            .insert(&keys::prune_receipt(owner.address(), &now), &receipt)?;
        info!(owner = %owner.address(), sum = %fold.sum, scanned = fold.scanned, "pay chunks pruned");
        Ok(fold)
    }

    /// Chunks of an owner within a time window, either direction.
    pub fn list(
        &self,
        owner: &Address,
        ascending: bool,
        start_secs: Option<i64>,
        end_secs: Option<i64>,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, LedgerError> {
        let mut created = serde_json::Map::new();
        if let Some(start) = start_secs {
            created.insert("$gte".into(), json!(start * 1_000_000_000));
        }
        if let Some(end) = end_secs {
            created.insert("$lte".into(), json!(end * 1_000_000_000 + 999_999_999));
        }
        let mut selector = json!({
            "@pay": {"$exists": true},
            "owner": owner.to_string(),
        });
        if !created.is_empty() {
            selector["created"] = serde_json::Value::Object(created);
        }
        let sort = if ascending {
            SortSpec::asc("created")
        } else {
            SortSpec::desc("created")
        };
        Ok(self.gw.query(&selector, &[sort], page_size, bookmark)?)
    }

    pub(crate) fn write_chunk(
        &self,
        owner: &Address,
        amount: Amount,
        rid: String,
        parent_key: Option<String>,
        memo: Option<&str>,
    ) -> Result<PayChunk, LedgerError> {
        let now = self.gw.host().tx_time();
        let key = keys::pay(owner, &now);
        let chunk = PayChunk {
            key: key.clone(),
            owner: owner.clone(),
            amount,
            rid,
            parent_key,
            memo: memo.map(str::to_owned),
            created: now,
        };
        self.gw.insert(&key, &chunk).map_err(|e| match e {
            StoreError::AlreadyExists(_) => LedgerError::DuplicatePay,
            other => other.into(),
        })?;
        Ok(chunk)
    }
}

/// Successor of a timestamp at nano granularity; turns an inclusive time
/// bound into an exclusive key bound.
fn next_nano(t: TxTime) -> TxTime {
    if t.nanos() == 999_999_999 {
        TxTime::new(t.secs() + 1, 0)
    } else {
        TxTime::new(t.secs(), t.nanos() + 1)
    }
}

fn check_parties(
    token: &Token,
    sender: &Account,
    receiver: &Account,
    amount: &Amount,
) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(
            "amount must be positive".into(),
        ));
    }
    if sender.address() == receiver.address() {
        return Err(LedgerError::Other(
            "sender and receiver must differ".into(),
        ));
    }
    if sender.token() != token.code || receiver.token() != token.code {
        return Err(LedgerError::Other("not an account of this token".into()));
    }
    sender.assert_not_suspended()?;
    receiver.assert_not_suspended()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountLedger;
    use crate::token::TokenRegistry;
    use std::collections::BTreeSet;
    use tessera_store::MemHost;
    use tessera_types::Kid;

    fn kid(n: u8) -> Kid {
        Kid::new(&format!("{:040x}", n)).unwrap()
    }

    struct Fixture {
        host: MemHost,
        token: Token,
        payer: Account,
        merchant: Account,
    }

    /// Token ABC with a funded payer and a merchant.
    fn fixture() -> Fixture {
        let host = MemHost::new();
        host.begin_tx("tx-setup", TxTime::new(1000, 0));
        let holders: BTreeSet<Kid> = [kid(9)].into();
        let token = TokenRegistry::new(&host)
            .create(
                "ABC",
                2,
                Amount::from_i64(1_000_000),
                Amount::zero(),
                &holders,
                &kid(9),
            )
            .unwrap();

        let accounts = AccountLedger::new(&host);
        let payer = accounts.create_personal("ABC", &kid(1)).unwrap();
        let merchant = accounts.create_personal("ABC", &kid(2)).unwrap();

        // Fund the payer outside the usual flow.
        let balances = BalanceLedger::new(&host);
        let mut balance = balances.get_or_create(payer.address()).unwrap();
        balances
            .apply(
                &mut balance,
                &Amount::from_i64(10_000),
                LogType::Receive,
                None,
                None,
                None,
            )
            .unwrap();

        Fixture {
            host,
            token,
            payer,
            merchant,
        }
    }

    fn balance_of(host: &MemHost, account: &Account) -> Amount {
        BalanceLedger::new(host)
            .get_or_create(account.address())
            .unwrap()
            .amount
    }

    #[test]
    fn simple_pay_and_prune() {
        let f = fixture();
        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        let (chunk, log) = pays
            .pay(
                &f.token,
                &f.payer,
                &f.merchant,
                &Amount::from_i64(150),
                None,
            )
            .unwrap();
        assert_eq!(chunk.amount, 150);
        assert_eq!(chunk.owner, *f.merchant.address());
        assert_eq!(chunk.rid, f.payer.address().to_string());
        assert_eq!(log.diff, -150);

        // No synchronous credit for the merchant.
        assert_eq!(balance_of(&f.host, &f.payer), 9850);
        assert!(balance_of(&f.host, &f.merchant).is_zero());

        // Prune folds the chunk into the merchant balance and advances the
        // cursor to the chunk key.
        f.host.begin_tx("tx-prune", TxTime::new(2000, 0));
        let balances = BalanceLedger::new(&f.host);
        let mut merchant_balance = balances.get_or_create(f.merchant.address()).unwrap();
        let fold = pays
            .prune(&f.merchant, &mut merchant_balance, None, false)
            .unwrap();
        assert_eq!(fold.sum, 150);
        assert_eq!(merchant_balance.amount, 150);
        assert_eq!(merchant_balance.last_pruned_pay_id, Some(chunk.key.clone()));

        // With no new chunks a second prune reports an empty window and the
        // cursor stays put.
        f.host.begin_tx("tx-prune-2", TxTime::new(2010, 0));
        let err = pays
            .prune(&f.merchant, &mut merchant_balance, None, false)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotExistUtxoChunks { .. }));
        assert_eq!(merchant_balance.last_pruned_pay_id, Some(chunk.key));
        assert_eq!(balance_of(&f.host, &f.merchant), 150);
    }

    #[test]
    fn duplicate_chunk_in_same_nano_fails() {
        let f = fixture();
        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        pays.pay(&f.token, &f.payer, &f.merchant, &Amount::from_i64(1), None)
            .unwrap();
        // Same owner, same transaction time.
        let err = pays
            .pay(&f.token, &f.payer, &f.merchant, &Amount::from_i64(2), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicatePay));
    }

    #[test]
    fn refund_bounds_and_chunks() {
        let f = fixture();
        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        let (parent, _) = pays
            .pay(
                &f.token,
                &f.payer,
                &f.merchant,
                &Amount::from_i64(100),
                None,
            )
            .unwrap();

        // Merchant needs spendable balance for nothing here: refunds ride on
        // the chunk stream. 40 first.
        f.host.begin_tx("tx-refund-1", TxTime::new(1020, 0));
        let (refund, log) = pays
            .refund(
                &f.token,
                &f.merchant,
                &parent.key,
                &Amount::from_i64(40),
                None,
            )
            .unwrap();
        assert_eq!(refund.amount, -40);
        assert_eq!(refund.owner, *f.merchant.address());
        assert_eq!(refund.parent_key.as_deref(), Some(parent.key.as_str()));
        assert_eq!(log.diff, 40);
        assert_eq!(balance_of(&f.host, &f.payer), 9940);

        // 70 more would exceed the original.
        f.host.begin_tx("tx-refund-2", TxTime::new(1030, 0));
        let err = pays
            .refund(
                &f.token,
                &f.merchant,
                &parent.key,
                &Amount::from_i64(70),
                None,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "can't exceed the original pay amount");

        // 60 completes the refund exactly.
        let (second, _) = pays
            .refund(
                &f.token,
                &f.merchant,
                &parent.key,
                &Amount::from_i64(60),
                None,
            )
            .unwrap();
        assert_eq!(second.amount, -60);
        assert_eq!(pays.refunded_sum(&parent).unwrap(), 100);

        // Merchant's prune nets everything to zero.
        f.host.begin_tx("tx-prune", TxTime::new(2000, 0));
        let balances = BalanceLedger::new(&f.host);
        let mut merchant_balance = balances.get_or_create(f.merchant.address()).unwrap();
        let fold = pays
            .prune(&f.merchant, &mut merchant_balance, None, false)
            .unwrap();
        assert_eq!(fold.scanned, 3);
        assert!(fold.sum.is_zero());
        assert!(merchant_balance.amount.is_zero());
    }

    #[test]
    fn refund_requires_chunk_owner() {
        let f = fixture();
        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        let (parent, _) = pays
            .pay(&f.token, &f.payer, &f.merchant, &Amount::from_i64(10), None)
            .unwrap();
        f.host.begin_tx("tx-refund", TxTime::new(1020, 0));
        let err = pays
            .refund(&f.token, &f.payer, &parent.key, &Amount::from_i64(5), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoAuthority(_)));
    }

    #[test]
    fn suspended_parties_cannot_pay() {
        let f = fixture();
        f.host.begin_tx("tx-suspend", TxTime::new(1005, 0));
        let accounts = AccountLedger::new(&f.host);
        let suspended = accounts.suspend(f.merchant.address(), &kid(2)).unwrap();

        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        let err = pays
            .pay(&f.token, &f.payer, &suspended, &Amount::from_i64(5), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Suspended(_)));
    }

    #[test]
    fn safe_prune_clamps_window() {
        let f = fixture();
        f.host.begin_tx("tx-pay", TxTime::new(1010, 0));
        let pays = PayLedger::new(&f.host);
        pays.pay(&f.token, &f.payer, &f.merchant, &Amount::from_i64(30), None)
            .unwrap();

        // Within the 10 minute margin the chunk is invisible to a safe
        // prune.
        f.host.begin_tx("tx-prune", TxTime::new(1100, 0));
        let balances = BalanceLedger::new(&f.host);
        let mut merchant_balance = balances.get_or_create(f.merchant.address()).unwrap();
        let err = pays
            .prune(&f.merchant, &mut merchant_balance, None, true)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotExistUtxoChunks { .. }));

        // Once the margin passes, it folds.
        f.host.begin_tx("tx-prune-2", TxTime::new(1010 + 601, 0));
        let fold = pays
            .prune(&f.merchant, &mut merchant_balance, None, true)
            .unwrap();
        assert_eq!(fold.sum, 30);
    }

    #[test]
    fn list_filters_by_window() {
        let f = fixture();
        let pays = PayLedger::new(&f.host);
        for (i, secs) in [1010i64, 1020, 1030].iter().enumerate() {
            f.host.begin_tx(&format!("tx-pay-{i}"), TxTime::new(*secs, 0));
            pays.pay(
                &f.token,
                &f.payer,
                &f.merchant,
                &Amount::from_i64(1 + i as i64),
                None,
            )
            .unwrap();
        }
        let page = pays
            .list(f.merchant.address(), true, Some(1015), Some(1025), 10, None)
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        let chunk: PayChunk = serde_json::from_slice(&page.entries[0].value).unwrap();
        assert_eq!(chunk.amount, 2);

        let all_desc = pays
            .list(f.merchant.address(), false, None, None, 10, None)
            .unwrap();
        assert_eq!(all_desc.entries.len(), 3);
        let newest: PayChunk = serde_json::from_slice(&all_desc.entries[0].value).unwrap();
        assert_eq!(newest.amount, 3);
    }
}
