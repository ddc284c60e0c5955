//! Balances and the append-only balance log.
//!
//! Every mutation goes through [`BalanceLedger::apply`], which enforces the
//! write rule: compute the new amount, stamp `updated`, write the balance,
//! then append the log. A balance can never go negative; escrow debits are
//! applied before the check.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tessera_store::host::SortSpec;
use tessera_store::{keys, Host, KvPage, StateGateway, StoreError};
use tessera_types::{Address, Amount, TxTime};
use tracing::debug;

use crate::error::LedgerError;

/// Current balance of an account; created lazily on first read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Balance {
    #[serde(rename = "@balance")]
    pub address: Address,
    pub amount: Amount,
    /// Key of the last pay chunk folded into `amount`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_pruned_pay_id: Option<String>,
    pub created: TxTime,
    pub updated: TxTime,
}

/// What moved a balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    Mint,
    Burn,
    Send,
    Receive,
    Deposit,
    Withdraw,
    Pay,
    Refund,
    PrunePay,
    PruneFee,
    Wrap,
    Unwrap,
}

/// One entry of the per-address balance timeline. Keys embed the
/// transaction nano timestamp, so each address gets at most one entry per
/// transaction and the timeline sorts by time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceLog {
    #[serde(rename = "@balance_log")]
    pub address: Address,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub diff: Amount,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pay_key: Option<String>,
    pub created: TxTime,
}

pub struct BalanceLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> BalanceLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    /// The balance of an account, created at zero on first read.
    pub fn get_or_create(&self, address: &Address) -> Result<Balance, LedgerError> {
        let key = keys::balance(address);
        if let Some(balance) = self.gw.get::<Balance>(&key)? {
            return Ok(balance);
        }
        let now = self.gw.host().tx_time();
        let balance = Balance {
            address: address.clone(),
            amount: Amount::zero(),
            last_pruned_pay_id: None,
            created: now,
            updated: now,
        };
        self.gw.put(&key, &balance)?;
        Ok(balance)
    }

    /// Apply a signed diff to a balance and append the matching log entry.
    pub fn apply(
        &self,
        balance: &mut Balance,
        diff: &Amount,
        log_type: LogType,
        memo: Option<&str>,
        rid: Option<String>,
        pay_key: Option<String>,
    ) -> Result<BalanceLog, LedgerError> {
        let now = self.gw.host().tx_time();
        let next = balance.amount.add(diff);
        if next.is_negative() {
            return Err(LedgerError::NotEnoughBalance(balance.address.to_string()));
        }
        balance.amount = next;
        balance.updated = now;
        self.gw.put(&keys::balance(&balance.address), balance)?;

        let log = BalanceLog {
            address: balance.address.clone(),
            log_type,
            diff: diff.clone(),
            amount: balance.amount.clone(),
            memo: memo.map(str::to_owned),
            rid,
            pay_key,
            created: now,
        };
        self.gw
            .insert(&keys::balance_log(&balance.address, &now), &log)
            .map_err(|e| match e {
                StoreError::AlreadyExists(key) => {
                    LedgerError::Internal(format!("duplicate balance log at {key}"))
                }
                other => other.into(),
            })?;
        debug!(address = %balance.address, ?log_type, %diff, "balance applied");
        Ok(log)
    }

    /// The balance-log timeline of an address, newest first.
    pub fn logs(
        &self,
        address: &Address,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, LedgerError> {
        let selector = json!({ "@balance_log": address.to_string() });
        Ok(self.gw.query(
            &selector,
            &[SortSpec::desc("created")],
            page_size,
            bookmark,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::MemHost;

    fn addr() -> Address {
        Address::personal("ABC", "balance-owner").unwrap()
    }

    #[test]
    fn zero_balance_on_first_read() {
        let h = MemHost::new();
        h.begin_tx("tx-1", TxTime::new(10, 0));
        let ledger = BalanceLedger::new(&h);
        let balance = ledger.get_or_create(&addr()).unwrap();
        assert!(balance.amount.is_zero());
        // Second read returns the stored document.
        let again = ledger.get_or_create(&addr()).unwrap();
        assert_eq!(again.created, balance.created);
    }

    #[test]
    fn apply_writes_balance_then_log() {
        let h = MemHost::new();
        h.begin_tx("tx-1", TxTime::new(10, 0));
        let ledger = BalanceLedger::new(&h);
        let mut balance = ledger.get_or_create(&addr()).unwrap();

        let log = ledger
            .apply(
                &mut balance,
                &Amount::from_i64(500),
                LogType::Mint,
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(log.amount, 500);
        assert_eq!(log.diff, 500);
        assert_eq!(h.keys_with_prefix(keys::BALANCE_LOG).len(), 1);

        let stored = ledger.get_or_create(&addr()).unwrap();
        assert_eq!(stored.amount, 500);
    }

    #[test]
    fn apply_rejects_negative_result() {
        let h = MemHost::new();
        h.begin_tx("tx-1", TxTime::new(10, 0));
        let ledger = BalanceLedger::new(&h);
        let mut balance = ledger.get_or_create(&addr()).unwrap();
        let err = ledger
            .apply(
                &mut balance,
                &Amount::from_i64(-1),
                LogType::Send,
                None,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotEnoughBalance(_)));
        // Nothing was logged.
        assert!(h.keys_with_prefix(keys::BALANCE_LOG).is_empty());
    }

    #[test]
    fn one_log_per_address_per_transaction() {
        let h = MemHost::new();
        h.begin_tx("tx-1", TxTime::new(10, 0));
        let ledger = BalanceLedger::new(&h);
        let mut balance = ledger.get_or_create(&addr()).unwrap();
        let one = Amount::from_i64(1);
        ledger
            .apply(&mut balance, &one, LogType::Mint, None, None, None)
            .unwrap();
        let err = ledger
            .apply(&mut balance, &one, LogType::Mint, None, None, None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Internal(_)));
    }

    #[test]
    fn logs_list_newest_first() {
        let h = MemHost::new();
        let ledger = BalanceLedger::new(&h);
        let a = addr();
        for i in 1..=3 {
            h.begin_tx(&format!("tx-{i}"), TxTime::new(10 * i, 0));
            let mut balance = ledger.get_or_create(&a).unwrap();
            ledger
                .apply(
                    &mut balance,
                    &Amount::from_i64(i),
                    LogType::Mint,
                    None,
                    None,
                    None,
                )
                .unwrap();
        }
        let page = ledger.logs(&a, 10, None).unwrap();
        assert_eq!(page.entries.len(), 3);
        let newest: BalanceLog = serde_json::from_slice(&page.entries[0].value).unwrap();
        assert_eq!(newest.diff, 3);
    }
}
