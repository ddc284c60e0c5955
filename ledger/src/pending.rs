//! Pending balances: value held out of an owner's balance.
//!
//! Two flavours share one record: `Contract` escrows a sender's debit while
//! a multi-sig contract collects approvals (`rid` = contract id), `Account`
//! delays a credit until a release time (`rid` = source address). While the
//! record exists the value is in neither party's balance; consumption and
//! refund both delete it.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tessera_store::host::SortSpec;
use tessera_store::{keys, Host, KvPage, StateGateway, StoreError};
use tessera_types::{Address, Amount, TxTime};

use crate::balance::{Balance, BalanceLedger, LogType};
use crate::error::LedgerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingType {
    Account,
    Contract,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingBalance {
    #[serde(rename = "@pending_balance")]
    pub id: String,
    pub account: Address,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fee: Option<Amount>,
    #[serde(rename = "type")]
    pub kind: PendingType,
    /// Contract id for `Contract`, source address for `Account`. Empty for
    /// the instant between escrow and coordinator response.
    pub rid: String,
    pub pending_time: TxTime,
    pub created: TxTime,
}

impl PendingBalance {
    /// Escrowed principal plus fee.
    pub fn total(&self) -> Amount {
        match &self.fee {
            Some(fee) => self.amount.add(fee),
            None => self.amount.clone(),
        }
    }
}

pub struct PendingLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> PendingLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    pub fn get(&self, id: &str) -> Result<PendingBalance, LedgerError> {
        self.gw
            .get::<PendingBalance>(&keys::pending_balance(id))?
            .ok_or_else(|| LedgerError::Other(format!("pending balance not found: {id}")))
    }

    /// Escrow a contract debit: the owner's balance drops by
    /// `amount + fee` now, a Deposit log records it, and the record waits
    /// for the contract id.
    pub fn escrow(
        &self,
        balance: &mut Balance,
        amount: Amount,
        fee: Option<Amount>,
        pending_time: TxTime,
        memo: Option<&str>,
    ) -> Result<PendingBalance, LedgerError> {
        let host = self.gw.host();
        let now = host.tx_time();
        let pending = PendingBalance {
            id: host.tx_id(),
            account: balance.address.clone(),
            amount,
            fee,
            kind: PendingType::Contract,
            rid: String::new(),
            pending_time,
            created: now,
        };

        let balances = BalanceLedger::new(host);
        balances.apply(
            balance,
            &pending.total().neg(),
            LogType::Deposit,
            memo,
            Some(pending.id.clone()),
            None,
        )?;
        self.insert(&pending)?;
        Ok(pending)
    }

    /// Hold a delayed credit for `account` (no balance change until the
    /// release time passes and the holder withdraws).
    pub fn hold(
        &self,
        account: &Address,
        amount: Amount,
        source: &Address,
        pending_time: TxTime,
    ) -> Result<PendingBalance, LedgerError> {
        let host = self.gw.host();
        let pending = PendingBalance {
            id: host.tx_id(),
            account: account.clone(),
            amount,
            fee: None,
            kind: PendingType::Account,
            rid: source.to_string(),
            pending_time,
            created: host.tx_time(),
        };
        self.insert(&pending)?;
        Ok(pending)
    }

    /// Store the contract id learned from the coordinator mid-phase-1.
    pub fn bind_contract(
        &self,
        pending: &mut PendingBalance,
        contract_id: &str,
    ) -> Result<(), LedgerError> {
        pending.rid = contract_id.to_owned();
        Ok(self.gw.put(&keys::pending_balance(&pending.id), pending)?)
    }

    /// Release a pending balance back into its owner's balance. Serves both
    /// the holder's withdraw and the contract cancel path.
    pub fn withdraw(
        &self,
        pending: &PendingBalance,
        balance: &mut Balance,
        memo: Option<&str>,
    ) -> Result<(), LedgerError> {
        let balances = BalanceLedger::new(self.gw.host());
        balances.apply(
            balance,
            &pending.total(),
            LogType::Withdraw,
            memo,
            Some(pending.rid.clone()),
            None,
        )?;
        self.gw.delete(&keys::pending_balance(&pending.id))?;
        Ok(())
    }

    /// Holder-initiated withdraw: refused before the release time.
    pub fn withdraw_by_holder(
        &self,
        pending: &PendingBalance,
        balance: &mut Balance,
    ) -> Result<(), LedgerError> {
        let now = self.gw.host().tx_time();
        if pending.pending_time > now {
            return Err(LedgerError::NotWithdrawable(format!(
                "pending until {}",
                pending.pending_time.secs()
            )));
        }
        self.withdraw(pending, balance, None)
    }

    /// Validate and consume a contract escrow: the executor applies the
    /// operation's effect, this removes the record.
    pub fn consume(
        &self,
        pending: &PendingBalance,
        contract_id: &str,
    ) -> Result<(), LedgerError> {
        if pending.kind != PendingType::Contract {
            return Err(LedgerError::InvalidContractDocument(
                "pending balance is not contract-bound".into(),
            ));
        }
        if pending.rid != contract_id {
            return Err(LedgerError::InvalidContractDocument(format!(
                "contract id mismatch for pending balance {}",
                pending.id
            )));
        }
        self.gw.delete(&keys::pending_balance(&pending.id))?;
        Ok(())
    }

    /// Pending balances of an account, sorted by release or creation time.
    pub fn list(
        &self,
        account: &Address,
        by_created: bool,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, LedgerError> {
        let selector = json!({ "account": account.to_string(), "@pending_balance": {"$exists": true} });
        let field = if by_created { "created" } else { "pending_time" };
        Ok(self
            .gw
            .query(&selector, &[SortSpec::asc(field)], page_size, bookmark)?)
    }

    /// Contract escrows that never learned their contract id (a crashed
    /// phase-1). Repair surface only.
    pub fn orphans(&self, page_size: u32, bookmark: Option<&str>) -> Result<KvPage, LedgerError> {
        let selector = json!({
            "@pending_balance": {"$exists": true},
            "type": "contract",
            "rid": "",
        });
        Ok(self
            .gw
            .query(&selector, &[SortSpec::asc("created")], page_size, bookmark)?)
    }

    fn insert(&self, pending: &PendingBalance) -> Result<(), LedgerError> {
        self.gw
            .insert(&keys::pending_balance(&pending.id), pending)
            .map_err(|e| match e {
                StoreError::AlreadyExists(key) => {
                    LedgerError::Internal(format!("pending balance collision at {key}"))
                }
                other => other.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Address;

    use tessera_store::MemHost;

    fn addr(tag: &str) -> Address {
        Address::personal("ABC", tag).unwrap()
    }

    fn funded(h: &MemHost, tag: &str, amount: i64) -> Balance {
        let balances = BalanceLedger::new(h);
        let mut balance = balances.get_or_create(&addr(tag)).unwrap();
        balances
            .apply(
                &mut balance,
                &Amount::from_i64(amount),
                LogType::Mint,
                None,
                None,
                None,
            )
            .unwrap();
        balance
    }

    #[test]
    fn escrow_debits_and_withdraw_restores() {
        let h = MemHost::new();
        h.begin_tx("tx-fund", TxTime::new(50, 0));
        let mut balance = funded(&h, "owner", 1000);

        h.begin_tx("tx-escrow", TxTime::new(60, 0));
        let pendings = PendingLedger::new(&h);
        let mut pending = pendings
            .escrow(
                &mut balance,
                Amount::from_i64(300),
                Some(Amount::from_i64(3)),
                TxTime::new(120, 0),
                None,
            )
            .unwrap();
        assert_eq!(balance.amount, 697);
        pendings.bind_contract(&mut pending, "ctr-1").unwrap();

        // Early holder withdraw is refused.
        h.begin_tx("tx-early", TxTime::new(70, 0));
        assert!(matches!(
            pendings.withdraw_by_holder(&pending, &mut balance),
            Err(LedgerError::NotWithdrawable(_))
        ));

        // After the release time the full escrow comes back.
        h.begin_tx("tx-late", TxTime::new(130, 0));
        pendings.withdraw_by_holder(&pending, &mut balance).unwrap();
        assert_eq!(balance.amount, 1000);
        assert!(pendings.get(&pending.id).is_err());
    }

    #[test]
    fn consume_validates_kind_and_rid() {
        let h = MemHost::new();
        h.begin_tx("tx-fund", TxTime::new(50, 0));
        let mut balance = funded(&h, "owner", 500);

        h.begin_tx("tx-escrow", TxTime::new(60, 0));
        let pendings = PendingLedger::new(&h);
        let mut pending = pendings
            .escrow(&mut balance, Amount::from_i64(100), None, TxTime::new(90, 0), None)
            .unwrap();
        pendings.bind_contract(&mut pending, "ctr-9").unwrap();

        assert!(pendings.consume(&pending, "ctr-other").is_err());
        pendings.consume(&pending, "ctr-9").unwrap();
        assert!(pendings.get(&pending.id).is_err());
    }

    #[test]
    fn hold_keeps_balances_untouched() {
        let h = MemHost::new();
        h.begin_tx("tx-hold", TxTime::new(10, 0));
        let pendings = PendingLedger::new(&h);
        let receiver = addr("receiver");
        let source = addr("source");
        let pending = pendings
            .hold(&receiver, Amount::from_i64(42), &source, TxTime::new(99, 0))
            .unwrap();
        assert_eq!(pending.kind, PendingType::Account);
        assert_eq!(pending.rid, source.to_string());

        let page = pendings.list(&receiver, false, 10, None).unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[test]
    fn orphan_listing_finds_unbound_escrows() {
        let h = MemHost::new();
        h.begin_tx("tx-fund", TxTime::new(50, 0));
        let mut balance = funded(&h, "owner", 500);

        h.begin_tx("tx-escrow", TxTime::new(60, 0));
        let pendings = PendingLedger::new(&h);
        pendings
            .escrow(&mut balance, Amount::from_i64(10), None, TxTime::new(90, 0), None)
            .unwrap();

        let orphans = pendings.orphans(10, None).unwrap();
        assert_eq!(orphans.entries.len(), 1);
    }
}
