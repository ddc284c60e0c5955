//! Cross-chain wrap and unwrap.
//!
//! Wrapping moves value into the bridge account configured for the external
//! chain; the bridge settles off-ledger guided by the Wrap log. Unwrapping
//! releases value back out of the bridge account, at most once per external
//! transaction id: a receipt keyed by that id blocks replays.

use serde::{Deserialize, Serialize};
use tessera_store::{keys, Host, StateGateway, StoreError};
use tessera_types::{Address, Amount, Kid, TxTime};
use tracing::info;

use crate::account::{Account, AccountLedger};
use crate::balance::{BalanceLedger, BalanceLog, LogType};
use crate::error::LedgerError;
use crate::fee::FeeLedger;
use crate::token::Token;

/// The at-most-once marker for one redeemed external transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnwrapReceipt {
    #[serde(rename = "@unwrap")]
    pub ext_tx_id: String,
    pub ext_code: String,
    pub ext_id: String,
    pub receiver: Address,
    pub amount: Amount,
    pub created: TxTime,
}

pub struct WrapLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> WrapLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    /// Debit `amount + fee` from the sender and park `amount` in the bridge
    /// account for the external chain. The fee is the bridge toll given by
    /// the caller, recorded for the genesis fee prune.
    pub fn wrap(
        &self,
        token: &Token,
        sender: &Account,
        amount: &Amount,
        fee: &Amount,
        ext_code: &str,
        ext_id: &str,
        memo: Option<&str>,
    ) -> Result<BalanceLog, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "wrap amount must be positive".into(),
            ));
        }
        if fee.is_negative() {
            return Err(LedgerError::InvalidAmount(
                "wrap fee must not be negative".into(),
            ));
        }
        let host = self.gw.host();
        let bridge_address = token.bridge_account(ext_code)?.clone();
        let bridge = AccountLedger::new(host).get(&bridge_address)?;
        sender.assert_not_suspended()?;
        bridge.assert_not_suspended()?;
        if sender.address() == &bridge_address {
            return Err(LedgerError::Other("cannot wrap from the bridge".into()));
        }

        FeeLedger::new(host).record_fee(token, sender.address(), fee)?;

        let balances = BalanceLedger::new(host);
        let mut sender_balance = balances.get_or_create(sender.address())?;
        let log = balances.apply(
            &mut sender_balance,
            &amount.add(fee).neg(),
            LogType::Wrap,
            memo,
            Some(format!("{ext_code}/{ext_id}")),
            None,
        )?;

        let mut bridge_balance = balances.get_or_create(&bridge_address)?;
        balances.apply(
            &mut bridge_balance,
            amount,
            LogType::Wrap,
            memo,
            Some(sender.address().to_string()),
            None,
        )?;
        info!(sender = %sender.address(), %amount, ext_code, "wrapped");
        Ok(log)
    }

    /// Release `amount` from the bridge account to the receiver, exactly
    /// once per external transaction id. Only bridge holders may settle.
    #[allow(clippy::too_many_arguments)]
    pub fn unwrap(
        &self,
        token: &Token,
        receiver: &Account,
        amount: &Amount,
        ext_code: &str,
        ext_id: &str,
        ext_tx_id: &str,
        memo: Option<&str>,
        caller: &Kid,
    ) -> Result<BalanceLog, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "unwrap amount must be positive".into(),
            ));
        }
        let host = self.gw.host();
        let bridge_address = token.bridge_account(ext_code)?.clone();
        let bridge = AccountLedger::new(host).get(&bridge_address)?;
        bridge.assert_holder(caller)?;
        receiver.assert_not_suspended()?;

        let now = host.tx_time();
        let receipt = UnwrapReceipt {
            ext_tx_id: ext_tx_id.to_owned(),
            ext_code: ext_code.to_owned(),
            ext_id: ext_id.to_owned(),
            receiver: receiver.address().clone(),
            amount: amount.clone(),
            created: now,
        };
        self.gw
            .insert(&keys::unwrap_receipt(ext_tx_id), &receipt)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => LedgerError::DuplicateUnwrap,
                other => other.into(),
            })?;

        let balances = BalanceLedger::new(host);
        let mut bridge_balance = balances.get_or_create(&bridge_address)?;
        balances.apply(
            &mut bridge_balance,
            &amount.neg(),
            LogType::Unwrap,
            memo,
            Some(receiver.address().to_string()),
            None,
        )?;

        let mut receiver_balance = balances.get_or_create(receiver.address())?;
        let log = balances.apply(
            &mut receiver_balance,
            amount,
            LogType::Unwrap,
            memo,
            Some(format!("{ext_code}/{ext_id}/{ext_tx_id}")),
            None,
        )?;
        info!(receiver = %receiver.address(), %amount, ext_code, "unwrapped");
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenRegistry;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use tessera_store::MemHost;

    fn kid(n: u8) -> Kid {
        Kid::new(&format!("{:040x}", n)).unwrap()
    }

    struct Fixture {
        host: MemHost,
        token: Token,
        user: Account,
        operator: Kid,
    }

    /// Token with an ETH bridge account held by the operator, and a funded
    /// user.
    fn fixture() -> Fixture {
        let host = MemHost::new();
        host.begin_tx("tx-setup", TxTime::new(100, 0));
        let operator = kid(9);
        let holders: BTreeSet<Kid> = [operator.clone()].into();
        let registry = TokenRegistry::new(&host);
        let mut token = registry
            .create(
                "WRP",
                0,
                Amount::from_i64(1_000_000),
                Amount::zero(),
                &holders,
                &operator,
            )
            .unwrap();

        let accounts = AccountLedger::new(&host);
        let bridge = accounts.create_personal("WRP", &operator).unwrap();
        token.wrap_bridge = Some(BTreeMap::from([(
            "ETH".to_owned(),
            bridge.address().clone(),
        )]));
        registry.put(&token).unwrap();

        let user = accounts.create_personal("WRP", &kid(1)).unwrap();
        let balances = BalanceLedger::new(&host);
        let mut balance = balances.get_or_create(user.address()).unwrap();
        balances
            .apply(
                &mut balance,
                &Amount::from_i64(1000),
                LogType::Receive,
                None,
                None,
                None,
            )
            .unwrap();

        Fixture {
            host,
            token,
            user,
            operator,
        }
    }

    fn balance_of(host: &MemHost, address: &Address) -> Amount {
        BalanceLedger::new(host)
            .get_or_create(address)
            .unwrap()
            .amount
    }

    #[test]
    fn wrap_moves_value_to_bridge() {
        let f = fixture();
        f.host.begin_tx("tx-wrap", TxTime::new(200, 0));
        let wraps = WrapLedger::new(&f.host);
        let log = wraps
            .wrap(
                &f.token,
                &f.user,
                &Amount::from_i64(300),
                &Amount::from_i64(5),
                "ETH",
                "0xabc",
                None,
            )
            .unwrap();
        assert_eq!(log.diff, -305);
        assert_eq!(balance_of(&f.host, f.user.address()), 695);

        let bridge = f.token.bridge_account("ETH").unwrap();
        assert_eq!(balance_of(&f.host, bridge), 300);
        // The bridge toll left a fee record.
        assert_eq!(f.host.keys_with_prefix(keys::FEE).len(), 1);
    }

    #[test]
    fn wrap_requires_bridge_config() {
        let f = fixture();
        f.host.begin_tx("tx-wrap", TxTime::new(200, 0));
        let err = WrapLedger::new(&f.host)
            .wrap(
                &f.token,
                &f.user,
                &Amount::from_i64(10),
                &Amount::zero(),
                "BTC",
                "addr",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoWrapBridge(_)));
    }

    #[test]
    fn unwrap_is_at_most_once() {
        let f = fixture();
        f.host.begin_tx("tx-wrap", TxTime::new(200, 0));
        let wraps = WrapLedger::new(&f.host);
        wraps
            .wrap(
                &f.token,
                &f.user,
                &Amount::from_i64(300),
                &Amount::zero(),
                "ETH",
                "0xabc",
                None,
            )
            .unwrap();

        f.host.begin_tx("tx-unwrap", TxTime::new(300, 0));
        wraps
            .unwrap(
                &f.token,
                &f.user,
                &Amount::from_i64(200),
                "ETH",
                "0xabc",
                "ext-tx-1",
                None,
                &f.operator,
            )
            .unwrap();
        assert_eq!(balance_of(&f.host, f.user.address()), 900);

        // Replaying the same external transaction fails and moves nothing.
        f.host.begin_tx("tx-unwrap-2", TxTime::new(310, 0));
        let err = wraps
            .unwrap(
                &f.token,
                &f.user,
                &Amount::from_i64(200),
                "ETH",
                "0xabc",
                "ext-tx-1",
                None,
                &f.operator,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateUnwrap));
        assert_eq!(balance_of(&f.host, f.user.address()), 900);
    }

    #[test]
    fn unwrap_requires_bridge_holder() {
        let f = fixture();
        f.host.begin_tx("tx-unwrap", TxTime::new(300, 0));
        let err = WrapLedger::new(&f.host)
            .unwrap(
                &f.token,
                &f.user,
                &Amount::from_i64(10),
                "ETH",
                "0xabc",
                "ext-tx-2",
                None,
                &kid(1),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoAuthority(_)));
    }
}
