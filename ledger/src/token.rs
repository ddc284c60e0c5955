//! The token registry.
//!
//! A token owns its supply ceiling, its genesis account (a joint account
//! held by the operators, into which fees accrue), the fee policy text, and
//! the wrap-bridge table. Supply always stays within `[0, max_supply]`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tessera_store::{keys, Host, StateGateway, StoreError};
use tessera_types::{Address, Amount, Kid, TxTime};
use tracing::info;

use crate::account::{Account, AccountLedger};
use crate::balance::{BalanceLedger, LogType};
use crate::error::LedgerError;

/// Upper bound of the `decimal` places a token may declare.
pub const MAX_DECIMAL: u8 = 18;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "@token")]
    pub code: String,
    pub decimal: u8,
    pub max_supply: Amount,
    pub supply: Amount,
    pub genesis_account: Address,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fee_policy: Option<String>,
    /// External chain code → bridge account holding wrapped value.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wrap_bridge: Option<BTreeMap<String, Address>>,
    /// Fee id of the last record folded into the genesis balance.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_pruned_fee_id: Option<String>,
    pub created: TxTime,
    pub updated: TxTime,
}

impl Token {
    /// Bridge account for an external chain code.
    pub fn bridge_account(&self, ext_code: &str) -> Result<&Address, LedgerError> {
        self.wrap_bridge
            .as_ref()
            .and_then(|m| m.get(ext_code))
            .ok_or_else(|| LedgerError::NoWrapBridge(ext_code.to_owned()))
    }
}

pub struct TokenRegistry<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> TokenRegistry<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    pub fn get(&self, code: &str) -> Result<Token, LedgerError> {
        self.gw
            .get::<Token>(&keys::token(code))?
            .ok_or_else(|| LedgerError::NotIssuedToken(code.to_owned()))
    }

    pub fn put(&self, token: &Token) -> Result<(), LedgerError> {
        Ok(self.gw.put(&keys::token(&token.code), token)?)
    }

    /// Issue a token: create the joint genesis account owned by `holders`,
    /// credit the initial supply, and write the token document.
    pub fn create(
        &self,
        code: &str,
        decimal: u8,
        max_supply: Amount,
        initial_supply: Amount,
        holders: &BTreeSet<Kid>,
        creator: &Kid,
    ) -> Result<Token, LedgerError> {
        tessera_types::address::validate_code(code)?;
        if decimal > MAX_DECIMAL {
            return Err(LedgerError::InvalidAmount(format!(
                "decimal must be at most {MAX_DECIMAL}"
            )));
        }
        if max_supply.is_negative() || initial_supply.is_negative() {
            return Err(LedgerError::Supply("supply must not be negative".into()));
        }
        if initial_supply > max_supply {
            return Err(LedgerError::Supply(
                "initial supply exceeds max supply".into(),
            ));
        }
        if self.gw.exists(&keys::token(code))? {
            return Err(LedgerError::ExistedToken(code.to_owned()));
        }

        let accounts = AccountLedger::new(self.gw.host());
        let genesis = accounts.create_joint(code, holders, creator)?;

        let balances = BalanceLedger::new(self.gw.host());
        let mut balance = balances.get_or_create(genesis.address())?;
        if initial_supply.is_positive() {
            balances.apply(
                &mut balance,
                &initial_supply,
                LogType::Mint,
                None,
                None,
                None,
            )?;
        }

        let now = self.gw.host().tx_time();
        let token = Token {
            code: code.to_owned(),
            decimal,
            max_supply,
            supply: initial_supply,
            genesis_account: genesis.address().clone(),
            fee_policy: None,
            wrap_bridge: None,
            last_pruned_fee_id: None,
            created: now,
            updated: now,
        };
        self.gw
            .insert(&keys::token(code), &token)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => LedgerError::ExistedToken(code.to_owned()),
                other => other.into(),
            })?;
        info!(token = code, genesis = %token.genesis_account, "token issued");
        Ok(token)
    }

    /// Genesis account of a token, with a holder assertion for the
    /// operator-only operations.
    pub fn genesis_account(&self, token: &Token) -> Result<Account, LedgerError> {
        AccountLedger::new(self.gw.host()).get(&token.genesis_account)
    }

    /// Raise the supply and credit the genesis balance.
    pub fn mint(&self, token: &mut Token, amount: &Amount) -> Result<Amount, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "mint amount must be positive".into(),
            ));
        }
        let next = token.supply.add(amount);
        if next > token.max_supply {
            return Err(LedgerError::Supply("max supply exceeded".into()));
        }

        let balances = BalanceLedger::new(self.gw.host());
        let mut balance = balances.get_or_create(&token.genesis_account)?;
        balances.apply(&mut balance, amount, LogType::Mint, None, None, None)?;

        token.supply = next;
        token.updated = self.gw.host().tx_time();
        self.put(token)?;
        Ok(token.supply.clone())
    }

    /// Lower the supply by debiting the genesis balance.
    pub fn burn(&self, token: &mut Token, amount: &Amount) -> Result<Amount, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "burn amount must be positive".into(),
            ));
        }
        if token.supply < *amount {
            return Err(LedgerError::Supply("supply underflow".into()));
        }
        let balances = BalanceLedger::new(self.gw.host());
        let mut balance = balances.get_or_create(&token.genesis_account)?;
        if balance.amount < *amount {
            return Err(LedgerError::Supply(
                "not enough genesis balance to burn".into(),
            ));
        }
        balances.apply(
            &mut balance,
            &amount.neg(),
            LogType::Burn,
            None,
            None,
            None,
        )?;

        token.supply = token.supply.sub(amount);
        token.updated = self.gw.host().tx_time();
        self.put(token)?;
        Ok(token.supply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::MemHost;

    fn kid(n: u8) -> Kid {
        Kid::new(&format!("{:040x}", n)).unwrap()
    }

    fn host() -> MemHost {
        let h = MemHost::new();
        h.begin_tx("tx-create", TxTime::new(100, 0));
        h
    }

    fn single_holder() -> BTreeSet<Kid> {
        [kid(1)].into()
    }

    #[test]
    fn create_token_with_initial_supply() {
        let h = host();
        let registry = TokenRegistry::new(&h);
        let token = registry
            .create(
                "ABC",
                2,
                Amount::from_i64(1000),
                Amount::from_i64(100),
                &single_holder(),
                &kid(1),
            )
            .unwrap();
        assert_eq!(token.supply, 100);
        assert!(token.genesis_account.is_joint());

        let balance = BalanceLedger::new(&h)
            .get_or_create(&token.genesis_account)
            .unwrap();
        assert_eq!(balance.amount, 100);
    }

    #[test]
    fn duplicate_code_rejected() {
        let h = host();
        let registry = TokenRegistry::new(&h);
        registry
            .create(
                "ABC",
                0,
                Amount::from_i64(10),
                Amount::zero(),
                &single_holder(),
                &kid(1),
            )
            .unwrap();
        h.begin_tx("tx-2", TxTime::new(101, 0));
        assert!(matches!(
            registry.create(
                "ABC",
                0,
                Amount::from_i64(10),
                Amount::zero(),
                &single_holder(),
                &kid(1),
            ),
            Err(LedgerError::ExistedToken(_))
        ));
    }

    #[test]
    fn create_validations() {
        let h = host();
        let registry = TokenRegistry::new(&h);
        let holders = single_holder();
        assert!(registry
            .create("ab", 0, Amount::zero(), Amount::zero(), &holders, &kid(1))
            .is_err());
        assert!(registry
            .create("ABC", 19, Amount::zero(), Amount::zero(), &holders, &kid(1))
            .is_err());
        assert!(matches!(
            registry.create(
                "ABC",
                0,
                Amount::from_i64(10),
                Amount::from_i64(11),
                &holders,
                &kid(1)
            ),
            Err(LedgerError::Supply(_))
        ));
    }

    #[test]
    fn mint_then_burn_scenario() {
        let h = host();
        let registry = TokenRegistry::new(&h);
        let mut token = registry
            .create(
                "ABC",
                2,
                Amount::from_i64(1000),
                Amount::zero(),
                &single_holder(),
                &kid(1),
            )
            .unwrap();

        h.begin_tx("tx-mint", TxTime::new(101, 0));
        registry.mint(&mut token, &Amount::from_i64(500)).unwrap();
        assert_eq!(token.supply, 500);

        h.begin_tx("tx-burn", TxTime::new(102, 0));
        registry.burn(&mut token, &Amount::from_i64(300)).unwrap();
        assert_eq!(token.supply, 200);
        let balance = BalanceLedger::new(&h)
            .get_or_create(&token.genesis_account)
            .unwrap();
        assert_eq!(balance.amount, 200);

        h.begin_tx("tx-burn-2", TxTime::new(103, 0));
        assert!(matches!(
            registry.burn(&mut token, &Amount::from_i64(300)),
            Err(LedgerError::Supply(_))
        ));
    }

    #[test]
    fn mint_respects_ceiling() {
        let h = host();
        let registry = TokenRegistry::new(&h);
        let mut token = registry
            .create(
                "ABC",
                0,
                Amount::from_i64(100),
                Amount::from_i64(90),
                &single_holder(),
                &kid(1),
            )
            .unwrap();
        h.begin_tx("tx-mint", TxTime::new(101, 0));
        assert!(matches!(
            registry.mint(&mut token, &Amount::from_i64(20)),
            Err(LedgerError::Supply(_))
        ));
    }
}
