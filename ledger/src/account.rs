//! Personal and joint accounts, and the holder reverse index.
//!
//! A personal account binds one identity to one token; its address is
//! deterministic, so re-creation collides. A joint account carries an
//! explicit holder set and only comes into existence as a token's genesis
//! account; holder membership changes afterwards through the holder ops.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tessera_store::host::SortSpec;
use tessera_store::{keys, Host, KvPage, StateGateway};
use tessera_types::{AccountType, Address, Kid, TxTime};
use tracing::debug;

use crate::error::LedgerError;

/// Maximum holders of a joint account.
pub const MAX_HOLDERS: usize = 128;

/// A ledger account: the tag is the account type, the payload what that
/// type needs beyond the common fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Account {
    Personal {
        #[serde(rename = "@account")]
        address: Address,
        token: String,
        created: TxTime,
        updated: TxTime,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        suspended_time: Option<TxTime>,
    },
    Joint {
        #[serde(rename = "@account")]
        address: Address,
        token: String,
        holders: BTreeSet<Kid>,
        creator: Kid,
        created: TxTime,
        updated: TxTime,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        suspended_time: Option<TxTime>,
    },
}

impl Account {
    pub fn address(&self) -> &Address {
        match self {
            Account::Personal { address, .. } | Account::Joint { address, .. } => address,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Account::Personal { token, .. } | Account::Joint { token, .. } => token,
        }
    }

    pub fn account_type(&self) -> AccountType {
        match self {
            Account::Personal { .. } => AccountType::Personal,
            Account::Joint { .. } => AccountType::Joint,
        }
    }

    pub fn suspended_time(&self) -> Option<TxTime> {
        match self {
            Account::Personal { suspended_time, .. }
            | Account::Joint { suspended_time, .. } => *suspended_time,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_time().is_some()
    }

    /// Membership test: personal accounts compare the id hash embedded in
    /// the address, joint accounts test the holder set.
    pub fn has_holder(&self, kid: &Kid) -> bool {
        match self {
            Account::Personal { address, .. } => address.holds(kid),
            Account::Joint { holders, .. } => holders.contains(kid),
        }
    }

    /// Holder set used as the signer set of deferred operations.
    pub fn signers(&self) -> BTreeSet<Kid> {
        match self {
            Account::Personal { address, .. } => {
                let mut set = BTreeSet::new();
                if let Ok(kid) = Kid::new(&address.kid_hex()) {
                    set.insert(kid);
                }
                set
            }
            Account::Joint { holders, .. } => holders.clone(),
        }
    }

    pub fn assert_holder(&self, kid: &Kid) -> Result<(), LedgerError> {
        if self.has_holder(kid) {
            Ok(())
        } else {
            Err(LedgerError::NoAuthority(format!(
                "not a holder of {}",
                self.address()
            )))
        }
    }

    pub fn assert_not_suspended(&self) -> Result<(), LedgerError> {
        if self.is_suspended() {
            Err(LedgerError::Suspended(self.address().to_string()))
        } else {
            Ok(())
        }
    }
}

/// Reverse index entry `(kid, address)` for listing the accounts an
/// identity controls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HolderEdge {
    #[serde(rename = "@holder")]
    pub kid: Kid,
    pub address: Address,
    pub token: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub created: TxTime,
}

pub struct AccountLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> AccountLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    /// Create the personal account of `kid` for a token. The address is
    /// deterministic, so a second creation fails.
    pub fn create_personal(&self, code: &str, kid: &Kid) -> Result<Account, LedgerError> {
        let now = self.gw.host().tx_time();
        let address = Address::personal(code, kid.as_str())?;
        let account = Account::Personal {
            address: address.clone(),
            token: code.to_owned(),
            created: now,
            updated: now,
            suspended_time: None,
        };
        self.gw
            .insert(&keys::account(&address), &account)
            .map_err(|e| match e {
                tessera_store::StoreError::AlreadyExists(_) => LedgerError::ExistedAccount,
                other => other.into(),
            })?;
        self.put_holder_edge(kid, &account)?;
        debug!(%address, token = code, "created personal account");
        Ok(account)
    }

    /// Create a joint account keyed by the current transaction id. Only the
    /// token registry calls this (genesis accounts); an address collision is
    /// not retryable within the transaction.
    pub fn create_joint(
        &self,
        code: &str,
        holders: &BTreeSet<Kid>,
        creator: &Kid,
    ) -> Result<Account, LedgerError> {
        if holders.is_empty() {
            return Err(LedgerError::Other("at least one holder required".into()));
        }
        if holders.len() > MAX_HOLDERS {
            return Err(LedgerError::TooManySigners);
        }
        if !holders.contains(creator) {
            return Err(LedgerError::Other("creator must be a holder".into()));
        }
        let now = self.gw.host().tx_time();
        let address = Address::joint(code, &self.gw.host().tx_id())?;
        let account = Account::Joint {
            address: address.clone(),
            token: code.to_owned(),
            holders: holders.clone(),
            creator: creator.clone(),
            created: now,
            updated: now,
            suspended_time: None,
        };
        self.gw
            .insert(&keys::account(&address), &account)
            .map_err(|e| match e {
                tessera_store::StoreError::AlreadyExists(key) => {
                    LedgerError::Internal(format!("joint address collision at {key}"))
                }
                other => other.into(),
            })?;
        for kid in holders {
            self.put_holder_edge(kid, &account)?;
        }
        debug!(%address, token = code, holders = holders.len(), "created joint account");
        Ok(account)
    }

    pub fn get(&self, address: &Address) -> Result<Account, LedgerError> {
        self.gw
            .get::<Account>(&keys::account(address))?
            .ok_or_else(|| LedgerError::NotExistedAccount(address.to_string()))
    }

    /// Mark the account suspended: it stops acting as sender or receiver of
    /// value-moving operations.
    pub fn suspend(&self, address: &Address, caller: &Kid) -> Result<Account, LedgerError> {
        let mut account = self.get(address)?;
        account.assert_holder(caller)?;
        if account.is_suspended() {
            return Err(LedgerError::Suspended(address.to_string()));
        }
        let now = self.gw.host().tx_time();
        self.set_suspension(&mut account, Some(now), now)?;
        Ok(account)
    }

    pub fn unsuspend(&self, address: &Address, caller: &Kid) -> Result<Account, LedgerError> {
        let mut account = self.get(address)?;
        account.assert_holder(caller)?;
        if !account.is_suspended() {
            return Err(LedgerError::Other(format!(
                "account is not suspended: {address}"
            )));
        }
        let now = self.gw.host().tx_time();
        self.set_suspension(&mut account, None, now)?;
        Ok(account)
    }

    /// Add a holder to a joint account. The caller must already hold it.
    pub fn add_holder(
        &self,
        address: &Address,
        kid: &Kid,
        caller: &Kid,
    ) -> Result<Account, LedgerError> {
        let mut account = self.get(address)?;
        account.assert_holder(caller)?;
        let now = self.gw.host().tx_time();
        let Account::Joint {
            holders, updated, ..
        } = &mut account
        else {
            return Err(LedgerError::Other("not a joint account".into()));
        };
        if holders.len() >= MAX_HOLDERS {
            return Err(LedgerError::TooManySigners);
        }
        if !holders.insert(kid.clone()) {
            return Err(LedgerError::Other(format!("already a holder: {kid}")));
        }
        *updated = now;
        self.gw.put(&keys::account(address), &account)?;
        self.put_holder_edge(kid, &account)?;
        Ok(account)
    }

    /// Remove a holder from a joint account. The resulting set must keep at
    /// least two members, and the creating holder can never be removed.
    pub fn remove_holder(
        &self,
        address: &Address,
        kid: &Kid,
        caller: &Kid,
    ) -> Result<Account, LedgerError> {
        let mut account = self.get(address)?;
        account.assert_holder(caller)?;
        let now = self.gw.host().tx_time();
        let Account::Joint {
            holders,
            creator,
            updated,
            ..
        } = &mut account
        else {
            return Err(LedgerError::Other("not a joint account".into()));
        };
        if kid == creator {
            return Err(LedgerError::Other("cannot remove the creating holder".into()));
        }
        if !holders.remove(kid) {
            return Err(LedgerError::Other(format!("not a holder: {kid}")));
        }
        if holders.len() < 2 {
            return Err(LedgerError::Other(
                "joint account needs at least two holders".into(),
            ));
        }
        *updated = now;
        self.gw.put(&keys::account(address), &account)?;
        self.gw.delete(&keys::holder(kid, address))?;
        Ok(account)
    }

    /// Accounts an identity controls, optionally filtered by token.
    pub fn list_by_holder(
        &self,
        kid: &Kid,
        token: Option<&str>,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, LedgerError> {
        let mut selector = json!({ "@holder": kid.as_str() });
        if let Some(code) = token {
            selector["token"] = json!(code);
        }
        Ok(self.gw.query(
            &selector,
            &[SortSpec::asc("created")],
            page_size,
            bookmark,
        )?)
    }

    fn set_suspension(
        &self,
        account: &mut Account,
        time: Option<TxTime>,
        now: TxTime,
    ) -> Result<(), LedgerError> {
        match account {
            Account::Personal {
                suspended_time,
                updated,
                ..
            }
            | Account::Joint {
                suspended_time,
                updated,
                ..
            } => {
                *suspended_time = time;
                *updated = now;
            }
        }
        self.gw.put(&keys::account(account.address()), account)?;
        Ok(())
    }

    fn put_holder_edge(&self, kid: &Kid, account: &Account) -> Result<(), LedgerError> {
        let edge = HolderEdge {
            kid: kid.clone(),
            address: account.address().clone(),
            token: account.token().to_owned(),
            account_type: account.account_type(),
            created: self.gw.host().tx_time(),
        };
        self.gw.put(&keys::holder(kid, account.address()), &edge)?;
        Ok(())
    }
}
