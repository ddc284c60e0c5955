//! The multi-signature contract bridge.
//!
//! An operation that needs more than one signer never executes
//! synchronously. Phase 1 escrows the sender's value into a pending
//! balance, encodes the operation as a JSON-array document, and hands
//! `(document, expiry, signers)` to the coordination service, whose
//! contract id is stored on the escrow. When every signer approves, the
//! coordinator calls back with `execute`; on expiry or rejection with
//! `cancel`. Callbacks dispatch on the document's leading kind tag.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tessera_store::{Host, StateGateway};
use tessera_types::{Address, Amount, Kid, TxTime};
use tracing::{info, warn};

use crate::account::AccountLedger;
use crate::balance::{Balance, BalanceLedger, LogType};
use crate::error::LedgerError;
use crate::fee::FeeLedger;
use crate::pay::PayLedger;
use crate::pending::{PendingBalance, PendingLedger, PendingType};
use crate::token::TokenRegistry;

/// Most signers a contract may require.
pub const MAX_SIGNERS: usize = 128;

/// A contract document: `[kind, ...payload]`, interpreted only by the
/// kind-specific executors.
#[derive(Clone, Debug)]
pub struct ContractDoc(Vec<Value>);

impl ContractDoc {
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        let values: Vec<Value> = serde_json::from_str(text).map_err(|e| {
            LedgerError::InvalidContractDocument(format!("not a JSON array: {e}"))
        })?;
        if values.is_empty() {
            return Err(LedgerError::InvalidContractDocument("empty document".into()));
        }
        Ok(Self(values))
    }

    pub fn to_json(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }

    pub fn kind(&self) -> Result<&str, LedgerError> {
        self.0[0]
            .as_str()
            .ok_or_else(|| LedgerError::InvalidContractDocument("missing kind".into()))
    }

    fn str_at(&self, index: usize) -> Result<&str, LedgerError> {
        self.0
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| field_error(index, "string"))
    }

    fn opt_str_at(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(Value::as_str)
    }

    fn amount_at(&self, index: usize) -> Result<Amount, LedgerError> {
        let value = self.0.get(index).ok_or_else(|| field_error(index, "number"))?;
        if !value.is_number() {
            return Err(field_error(index, "number"));
        }
        Amount::parse(&value.to_string())
            .map_err(|_| field_error(index, "integer amount"))
    }

    fn addr_at(&self, index: usize) -> Result<Address, LedgerError> {
        Address::parse(self.str_at(index)?)
            .map_err(|e| LedgerError::InvalidContractDocument(e.to_string()))
    }

    fn i64_at(&self, index: usize) -> Result<i64, LedgerError> {
        self.0
            .get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| field_error(index, "integer"))
    }

    // ── Builders, one per deferred operation kind ───────────────────────

    pub fn pay(pb_id: &str, sender: &Address, receiver: &Address, amount: &Amount, memo: &str) -> Self {
        Self(vec![
            json!("pay"),
            json!(pb_id),
            json!(sender.to_string()),
            json!(receiver.to_string()),
            amount_value(amount),
            json!(memo),
        ])
    }

    pub fn transfer(
        pb_id: &str,
        sender: &Address,
        receiver: &Address,
        amount: &Amount,
        memo: &str,
        lock_until_secs: i64,
    ) -> Self {
        Self(vec![
            json!("transfer"),
            json!(pb_id),
            json!(sender.to_string()),
            json!(receiver.to_string()),
            amount_value(amount),
            json!(memo),
            json!(lock_until_secs),
        ])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn wrap(
        pb_id: &str,
        sender: &Address,
        ext_code: &str,
        ext_id: &str,
        amount: &Amount,
        fee: &Amount,
        memo: &str,
    ) -> Self {
        Self(vec![
            json!("wrap"),
            json!(pb_id),
            json!(sender.to_string()),
            json!(ext_code),
            json!(ext_id),
            amount_value(amount),
            amount_value(fee),
            json!(memo),
        ])
    }

    pub fn mint(code: &str, amount: &Amount) -> Self {
        Self(vec![json!("token/mint"), json!(code), amount_value(amount)])
    }

    pub fn burn(code: &str, amount: &Amount) -> Self {
        Self(vec![json!("token/burn"), json!(code), amount_value(amount)])
    }

    pub fn create(
        code: &str,
        decimal: u8,
        max_supply: &Amount,
        initial_supply: &Amount,
        holders: &BTreeSet<Kid>,
    ) -> Self {
        let mut values = vec![
            json!("token/create"),
            json!(code),
            json!(decimal),
            amount_value(max_supply),
            amount_value(initial_supply),
        ];
        values.extend(holders.iter().map(|k| json!(k.as_str())));
        Self(values)
    }
}

fn amount_value(amount: &Amount) -> Value {
    serde_json::to_value(amount).expect("amount serializes")
}

fn field_error(index: usize, expected: &str) -> LedgerError {
    LedgerError::InvalidContractDocument(format!("field {index} must be a {expected}"))
}

/// A deferred operation after phase 1: escrow written, contract open.
#[derive(Clone, Debug)]
pub struct DeferredOp {
    pub pending_balance_id: String,
    pub contract_id: String,
}

pub struct ContractBridge<'a, H: Host> {
    gw: StateGateway<'a, H>,
    coordinator: String,
}

impl<'a, H: Host> ContractBridge<'a, H> {
    pub fn new(host: &'a H, coordinator: &str) -> Self {
        Self {
            gw: StateGateway::new(host),
            coordinator: coordinator.to_owned(),
        }
    }

    /// Open a contract with the coordination service; returns its id.
    pub fn propose(
        &self,
        doc: &ContractDoc,
        expiry_secs: i64,
        signers: &BTreeSet<Kid>,
    ) -> Result<String, LedgerError> {
        if signers.len() > MAX_SIGNERS {
            return Err(LedgerError::TooManySigners);
        }
        if signers.len() < 2 {
            return Err(LedgerError::InvalidContractDocument(
                "a contract needs at least two signers".into(),
            ));
        }
        let signer_list = signers
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let response = self.gw.host().invoke(
            &self.coordinator,
            &[
                "create",
                &doc.to_json(),
                &expiry_secs.to_string(),
                &signer_list,
            ],
        )?;
        let contract_id = String::from_utf8(response)
            .map_err(|_| LedgerError::Internal("coordinator returned invalid id".into()))?
            .trim()
            .to_owned();
        if contract_id.is_empty() {
            return Err(LedgerError::Internal("coordinator returned empty id".into()));
        }
        info!(%contract_id, kind = doc.kind()?, "contract proposed");
        Ok(contract_id)
    }

    /// Phase 1 for a value-moving kind: escrow `amount + fee` from the
    /// sender, open the contract, and bind its id to the escrow.
    pub fn defer_with_escrow(
        &self,
        sender_balance: &mut Balance,
        amount: Amount,
        fee: Option<Amount>,
        build_doc: impl FnOnce(&str) -> ContractDoc,
        expiry_secs: i64,
        signers: &BTreeSet<Kid>,
        memo: Option<&str>,
    ) -> Result<DeferredOp, LedgerError> {
        let host = self.gw.host();
        let now = host.tx_time();
        let pendings = PendingLedger::new(host);
        let mut pending = pendings.escrow(
            sender_balance,
            amount,
            fee,
            TxTime::new(now.secs() + expiry_secs, now.nanos()),
            memo,
        )?;
        let doc = build_doc(&pending.id);
        let contract_id = self.propose(&doc, expiry_secs, signers)?;
        pendings.bind_contract(&mut pending, &contract_id)?;
        Ok(DeferredOp {
            pending_balance_id: pending.id,
            contract_id,
        })
    }

    /// Phase 1 for a kind that moves no value up front (mint, create).
    pub fn defer(
        &self,
        doc: &ContractDoc,
        expiry_secs: i64,
        signers: &BTreeSet<Kid>,
    ) -> Result<DeferredOp, LedgerError> {
        let contract_id = self.propose(doc, expiry_secs, signers)?;
        Ok(DeferredOp {
            pending_balance_id: String::new(),
            contract_id,
        })
    }

    /// All-signers-approved callback. Dispatches on the document kind,
    /// consumes the escrow where one exists, and applies the operation.
    pub fn execute(&self, contract_id: &str, doc: &ContractDoc) -> Result<Value, LedgerError> {
        let host = self.gw.host();
        match doc.kind()? {
            "pay" => {
                let pending = self.consume_escrow(contract_id, doc.str_at(1)?)?;
                let sender = doc.addr_at(2)?;
                let receiver_address = doc.addr_at(3)?;
                let amount = doc.amount_at(4)?;
                let memo = doc.opt_str_at(5).filter(|m| !m.is_empty());

                let receiver = AccountLedger::new(host).get(&receiver_address)?;
                receiver.assert_not_suspended()?;
                let chunk = PayLedger::new(host).write_chunk(
                    &receiver_address,
                    amount,
                    sender.to_string(),
                    None,
                    memo,
                )?;
                self.settle_fee(&receiver.token().to_owned(), &sender, &pending)?;
                Ok(serde_json::to_value(&chunk)?)
            }
            "transfer" => {
                let pending = self.consume_escrow(contract_id, doc.str_at(1)?)?;
                let sender = doc.addr_at(2)?;
                let receiver_address = doc.addr_at(3)?;
                let amount = doc.amount_at(4)?;
                let memo = doc.opt_str_at(5).filter(|m| !m.is_empty());
                let lock_until = doc.i64_at(6).unwrap_or(0);

                let receiver = AccountLedger::new(host).get(&receiver_address)?;
                receiver.assert_not_suspended()?;
                let now = host.tx_time();
                let balances = BalanceLedger::new(host);
                let result = if lock_until > now.secs() {
                    let held = PendingLedger::new(host).hold(
                        &receiver_address,
                        amount,
                        &sender,
                        TxTime::new(lock_until, 0),
                    )?;
                    serde_json::to_value(&held)?
                } else {
                    let mut receiver_balance = balances.get_or_create(&receiver_address)?;
                    let log = balances.apply(
                        &mut receiver_balance,
                        &amount,
                        LogType::Receive,
                        memo,
                        Some(sender.to_string()),
                        None,
                    )?;
                    serde_json::to_value(&log)?
                };
                self.settle_fee(&receiver.token().to_owned(), &sender, &pending)?;
                Ok(result)
            }
            "wrap" => {
                let pending = self.consume_escrow(contract_id, doc.str_at(1)?)?;
                let sender = doc.addr_at(2)?;
                let ext_code = doc.str_at(3)?;
                let amount = doc.amount_at(5)?;
                let memo = doc.opt_str_at(7).filter(|m| !m.is_empty());

                let sender_account = AccountLedger::new(host).get(&sender)?;
                let registry = TokenRegistry::new(host);
                let token = registry.get(sender_account.token())?;
                let bridge_address = token.bridge_account(ext_code)?.clone();
                let balances = BalanceLedger::new(host);
                let mut bridge_balance = balances.get_or_create(&bridge_address)?;
                let log = balances.apply(
                    &mut bridge_balance,
                    &amount,
                    LogType::Wrap,
                    memo,
                    Some(sender.to_string()),
                    None,
                )?;
                self.settle_fee(&token.code, &sender, &pending)?;
                Ok(serde_json::to_value(&log)?)
            }
            "token/mint" => {
                let registry = TokenRegistry::new(host);
                let mut token = registry.get(doc.str_at(1)?)?;
                let supply = registry.mint(&mut token, &doc.amount_at(2)?)?;
                Ok(json!({ "token": token.code, "supply": supply }))
            }
            "token/burn" => {
                let registry = TokenRegistry::new(host);
                let mut token = registry.get(doc.str_at(1)?)?;
                let supply = registry.burn(&mut token, &doc.amount_at(2)?)?;
                Ok(json!({ "token": token.code, "supply": supply }))
            }
            "token/create" => {
                let code = doc.str_at(1)?;
                let decimal = doc.i64_at(2)? as u8;
                let max_supply = doc.amount_at(3)?;
                let initial_supply = doc.amount_at(4)?;
                let mut holders = BTreeSet::new();
                for index in 5..self.doc_len(doc) {
                    holders.insert(
                        Kid::new(doc.str_at(index)?)
                            .map_err(|e| LedgerError::InvalidContractDocument(e.to_string()))?,
                    );
                }
                let creator = holders
                    .iter()
                    .next()
                    .cloned()
                    .ok_or_else(|| {
                        LedgerError::InvalidContractDocument("missing holders".into())
                    })?;
                let token = TokenRegistry::new(host).create(
                    code,
                    decimal,
                    max_supply,
                    initial_supply,
                    &holders,
                    &creator,
                )?;
                Ok(serde_json::to_value(&token)?)
            }
            other => Err(LedgerError::InvalidContractDocument(format!(
                "unknown kind: {other}"
            ))),
        }
    }

    /// Expiry-or-rejection callback: refund the escrow where one exists.
    pub fn cancel(&self, contract_id: &str, doc: &ContractDoc) -> Result<Value, LedgerError> {
        match doc.kind()? {
            "pay" | "transfer" | "wrap" => {
                let pendings = PendingLedger::new(self.gw.host());
                let pending = pendings.get(doc.str_at(1)?)?;
                self.check_escrow(&pending, contract_id)?;
                let balances = BalanceLedger::new(self.gw.host());
                let mut balance = balances.get_or_create(&pending.account)?;
                pendings.withdraw(&pending, &mut balance, Some("contract cancelled"))?;
                info!(contract_id, pb = %pending.id, "contract escrow refunded");
                Ok(json!({ "refunded": pending.total() }))
            }
            "token/mint" | "token/burn" | "token/create" => {
                warn!(contract_id, kind = doc.kind()?, "contract cancelled");
                Ok(json!({ "cancelled": true }))
            }
            other => Err(LedgerError::InvalidContractDocument(format!(
                "unknown kind: {other}"
            ))),
        }
    }

    fn doc_len(&self, doc: &ContractDoc) -> usize {
        doc.0.len()
    }

    fn consume_escrow(
        &self,
        contract_id: &str,
        pb_id: &str,
    ) -> Result<PendingBalance, LedgerError> {
        let pendings = PendingLedger::new(self.gw.host());
        let pending = pendings
            .get(pb_id)
            .map_err(|_| LedgerError::InvalidContractDocument(format!(
                "unknown pending balance: {pb_id}"
            )))?;
        pendings.consume(&pending, contract_id)?;
        Ok(pending)
    }

    fn check_escrow(
        &self,
        pending: &PendingBalance,
        contract_id: &str,
    ) -> Result<(), LedgerError> {
        if pending.kind != PendingType::Contract || pending.rid != contract_id {
            return Err(LedgerError::InvalidContractDocument(format!(
                "contract id mismatch for pending balance {}",
                pending.id
            )));
        }
        Ok(())
    }

    fn settle_fee(
        &self,
        code: &str,
        payer: &Address,
        pending: &PendingBalance,
    ) -> Result<(), LedgerError> {
        if let Some(fee) = &pending.fee {
            let token = TokenRegistry::new(self.gw.host()).get(code)?;
            FeeLedger::new(self.gw.host()).record_fee(&token, payer, fee)?;
        }
        Ok(())
    }
}
