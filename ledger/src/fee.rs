//! The fee engine.
//!
//! Token operators describe fees as `op=rate[,max];op=rate[,max];…` in the
//! token metadata. Debit operations look their rate up, skim
//! `floor(|amount| × rate)` (capped at `max` when nonzero) from the payer in
//! the same balance write, and leave a fee record. Records accumulate until
//! a genesis holder runs the fee prune, which folds a time window of them
//! into the genesis balance. A negative rate is a rebate: the payer is
//! credited and the record carries the negative amount, so the prune nets
//! rebates out of the genesis credit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, OnceLock};

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tessera_store::{keys, Host, KvPage, StateGateway};
use tessera_types::{Address, Amount, TxTime};
use tracing::{debug, info};

use crate::balance::{BalanceLedger, LogType};
use crate::error::LedgerError;
use crate::prune::{fold_window, PruneFold, SAFE_PRUNE_MARGIN_SECS};
use crate::token::Token;

/// One accrued fee, keyed `FEE_<token>_<sec><nsec>_<seq>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeeRecord {
    #[serde(rename = "@fee")]
    pub id: String,
    pub token: String,
    pub payer: Address,
    pub amount: Amount,
    pub created: TxTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeeRate {
    pub rate: f32,
    /// Cap on the absolute fee; `0` means uncapped.
    pub cap: i64,
}

/// Parsed per-operation fee rates of one token.
#[derive(Clone, Debug, Default)]
pub struct FeePolicy {
    rates: BTreeMap<String, FeeRate>,
}

impl FeePolicy {
    /// Parse the policy text. Empty input is a valid empty policy.
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        let mut rates = BTreeMap::new();
        for part in text.split(';').filter(|p| !p.is_empty()) {
            let (op, spec) = part.split_once('=').ok_or_else(|| {
                LedgerError::Internal(format!("malformed fee policy segment: {part}"))
            })?;
            let (rate_text, cap_text) = match spec.split_once(',') {
                Some((r, c)) => (r, Some(c)),
                None => (spec, None),
            };
            let rate: f32 = rate_text.parse().map_err(|_| {
                LedgerError::Internal(format!("malformed fee rate: {rate_text}"))
            })?;
            let cap: i64 = match cap_text {
                Some(c) => c.parse().map_err(|_| {
                    LedgerError::Internal(format!("malformed fee cap: {c}"))
                })?,
                None => 0,
            };
            rates.insert(op.trim().to_owned(), FeeRate { rate, cap });
        }
        Ok(Self { rates })
    }

    pub fn rate_for(&self, op: &str) -> Option<FeeRate> {
        self.rates.get(op).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// `floor(|amount| × rate)` in integer space (the rate scaled by 10⁹),
/// capped at `cap` when nonzero, signed like the rate.
pub fn compute_fee(amount: &Amount, rate: FeeRate) -> Amount {
    let scaled = (rate.rate as f64 * 1e9).round() as i64;
    if scaled == 0 || amount.is_zero() {
        return Amount::zero();
    }
    let mut magnitude: BigInt =
        amount.abs().into_big() * BigInt::from(scaled.abs()) / BigInt::from(1_000_000_000i64);
    if rate.cap > 0 {
        let cap = BigInt::from(rate.cap);
        if magnitude > cap {
            magnitude = cap;
        }
    }
    if scaled < 0 {
        magnitude = -magnitude;
    }
    Amount::from_big(magnitude)
}

/// Process-wide policy cache. Entries are pure functions of the persisted
/// token document; a cold instance reproduces identical results.
fn policy_cache() -> &'static Mutex<HashMap<String, FeePolicy>> {
    static CACHE: OnceLock<Mutex<HashMap<String, FeePolicy>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Drop a token's cached policy so the next read re-parses it.
pub fn refresh_fee_policy(code: &str) {
    policy_cache()
        .lock()
        .expect("fee policy cache poisoned")
        .remove(code);
}

pub struct FeeLedger<'a, H: Host> {
    gw: StateGateway<'a, H>,
}

impl<'a, H: Host> FeeLedger<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            gw: StateGateway::new(host),
        }
    }

    /// The token's fee policy, cached per token code.
    pub fn policy_for(&self, token: &Token) -> Result<FeePolicy, LedgerError> {
        let mut cache = policy_cache().lock().expect("fee policy cache poisoned");
        if let Some(policy) = cache.get(&token.code) {
            return Ok(policy.clone());
        }
        let policy = match &token.fee_policy {
            Some(text) => FeePolicy::parse(text)?,
            None => FeePolicy::default(),
        };
        debug!(token = %token.code, "fee policy parsed");
        cache.insert(token.code.clone(), policy.clone());
        Ok(policy)
    }

    /// Skim the policy fee for `op` off a debit of `amount`. Returns the
    /// signed fee the caller folds into the payer's balance diff (positive
    /// cost, negative rebate), zero when the policy is silent.
    pub fn apply_fee(
        &self,
        token: &Token,
        op: &str,
        payer: &Address,
        amount: &Amount,
    ) -> Result<Amount, LedgerError> {
        let Some(rate) = self.policy_for(token)?.rate_for(op) else {
            return Ok(Amount::zero());
        };
        let fee = compute_fee(amount, rate);
        if fee.is_zero() {
            return Ok(fee);
        }
        self.write_record(&token.code, payer, fee.clone())?;
        Ok(fee)
    }

    /// The fee `op` would cost on `amount`, without recording anything.
    /// Phase 1 of a deferred operation escrows this; the record is written
    /// when the contract executes.
    pub fn quote_fee(
        &self,
        token: &Token,
        op: &str,
        amount: &Amount,
    ) -> Result<Amount, LedgerError> {
        match self.policy_for(token)?.rate_for(op) {
            Some(rate) => Ok(compute_fee(amount, rate)),
            None => Ok(Amount::zero()),
        }
    }

    /// Record an explicitly priced fee (the wrap bridge toll). Skipped at
    /// zero.
    pub fn record_fee(
        &self,
        token: &Token,
        payer: &Address,
        fee: &Amount,
    ) -> Result<(), LedgerError> {
        if fee.is_zero() {
            return Ok(());
        }
        self.write_record(&token.code, payer, fee.clone())?;
        Ok(())
    }

    /// Fold accrued fees into the genesis balance and advance the token's
    /// fee cursor. The caller has already checked genesis-holder authority.
    pub fn prune(
        &self,
        token: &mut Token,
        until_secs: Option<i64>,
        safe: bool,
    ) -> Result<PruneFold, LedgerError> {
        let host = self.gw.host();
        let now = host.tx_time();
        let mut until = until_secs.unwrap_or(now.secs());
        if safe {
            let margin = now.seconds_ago(SAFE_PRUNE_MARGIN_SECS).secs();
            until = until.min(margin);
        }

        let prefix = keys::fee_prefix(&token.code);
        let start = match &token.last_pruned_fee_id {
            Some(id) => keys::key_after(&format!("{prefix}{id}")),
            None => prefix.clone(),
        };
        let end = format!("{prefix}{:010}{:09}", until + 1, 0);

        let fold = fold_window(&self.gw, &start, &end, |_, value| {
            let record: FeeRecord = serde_json::from_slice(value)
                .map_err(|e| LedgerError::Internal(format!("bad fee record: {e}")))?;
            Ok(record.amount)
        })?
        .ok_or_else(|| LedgerError::NotExistUtxoChunks {
            window: format!(
                "({} .. {until}]",
                token.last_pruned_fee_id.as_deref().unwrap_or("epoch")
            ),
        })?;

        let balances = BalanceLedger::new(host);
        let mut genesis = balances.get_or_create(&token.genesis_account)?;
        balances.apply(
            &mut genesis,
            &fold.sum,
            LogType::PruneFee,
            None,
            None,
            Some(format!("{} .. {}", fold.start_key, fold.end_key)),
        )?;

        token.last_pruned_fee_id = fold
            .end_key
            .strip_prefix(&prefix)
            .map(str::to_owned)
            .or(Some(fold.end_key.clone()));
        token.updated = now;
        self.gw.put(&keys::token(&token.code), token)?;
        info!(token = %token.code, sum = %fold.sum, scanned = fold.scanned, "fees pruned");
        Ok(fold)
    }

    /// Fee records of a token in a second-granularity window, oldest first.
    pub fn list(
        &self,
        code: &str,
        start_secs: Option<i64>,
        end_secs: Option<i64>,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, LedgerError> {
        let prefix = keys::fee_prefix(code);
        let start = match start_secs {
            Some(secs) => format!("{prefix}{:010}{:09}", secs, 0),
            None => prefix.clone(),
        };
        let end = match end_secs {
            Some(secs) => format!("{prefix}{:010}{:09}", secs + 1, 0),
            None => keys::range_end(&prefix),
        };
        Ok(self.gw.range(&start, &end, page_size, bookmark)?)
    }

    fn write_record(
        &self,
        code: &str,
        payer: &Address,
        amount: Amount,
    ) -> Result<FeeRecord, LedgerError> {
        let now = self.gw.host().tx_time();
        // A transaction writes at most a handful of fees; probe for the
        // first free sequence slot.
        for seq in 0..u32::MAX {
            let key = keys::fee(code, &now, seq);
            if self.gw.exists(&key)? {
                continue;
            }
            let record = FeeRecord {
                id: keys::fee_id(&now, seq),
                token: code.to_owned(),
                payer: payer.clone(),
                amount,
                created: now,
            };
            self.gw.insert(&key, &record)?;
            return Ok(record);
        }
        Err(LedgerError::Internal("fee sequence exhausted".into()))
    }
}
