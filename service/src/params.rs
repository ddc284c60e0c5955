//! Positional parameter parsing shared by the handlers.

use tessera_ledger::{Account, AccountLedger, LedgerError, Token, TokenRegistry};
use tessera_store::Host;
use tessera_types::{address, Address, Amount, Kid};

/// Longest accepted memo.
pub const MAX_MEMO_LEN: usize = 128;

/// Default and ceiling for list page sizes.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// A required positional parameter.
pub fn required<'a>(params: &[&'a str], index: usize, name: &str) -> Result<&'a str, LedgerError> {
    params
        .get(index)
        .copied()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| LedgerError::Other(format!("missing parameter: {name}")))
}

/// An optional positional parameter; empty strings count as absent.
pub fn optional<'a>(params: &[&'a str], index: usize) -> Option<&'a str> {
    params.get(index).copied().filter(|p| !p.is_empty())
}

pub fn amount(text: &str) -> Result<Amount, LedgerError> {
    Amount::parse(text).map_err(|_| LedgerError::InvalidAmount(text.to_owned()))
}

pub fn positive_amount(text: &str) -> Result<Amount, LedgerError> {
    let value = amount(text)?;
    if !value.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "must be positive: {text}"
        )));
    }
    Ok(value)
}

pub fn non_negative_amount(text: &str) -> Result<Amount, LedgerError> {
    let value = amount(text)?;
    if value.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "must not be negative: {text}"
        )));
    }
    Ok(value)
}

pub fn boolean(text: &str) -> bool {
    matches!(text, "true" | "1")
}

pub fn integer(text: &str) -> Result<i64, LedgerError> {
    text.parse()
        .map_err(|_| LedgerError::InvalidAmount(text.to_owned()))
}

pub fn memo(text: Option<&str>) -> Result<Option<&str>, LedgerError> {
    match text {
        Some(m) if m.len() > MAX_MEMO_LEN => {
            Err(LedgerError::Other("memo is longer than 128 bytes".into()))
        }
        other => Ok(other),
    }
}

pub fn page_size(text: Option<&str>) -> Result<u32, LedgerError> {
    match text {
        Some(t) => {
            let size: u32 = t
                .parse()
                .map_err(|_| LedgerError::InvalidAmount(t.to_owned()))?;
            Ok(size.clamp(1, MAX_PAGE_SIZE))
        }
        None => Ok(DEFAULT_PAGE_SIZE),
    }
}

/// Whether a parameter is a token code (as opposed to a full address).
pub fn is_token_code(text: &str) -> bool {
    text.len() <= 6 && address::validate_code(&text.to_ascii_uppercase()).is_ok()
}

/// Resolve `<token|address>` to the concrete account: a bare token code
/// means the caller's personal account for that token.
pub fn resolve_account<H: Host>(
    host: &H,
    kid: &Kid,
    param: &str,
) -> Result<(Token, Account), LedgerError> {
    let registry = TokenRegistry::new(host);
    let accounts = AccountLedger::new(host);
    if is_token_code(param) {
        let code = param.to_ascii_uppercase();
        let token = registry.get(&code)?;
        let address = Address::personal(&code, kid.as_str())?;
        let account = accounts.get(&address)?;
        Ok((token, account))
    } else {
        let address = Address::parse(param)?;
        let account = accounts.get(&address)?;
        let token = registry.get(account.token())?;
        Ok((token, account))
    }
}

/// Resolve the sender parameter of pay/transfer: empty means the caller's
/// personal account for the receiver's token.
pub fn resolve_sender<H: Host>(
    host: &H,
    kid: &Kid,
    sender_param: &str,
    receiver: &Address,
) -> Result<Account, LedgerError> {
    let accounts = AccountLedger::new(host);
    let address = if sender_param.is_empty() {
        Address::personal(receiver.code(), kid.as_str())?
    } else {
        Address::parse(sender_param)?
    };
    accounts.get(&address)
}
