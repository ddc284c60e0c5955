//! Caller authentication against the identity service.

use tessera_ledger::LedgerError;
use tessera_store::Host;
use tessera_types::Kid;
use tracing::warn;

use crate::config;

/// Resolve the caller's identity id.
///
/// Secure mode demands a fresh signature from the identity service and is
/// mandatory for every value-mutating operation; non-secure mode serves
/// read-only queries.
pub fn authenticate<H: Host>(host: &H, secure: bool) -> Result<Kid, LedgerError> {
    let service = config::identity_service();
    let args: &[&str] = if secure { &["kid", "true"] } else { &["kid"] };
    let bytes = host.invoke(&service, args).map_err(|e| {
        warn!(error = %e, "identity lookup failed");
        LedgerError::InvalidAccess
    })?;
    let text = String::from_utf8(bytes).map_err(|_| LedgerError::InvalidAccess)?;
    // The identity service may answer a bare id or a JSON string.
    let trimmed = text.trim().trim_matches('"');
    Kid::new(trimmed).map_err(|_| LedgerError::InvalidAccess)
}
