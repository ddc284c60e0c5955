//! The shared prune fold.
//!
//! Pay-prune and fee-prune are the same operation over different record
//! families: scan a time-bounded key window in order, sum a bounded batch of
//! record amounts, and report the processed range plus the resume point.
//! The caller applies the sum, advances its cursor to `end_key`, and logs.
//! Replaying the same window yields the same sum; resuming from `next_key`
//! completes the fold without double counting because cursors only move
//! forward per record key.

use tessera_store::{Host, StateGateway};
use tessera_types::Amount;

use crate::error::LedgerError;

/// Most records a single prune scan folds.
pub const PRUNE_BATCH: usize = 500;

/// Slack subtracted from the transaction time when the safe flag clamps a
/// prune window, covering clock skew across submitters.
pub const SAFE_PRUNE_MARGIN_SECS: i64 = 600;

/// Outcome of one fold over a key window.
#[derive(Clone, Debug)]
pub struct PruneFold {
    pub sum: Amount,
    /// First processed record key.
    pub start_key: String,
    /// Last processed record key; the caller's new cursor.
    pub end_key: String,
    /// First unprocessed key, set only when the batch limit cut the scan.
    pub next_key: Option<String>,
    pub scanned: usize,
}

/// Fold record amounts over `[start, end_exclusive)`, at most
/// [`PRUNE_BATCH`] records, draining pagination bookmarks as needed.
///
/// Returns `None` when the window holds no records. `amount_of` decodes one
/// record's signed contribution; ties in `created` time cannot occur under
/// the key scheme, and key order breaks them if they ever did.
pub fn fold_window<H: Host>(
    gw: &StateGateway<'_, H>,
    start: &str,
    end_exclusive: &str,
    amount_of: impl Fn(&str, &[u8]) -> Result<Amount, LedgerError>,
) -> Result<Option<PruneFold>, LedgerError> {
    let mut sum = Amount::zero();
    let mut start_key: Option<String> = None;
    let mut end_key: Option<String> = None;
    let mut scanned = 0usize;
    let mut next_key: Option<String> = None;
    let mut bookmark: Option<String> = None;

    'scan: loop {
        // One past the batch, so the resume point is a real record key even
        // when the host's bookmark is opaque.
        let want = (PRUNE_BATCH - scanned + 1) as u32;
        let page = gw.range(start, end_exclusive, want, bookmark.as_deref())?;
        if page.entries.is_empty() {
            break;
        }
        for entry in &page.entries {
            if scanned == PRUNE_BATCH {
                next_key = Some(entry.key.clone());
                break 'scan;
            }
            sum = sum.add(&amount_of(&entry.key, &entry.value)?);
            if start_key.is_none() {
                start_key = Some(entry.key.clone());
            }
            end_key = Some(entry.key.clone());
            scanned += 1;
        }
        match page.bookmark {
            Some(bm) => bookmark = Some(bm),
            None => break,
        }
    }

    match (start_key, end_key) {
        (Some(start_key), Some(end_key)) => Ok(Some(PruneFold {
            sum,
            start_key,
            end_key,
            next_key,
            scanned,
        })),
        _ => Ok(None),
    }
}
