//! The host-runtime interface.
//!
//! Execution is single-threaded and deterministic per transaction: every
//! operation runs against a transactional snapshot and commits atomically.
//! Only host calls block; the service keeps no mutable process-wide state
//! for correctness.

use serde::{Deserialize, Serialize};
use tessera_types::TxTime;

use crate::StoreError;

/// One `{key, value}` pair returned from a range scan or rich query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// A page of results plus the bookmark to resume from.
///
/// A `Some` bookmark means the window was not drained; callers that need an
/// entire window must loop until the bookmark comes back `None`.
#[derive(Clone, Debug, Default)]
pub struct KvPage {
    pub entries: Vec<KvPair>,
    pub bookmark: Option<String>,
}

/// Sort direction for one field of a rich query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            descending: true,
        }
    }
}

/// The transaction runtime hosting the service.
///
/// Implementations wrap whatever the deployment platform provides; tests use
/// [`crate::MemHost`]. All mutations are buffered by the host and committed
/// atomically when the operation returns without error.
pub trait Host {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn delete_state(&self, key: &str) -> Result<(), StoreError>;

    /// Lexicographic scan over `[start, end)`. `page_size == 0` uses the
    /// host default. `bookmark` resumes a previous scan.
    fn get_state_range(
        &self,
        start: &str,
        end: &str,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError>;

    /// Rich query over the JSON document values. Used only where the key
    /// layout cannot express the listing.
    fn query(
        &self,
        selector: &serde_json::Value,
        sort: &[SortSpec],
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError>;

    /// The id of the executing transaction (address entropy for joint
    /// accounts and pending-balance ids).
    fn tx_id(&self) -> String;

    /// The deterministic timestamp of the executing transaction.
    fn tx_time(&self) -> TxTime;

    /// Invoke another service on the channel (identity lookups, contract
    /// coordination) and return its raw payload.
    fn invoke(&self, service: &str, args: &[&str]) -> Result<Vec<u8>, StoreError>;

    /// The peer service that invoked this transaction cross-service, if any.
    /// Callback-only operations gate on this.
    fn caller_service(&self) -> Option<String>;
}
