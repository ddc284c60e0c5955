//! Typed JSON access over the host's byte-keyed state.
//!
//! Every persisted value is a JSON document whose leading `@<doctype>` field
//! doubles as the rich-query discriminator; the structs in the ledger crate
//! carry that field themselves via serde renames.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::host::{Host, KvPage, SortSpec};
use crate::StoreError;

/// Borrowing wrapper that adds typed get/put on top of a [`Host`].
pub struct StateGateway<'a, H: Host> {
    host: &'a H,
}

impl<'a, H: Host> StateGateway<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &'a H {
        self.host
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.host.get_state(key)
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.host.get_state(key)?.is_some())
    }

    /// Fetch and decode a document, `None` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.host.get_state(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a document that must exist.
    pub fn get_existing<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        self.get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    pub fn put<T: Serialize>(&self, key: &str, doc: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc)?;
        self.host.put_state(key, &bytes)
    }

    /// Write a document only if the key is vacant; the write-once families
    /// (pay chunks, unwrap receipts, fees, logs) all go through here.
    pub fn insert<T: Serialize>(&self, key: &str, doc: &T) -> Result<(), StoreError> {
        if self.exists(key)? {
            return Err(StoreError::AlreadyExists(key.to_owned()));
        }
        self.put(key, doc)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.host.delete_state(key)
    }

    pub fn range(
        &self,
        start: &str,
        end: &str,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError> {
        self.host.get_state_range(start, end, page_size, bookmark)
    }

    pub fn query(
        &self,
        selector: &serde_json::Value,
        sort: &[SortSpec],
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<KvPage, StoreError> {
        self.host.query(selector, sort, page_size, bookmark)
    }

    /// Decode one raw value from a page.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
