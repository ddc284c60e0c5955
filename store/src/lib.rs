//! Host-runtime state gateway for the tessera token service.
//!
//! The host runtime owns the byte-keyed transactional store, transaction
//! identity/time, and cross-service invocation. This crate defines the
//! [`Host`] trait the rest of the workspace depends on, the persisted key
//! layout, a typed JSON gateway over raw state, and an in-memory host used
//! by tests.

pub mod error;
pub mod gateway;
pub mod host;
pub mod keys;
pub mod memory;

pub use error::StoreError;
pub use gateway::StateGateway;
pub use host::{Host, KvPage, KvPair, SortSpec};
pub use memory::MemHost;
