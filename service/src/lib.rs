//! The operation surface of the tessera token service.
//!
//! A single routing table maps operation names onto handlers. Every handler
//! authenticates against the identity service (secure mode for anything
//! that moves value), parses its positional parameters, drives the ledger
//! engines, and answers JSON. Responsible errors reach the caller verbatim;
//! anything else is logged and replaced with a generic per-operation
//! message.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod params;
pub mod router;

pub use router::{invoke, OPERATIONS};
