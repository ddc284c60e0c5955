//! Peer service naming.
//!
//! `DEV_CHANNEL_NAME` switches the identity and coordination services to
//! their channel-suffixed development deployments.

use std::env;

const IDENTITY_BASE: &str = "ident";
const COORDINATOR_BASE: &str = "contract";

fn dev_suffix() -> String {
    match env::var("DEV_CHANNEL_NAME") {
        Ok(channel) if !channel.is_empty() => format!("-{channel}"),
        _ => String::new(),
    }
}

/// Name of the identity service answering `kid` lookups.
pub fn identity_service() -> String {
    format!("{IDENTITY_BASE}{}", dev_suffix())
}

/// Name of the contract-coordination service.
pub fn coordinator_service() -> String {
    format!("{COORDINATOR_BASE}{}", dev_suffix())
}
