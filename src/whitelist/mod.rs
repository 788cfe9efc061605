/// Whitelist link reconciliation
pub mod service;

pub use service::{WhitelistOptions, WhitelistService};
