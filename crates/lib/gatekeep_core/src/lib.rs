//! # gatekeep_core
//!
//! Session and credential lifecycle: user records, token issuance and
//! revocation, email verification.

pub mod auth;
pub mod cache;
pub mod ids;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod session;
pub mod settings;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
