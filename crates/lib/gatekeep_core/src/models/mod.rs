//! Domain models shared across the core components.

pub mod auth;
