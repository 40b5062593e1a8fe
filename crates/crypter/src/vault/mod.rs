//! Vault transit engine access for the transit provider.

pub mod client;

pub use client::{TransitClient, VaultClient};
