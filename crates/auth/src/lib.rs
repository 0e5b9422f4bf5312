//! API key authentication.
//!
//! - [`ApiKeyRecord`]: minted `sk_` keys, stored as SHA-256 digests
//! - [`ApiKeyStore`]: persistence contract, with an in-memory implementation
//! - [`ApiKeyGate`]: resolves a presented key into a [`Caller`]

pub mod api_key;
pub mod error;
pub mod gate;
pub mod store;

pub use {
    api_key::{ApiKeyRecord, ApiKeyView, generate_api_key, hash_api_key, mask_api_key},
    error::{Error, Result},
    gate::{ApiKeyGate, Caller, CallerSummary, KeyCheck, SYSTEM_USER_ID},
    store::{ApiKeyStore, InMemoryApiKeyStore},
};
