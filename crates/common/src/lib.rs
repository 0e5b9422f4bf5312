//! Shared error context helpers and small utilities used across all hookgate crates.

pub mod error;
pub mod time;

pub use error::FromMessage;
