//! Persistent response cache (SQLite via sqlx).
//!
//! Stores admitted responses with their vary constraints and expiry
//! timestamps, and answers repeat requests through [`CacheDispatcher`].

pub mod admission;
mod db;
mod dispatcher;
mod entries;
mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use admission::{admit, parse_cache_control, Refusal};
pub use db::{CacheStore, DEFAULT_PRUNE_INTERVAL};
pub use dispatcher::CacheDispatcher;
pub use error::StoreError;
pub use types::{CacheEntry, CacheKey, CacheValue, EntryId, VaryValue};
