//! Local caching module for offline data access.
//!
//! `LocalCache` keeps the record collection, the current electricity price,
//! and the first-run flag under three fixed keys of a `KeyValueStore`.
//! `DirStore` persists each key as a file; `MemoryStore` keeps them in
//! process memory.

pub mod local;
pub mod store;

pub use local::{LocalCache, StorageSnapshot, INITIALIZED_KEY, PRICE_KEY, RECORDS_KEY};
pub use store::{DirStore, KeyValueStore, MemoryStore, StorageError};
