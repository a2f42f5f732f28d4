//! Storage Module
//!
//! The key-value store, its expiry rules and its snapshot format.
//!
//! - `engine`: [`Store`], the data and expiry maps and every operation on them
//! - `expiry`: `SET` modifier parsing and millisecond time helpers
//! - `snapshot`: [`Snapshot`] and its blob encoding for persistence
//!
//! ## Example
//!
//! ```
//! use litekv::storage::{snapshot, Store, StoredValue};
//! use bytes::Bytes;
//!
//! let mut store = Store::new();
//! store
//!     .set_with_options(
//!         Bytes::from("session"),
//!         StoredValue::Bytes(Bytes::from("token123")),
//!         &[Bytes::from("EX"), Bytes::from("3600")],
//!     )
//!     .unwrap();
//!
//! let blob = snapshot::export(&store.snapshot());
//! let mut restored = Store::new();
//! restored.restore(snapshot::import(&blob).unwrap());
//! assert!(restored.exists(b"session"));
//! ```

pub mod engine;
pub mod expiry;
pub mod snapshot;

pub use engine::{StorageStats, Store, StoreError, StoredValue};
pub use expiry::SetExpiry;
pub use snapshot::{Snapshot, SnapshotError};
