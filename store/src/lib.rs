//! Content-addressable local storage for brook.
//!
//! Keys map to disk locations through a deterministic hash-sharded path,
//! so every node agrees on where a given key's bytes live relative to its
//! store root.

pub mod error;
pub mod path;
pub mod store;

pub use error::StoreError;
pub use path::{path_for, PathKey};
pub use store::ContentStore;
