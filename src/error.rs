//! The crate's one public error type.

use thiserror::Error;

/// Failure modes surfaced by [`crate::map::ConHashMap`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// Returned by `remove` when no live node exists for the given key.
    #[error("key not found")]
    KeyNotFound,
}
