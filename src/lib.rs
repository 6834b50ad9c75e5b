//! A bucketed concurrent hash map for read-heavy multi-core workloads.
//!
//! Two modes are offered as distinct types sharing one bucket implementation:
//!
//! - [`AppendOnlyMap`] — entries are inserted and updated but never removed;
//!   lookups never take a lock.
//! - [`RemovableMap`] — additionally supports [`RemovableMap::remove`], with
//!   removed nodes reclaimed later through a logical-clock based deferred
//!   reclamation scheme so concurrent lookups never observe freed memory.
//!
//! ```
//! use conhashmap::RemovableMap;
//!
//! let m: RemovableMap<i32, &str> = RemovableMap::new(16);
//! m.set(1, "one");
//! assert_eq!(m.get(&1), Some("one"));
//! m.remove(&1).unwrap();
//! assert_eq!(m.get(&1), None);
//! ```
//!
//! See the crate's design notes for the correctness argument behind
//! lock-free reads under concurrent removal.

pub mod bucket;
pub mod clock;
pub mod error;
pub mod garbage;
pub mod map;
pub mod node;
pub mod spin;

pub use error::MapError;
pub use map::{AppendOnly, AppendOnlyMap, ConHashMap, Mode, Removable, RemovableMap};
