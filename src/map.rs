//! The public facade: `ConHashMap` and its two mode-specific aliases.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::marker::PhantomData;

use crate::bucket::Bucket;
use crate::clock;
use crate::error::MapError;
use crate::garbage::DeletionQueue;
use crate::node::{Node, SendPtr};

mod sealed {
    pub trait Sealed {}
}

/// Compile-time selector between the two supported reclamation disciplines.
/// Sealed so no downstream crate can introduce a third mode.
pub trait Mode: sealed::Sealed {}

/// Marker for a map whose entries are never removed.
pub struct AppendOnly;

/// Marker for a map that additionally supports `remove`.
pub struct Removable;

impl sealed::Sealed for AppendOnly {}
impl sealed::Sealed for Removable {}
impl Mode for AppendOnly {}
impl Mode for Removable {}

/// A map that supports insertion, lookup, and update, but never removal.
/// Lookups never take a lock.
pub type AppendOnlyMap<K, V, S = RandomState> = ConHashMap<K, V, AppendOnly, S>;

/// A map that additionally supports `remove`, with removed nodes reclaimed
/// once every registered thread has acknowledged a tick past the removal.
pub type RemovableMap<K, V, S = RandomState> = ConHashMap<K, V, Removable, S>;

/// A bucketed concurrent hash map, generic over the reclamation mode `M` and
/// the hash-builder `S`. Constructed through the [`AppendOnlyMap`] or
/// [`RemovableMap`] aliases.
pub struct ConHashMap<K, V, M, S = RandomState> {
    buckets: Vec<Bucket<K, V>>,
    hash_builder: S,
    garbage: DeletionQueue,
    _mode: PhantomData<M>,
}

impl<K, V, M: Mode> ConHashMap<K, V, M, RandomState> {
    /// Builds a map with `bucket_count` fixed buckets and the default hasher.
    ///
    /// # Panics
    /// Panics if `bucket_count == 0`.
    pub fn new(bucket_count: usize) -> Self {
        Self::with_hasher(bucket_count, RandomState::new())
    }
}

impl<K, V, M: Mode, S: BuildHasher> ConHashMap<K, V, M, S> {
    /// Builds a map with `bucket_count` fixed buckets and a custom hasher.
    ///
    /// # Panics
    /// Panics if `bucket_count == 0`.
    pub fn with_hasher(bucket_count: usize, hash_builder: S) -> Self {
        assert!(bucket_count >= 1, "bucket_count must be at least 1");
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Bucket::new);
        Self {
            buckets,
            hash_builder,
            garbage: DeletionQueue::new(),
            _mode: PhantomData,
        }
    }

    fn bucket_index(&self, key: &K) -> usize
    where
        K: Hash,
    {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.buckets.len()
    }

    fn bucket(&self, key: &K) -> &Bucket<K, V>
    where
        K: Hash,
    {
        &self.buckets[self.bucket_index(key)]
    }

    /// Looks up `key`, restarting its lock-free chain walk if it encounters a
    /// node concurrently unlinked by another thread.
    ///
    /// Refreshes this OS thread's acknowledgement of the global tick first,
    /// registering it with the clock on first call from this thread.
    pub fn get(&self, key: &K) -> Option<V>
    where
        K: Hash + Eq,
        V: Clone,
    {
        clock::with(|c| c.refresh());
        self.bucket(key).get(key, true)
    }

    /// Inserts `value` for `key`, or replaces the existing value if present.
    /// A replaced value's old allocation is retired through the map's
    /// deletion queue, not freed immediately.
    pub fn set(&self, key: K, value: V)
    where
        K: Hash + Eq,
    {
        let bucket = self.bucket(&key);
        if let Some(old_value) = bucket.set(key, value) {
            self.retire_value(old_value);
        }
        self.garbage.collect();
    }

    /// Inserts `value` for `key` only if absent; returns a clone of the
    /// existing value (and drops `value` without ever publishing it)
    /// otherwise.
    pub fn set_if_absent(&self, key: K, value: V) -> Option<V>
    where
        K: Hash + Eq,
        V: Clone,
    {
        let bucket = self.bucket(&key);
        let previous = bucket.set_if_absent(key, value);
        self.garbage.collect();
        previous
    }

    fn retire_value(&self, value_ptr: *mut V) {
        let tick = clock::global().advance();
        let value_ptr = SendPtr(value_ptr);
        self.garbage
            .enqueue(tick, move || unsafe { Node::reclaim_value(value_ptr.0) });
    }
}

impl<K, V, S: BuildHasher> ConHashMap<K, V, Removable, S> {
    /// Removes the live node for `key`, stamping it deleted and handing it
    /// to the deletion queue. Fails if no live node exists for `key`.
    ///
    /// The bucket unlinks the node before advancing the global clock and
    /// stamping the result (`SPEC_FULL.md` §4.4 steps 3-4), so a
    /// `KeyNotFound` result never burns a tick, and no reader can observe
    /// the node as live at or after the tick `garbage_collect` reaps it by.
    pub fn remove(&self, key: &K) -> Result<(), MapError>
    where
        K: Hash + Eq,
    {
        let bucket = self.bucket(key);
        match bucket.remove(key) {
            Some((node, tick)) => {
                let node = SendPtr(node);
                self.garbage
                    .enqueue(tick, move || unsafe { Node::reclaim(node.0) });
                Ok(())
            }
            None => Err(MapError::KeyNotFound),
        }
    }

    /// Reclaims every retired node and value box whose tick has been
    /// acknowledged by every currently registered thread. Returns the number
    /// of entries reclaimed.
    pub fn garbage_collect(&self) -> usize {
        self.garbage.collect()
    }
}

impl<K, V, M, S> Drop for ConHashMap<K, V, M, S> {
    fn drop(&mut self) {
        self.garbage.drain_unconditionally();
        for bucket in self.buckets.iter_mut() {
            bucket.drop_all();
        }
    }
}
