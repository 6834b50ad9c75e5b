//! One bucket's chain: the lock-free reader traversal and the
//! lock-held writer mutations that build on it.
//!
//! Every operation here is mode-agnostic; [`crate::map`] supplies the
//! mode-specific decisions (whether to check `delete_tick`, whether
//! `remove` exists at all).

use std::sync::atomic::Ordering;

use crate::clock;
use crate::node::{self, Node};
use crate::spin::SpinLock;

/// A single hash bucket: an atomic chain head plus the spin lock writers
/// take to mutate it. Readers never take `lock`.
pub struct Bucket<K, V> {
    head: std::sync::atomic::AtomicPtr<Node<K, V>>,
    lock: SpinLock<()>,
}

impl<K, V> Bucket<K, V> {
    pub fn new() -> Self {
        Self {
            head: std::sync::atomic::AtomicPtr::new(node::null()),
            lock: SpinLock::new(()),
        }
    }

    /// Lock-free chain walk used by readers.
    ///
    /// `skip_deleted` selects removable-mode semantics: when true, any node
    /// with a non-zero `delete_tick` aborts and restarts the walk from a
    /// freshly loaded head (see `SPEC_FULL.md` §4.4). Returns a clone of the
    /// matching value, if any.
    pub fn get(&self, key: &K, skip_deleted: bool) -> Option<V>
    where
        K: Eq,
        V: Clone,
    {
        'restart: loop {
            let mut cur = self.head.load(Ordering::Acquire);
            while !cur.is_null() {
                let node = unsafe { &*cur };
                if skip_deleted && node::is_deleted(node.delete_tick.load(Ordering::Acquire)) {
                    log::debug!("reader restarting walk after encountering a deleted node");
                    continue 'restart;
                }
                if node.key == *key {
                    return Some(unsafe { Node::load_value(cur) });
                }
                cur = node.next.load(Ordering::Acquire);
            }
            return None;
        }
    }

    /// Writer-side chain walk: finds the live node matching `key`, if any.
    /// Must be called with `self.lock` held.
    fn find(&self, key: &K) -> *mut Node<K, V>
    where
        K: Eq,
    {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            let node = unsafe { &*cur };
            if node.key == *key {
                return cur;
            }
            cur = node.next.load(Ordering::Acquire);
        }
        node::null()
    }

    /// Writer-side chain walk that also yields the matching node's
    /// predecessor (`None` if the match is the chain head).
    fn find_with_predecessor(&self, key: &K) -> (*mut Node<K, V>, Option<*mut Node<K, V>>)
    where
        K: Eq,
    {
        let mut prev: Option<*mut Node<K, V>> = None;
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            let node = unsafe { &*cur };
            if node.key == *key {
                return (cur, prev);
            }
            prev = Some(cur);
            cur = node.next.load(Ordering::Acquire);
        }
        (node::null(), None)
    }

    /// Replaces the value of an existing key, or prepends a new node.
    /// Returns the retired value pointer when a value was replaced (the
    /// caller is responsible for handing it to the deletion queue) and
    /// `None` when a brand-new node was created instead.
    pub fn set(&self, key: K, value: V) -> Option<*mut V>
    where
        K: Eq,
    {
        let _guard = self.lock.lock();
        let existing = self.find(&key);
        if !existing.is_null() {
            return Some(Node::swap_value(existing, value));
        }
        let head = self.head.load(Ordering::Relaxed);
        let new_node = Node::new_boxed(key, value, head);
        self.head.store(new_node, Ordering::Release);
        None
    }

    /// `set_if_absent`: returns a clone of the pre-existing value on a hit
    /// (the supplied `value` is dropped by the caller without ever being
    /// published), or `None` after publishing `value` as a new node.
    pub fn set_if_absent(&self, key: K, value: V) -> Option<V>
    where
        K: Eq,
        V: Clone,
    {
        let _guard = self.lock.lock();
        let existing = self.find(&key);
        if !existing.is_null() {
            return Some(unsafe { Node::load_value(existing) });
        }
        let head = self.head.load(Ordering::Relaxed);
        let new_node = Node::new_boxed(key, value, head);
        self.head.store(new_node, Ordering::Release);
        None
    }

    /// Removable-mode removal: unlinks the live node for `key`, if any, then
    /// advances the global clock and stamps the result into `delete_tick`.
    /// Returns the unlinked node pointer and its stamped tick (for the
    /// caller to enqueue into the deletion queue) or `None` if absent.
    ///
    /// The clock is advanced only *after* the unlink store, per
    /// `SPEC_FULL.md` §4.4 steps 3-4: a reader that refreshes to the
    /// returned tick must already be unable to observe the node as live.
    /// Advancing first would let such a reader see `delete_tick == 0` on a
    /// node GC could reap the moment `min()` reaches that tick.
    pub fn remove(&self, key: &K) -> Option<(*mut Node<K, V>, u64)>
    where
        K: Eq,
    {
        let _guard = self.lock.lock();
        let (found, pred) = self.find_with_predecessor(key);
        if found.is_null() {
            return None;
        }
        let next = unsafe { (*found).next.load(Ordering::Relaxed) };
        match pred {
            Some(p) => unsafe { (*p).next.store(next, Ordering::Release) },
            None => self.head.store(next, Ordering::Release),
        }
        let tick = clock::global().advance();
        unsafe { (*found).delete_tick.store(tick, Ordering::Release) };
        Some((found, tick))
    }

    /// Frees every node still linked into this bucket, unconditionally.
    /// Only safe to call when no traversal can possibly be in flight (a
    /// map's `Drop`).
    pub fn drop_all(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            unsafe { Node::reclaim(cur) };
            cur = next;
        }
        *self.head.get_mut() = node::null();
    }
}

impl<K, V> Default for Bucket<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
