//! Chain nodes and the value-indirection discipline that makes value
//! replacement torn-free under concurrent, lock-free reads.
//!
//! A node's value is never overwritten in place. Instead `v` is an
//! `AtomicPtr` to a heap-boxed value cell; replacing a value means boxing the
//! new one, swapping the pointer with a release-store, and retiring the
//! previous box through the map's [`crate::garbage::DeletionQueue`]. This
//! applies in both append-only and removable mode (see `SPEC_FULL.md` §4.3).

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// One entry in a bucket's chain.
///
/// `delete_tick` is present regardless of mode so both
/// [`crate::map::AppendOnlyMap`] and [`crate::map::RemovableMap`] share one
/// traversal implementation; append-only mode never stamps or inspects it
/// (see `SPEC_FULL.md` §9).
pub struct Node<K, V> {
    pub key: K,
    pub value: AtomicPtr<V>,
    pub next: AtomicPtr<Node<K, V>>,
    pub delete_tick: AtomicU64,
}

impl<K, V> Node<K, V> {
    /// Allocates a new, live node with `value` boxed behind the indirection
    /// pointer and `next` as given. Returns an owning raw pointer.
    pub fn new_boxed(key: K, value: V, next: *mut Node<K, V>) -> *mut Node<K, V> {
        let value_ptr = Box::into_raw(Box::new(value));
        Box::into_raw(Box::new(Node {
            key,
            value: AtomicPtr::new(value_ptr),
            next: AtomicPtr::new(next),
            delete_tick: AtomicU64::new(0),
        }))
    }

    /// Clones the currently published value.
    ///
    /// # Safety
    /// `node` must point to a node that is still reachable or otherwise
    /// protected by the caller's refreshed thread clock (see
    /// `SPEC_FULL.md` §4.4's correctness sketch).
    pub unsafe fn load_value(node: *const Node<K, V>) -> V
    where
        V: Clone,
    {
        let ptr = (*node).value.load(Ordering::Acquire);
        (*ptr).clone()
    }

    /// Publishes a freshly boxed value, returning the previous raw pointer
    /// so the caller can retire it via the deletion queue.
    pub fn swap_value(node: *const Node<K, V>, value: V) -> *mut V {
        let new_ptr = Box::into_raw(Box::new(value));
        unsafe { (*node).value.swap(new_ptr, Ordering::AcqRel) }
    }

    /// Frees a node and its currently-published value box. Used by the
    /// deletion queue's reclaim closures and by a map's `Drop` impl.
    ///
    /// # Safety
    /// `node` must not be reachable from any bucket chain and must not be
    /// concurrently accessed.
    pub unsafe fn reclaim(node: *mut Node<K, V>) {
        let value_ptr = (*node).value.load(Ordering::Relaxed);
        drop(Box::from_raw(value_ptr));
        drop(Box::from_raw(node));
    }

    /// Frees a previously-swapped-out value box.
    ///
    /// # Safety
    /// `value_ptr` must not be reachable from any node and must not be
    /// concurrently accessed.
    pub unsafe fn reclaim_value(value_ptr: *mut V) {
        drop(Box::from_raw(value_ptr));
    }
}

/// Sentinel meaning "this node has not been logically deleted".
pub const LIVE: u64 = 0;

/// Returns `true` if `tick` marks a node as logically deleted.
#[inline]
pub fn is_deleted(tick: u64) -> bool {
    tick != LIVE
}

/// A null chain pointer, for readability at call sites.
#[inline]
pub fn null<K, V>() -> *mut Node<K, V> {
    ptr::null_mut()
}

/// A raw pointer wrapped so it can be moved into the `Send` reclamation
/// closures the deletion queue stores.
///
/// # Safety
/// The caller must ensure the pointee is not concurrently accessed by
/// anything other than the eventual reclaim closure.
pub(crate) struct SendPtr<T>(pub *mut T);

unsafe impl<T> Send for SendPtr<T> {}
