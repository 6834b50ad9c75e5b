//! Busy-wait mutual-exclusion primitives.
//!
//! [`SpinLock`] and [`SpinRWLock`] behave like their `std::sync` counterparts
//! but never park the calling thread: acquisition loops and re-tries a CAS
//! until it succeeds, occasionally hinting the CPU with
//! [`core::hint::spin_loop`]. Neither type is fair, and a guard must never be
//! held across anything that itself blocks.

use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI64, Ordering};

/// A one-word spin mutex guarding `T`.
pub struct SpinLock<T: ?Sized> {
    locked: AtomicI64,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new, unlocked spin mutex holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicI64::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Spins until the lock is acquired, then returns a guard.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }
}

/// RAII guard returned by [`SpinLock::lock`]. Unlocks on drop.
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(0, Ordering::Release);
    }
}

/// A single-writer/multi-reader spin lock guarding `T`.
///
/// State encoding: `0` idle, `n > 0` means `n` concurrent readers, `-1` means
/// one exclusive writer. Writers can starve under sustained read pressure;
/// that is acceptable for this crate's one use of `SpinRWLock` (the clock
/// registry), which is write-heavy only at thread start/stop.
pub struct SpinRWLock<T: ?Sized> {
    state: AtomicI64,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinRWLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SpinRWLock<T> {}

impl<T> SpinRWLock<T> {
    /// Creates a new, idle reader-writer spin lock holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicI64::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Spins until a shared (read) acquisition succeeds.
    pub fn read(&self) -> SpinRWLockReadGuard<'_, T> {
        loop {
            let cur = self.state.load(Ordering::Relaxed);
            if cur >= 0
                && self
                    .state
                    .compare_exchange_weak(cur, cur + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return SpinRWLockReadGuard { lock: self };
            }
            hint::spin_loop();
        }
    }

    /// Spins until the exclusive (write) acquisition succeeds.
    pub fn write(&self) -> SpinRWLockWriteGuard<'_, T> {
        while self
            .state
            .compare_exchange_weak(0, -1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        SpinRWLockWriteGuard { lock: self }
    }
}

/// RAII guard returned by [`SpinRWLock::read`]. Releases on drop.
pub struct SpinRWLockReadGuard<'a, T: ?Sized> {
    lock: &'a SpinRWLock<T>,
}

impl<T: ?Sized> Deref for SpinRWLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinRWLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::Release);
    }
}

/// RAII guard returned by [`SpinRWLock::write`]. Releases on drop.
pub struct SpinRWLockWriteGuard<'a, T: ?Sized> {
    lock: &'a SpinRWLock<T>,
}

impl<T: ?Sized> Deref for SpinRWLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinRWLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinRWLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(0, Ordering::Release);
    }
}
