//! The process-wide logical clock and per-thread acknowledgement slots that
//! back deferred reclamation.
//!
//! There is exactly one [`GlobalClock`] per process, shared by every map
//! instance. Each OS thread that touches a map lazily gets one
//! [`ThreadClock`], registered on first use and unregistered when the thread
//! exits. A thread "acknowledges" a retirement tick `T` by calling
//! [`ThreadClock::refresh`] after `T` was stamped; [`GlobalClock::min`] is a
//! lower bound over every acknowledgement currently outstanding, and nothing
//! stamped at or after that bound may be reclaimed yet.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::spin::SpinRWLock;

/// The single cell a [`ThreadClock`] exposes to the registry.
///
/// Kept as a standalone type (rather than inlining an `AtomicU64` in the
/// registry's `Vec`) so the registry can hold a stable address across the
/// `ThreadClock`'s lifetime without needing the `ThreadClock` itself to be
/// `'static`-borrowable from other threads.
struct ThreadClockCell(AtomicU64);

/// Process-wide monotonic tick counter plus a registry of live thread clocks.
///
/// One instance of this type (see [`global`]) is shared by every
/// [`crate::map::ConHashMap`] in the process; this is a deliberate
/// simplification (see `SPEC_FULL.md` §9) that makes `min()` a conservative
/// lower bound across all maps' epochs rather than a precise per-map one.
pub struct GlobalClock {
    tick: CachePadded<AtomicU64>,
    registry: CachePadded<SpinRWLock<Vec<*const ThreadClockCell>>>,
}

// The registry only ever stores addresses of `ThreadClockCell`s that are kept
// alive (in thread-local storage) for at least as long as they remain
// registered; `register`/`unregister` are the only places these pointers are
// dereferenced, always through the owning `ThreadClock`.
unsafe impl Sync for GlobalClock {}
unsafe impl Send for GlobalClock {}

impl GlobalClock {
    const fn new() -> Self {
        Self {
            tick: CachePadded::new(AtomicU64::new(0)),
            registry: CachePadded::new(SpinRWLock::new(Vec::new())),
        }
    }

    /// Atomically advances the tick and returns the new value.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reads the current tick without advancing it.
    pub fn current(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    fn register(&self, cell: *const ThreadClockCell) {
        let mut threads = self.registry.write();
        threads.push(cell);
    }

    fn unregister(&self, cell: *const ThreadClockCell) {
        let mut threads = self.registry.write();
        if let Some(pos) = threads.iter().position(|&p| p == cell) {
            threads.swap_remove(pos);
        }
    }

    /// The minimum acknowledged tick across every currently registered
    /// thread, or the current tick if no thread is registered.
    pub fn min(&self) -> u64 {
        let threads = self.registry.read();
        let mut min = u64::MAX;
        for &cell in threads.iter() {
            let v = unsafe { (*cell).0.load(Ordering::Acquire) };
            min = min.min(v);
        }
        if threads.is_empty() {
            self.current()
        } else {
            min
        }
    }
}

/// The single, process-wide clock instance.
static CLOCK: GlobalClock = GlobalClock::new();

/// Returns the process-wide [`GlobalClock`].
pub fn global() -> &'static GlobalClock {
    &CLOCK
}

/// A thread's acknowledgement of the global tick.
///
/// Not constructed directly by users of this crate; obtained via [`with`],
/// which lazily creates and registers one per OS thread.
pub struct ThreadClock {
    cell: Box<ThreadClockCell>,
}

impl ThreadClock {
    fn new() -> Self {
        let cell = Box::new(ThreadClockCell(AtomicU64::new(0)));
        global().register(cell.as_ref() as *const ThreadClockCell);
        log::trace!("thread clock registered");
        Self { cell }
    }

    /// Stores the current global tick into this thread's local clock,
    /// acknowledging every retirement stamped at or before that tick.
    pub fn refresh(&self) -> u64 {
        let t = global().current();
        self.cell.0.store(t, Ordering::Release);
        t
    }
}

impl Drop for ThreadClock {
    fn drop(&mut self) {
        global().unregister(self.cell.as_ref() as *const ThreadClockCell);
        log::trace!("thread clock unregistered");
    }
}

thread_local! {
    static THREAD_CLOCK: ThreadClock = ThreadClock::new();
}

/// Runs `f` with this OS thread's lazily-registered [`ThreadClock`].
///
/// Every map operation that touches the epoch protocol (every `get` in both
/// modes, every retiring write) goes through this function, which is how
/// threads register themselves without any explicit setup call.
pub fn with<R>(f: impl FnOnce(&ThreadClock) -> R) -> R {
    THREAD_CLOCK.with(f)
}
