//! Concurrency-heavy integration tests: the scenarios and quantified
//! invariants that need several real OS threads to say anything meaningful.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use conhashmap::{AppendOnlyMap, RemovableMap};
use crossbeam_utils::thread::scope;
use rand::Rng;

/// Installs `env_logger` so the `log::trace!`/`log::debug!` call sites in
/// `clock`/`garbage`/`bucket` surface under `RUST_LOG=trace cargo test --
/// --nocapture`. `try_init` tolerates the repeated calls from every test in
/// this binary.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn s4_reclamation_is_deferred_until_other_thread_acknowledges() {
    init_logging();
    let flag = Arc::new(AtomicBool::new(false));

    struct DropSignal(Arc<AtomicBool>);
    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let m: RemovableMap<i32, Arc<Mutex<DropSignal>>> = RemovableMap::new(8);
    let cell = Arc::new(Mutex::new(DropSignal(flag.clone())));

    let b_registered = AtomicBool::new(false);
    let proceed = AtomicBool::new(false);

    scope(|s| {
        s.spawn(|_| {
            // B's first operation: registers this thread's clock, stamped
            // at whatever tick is current before the removal below.
            m.get(&999);
            b_registered.store(true, Ordering::Release);
            while !proceed.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            // B's second operation: refreshes past the removal tick.
            m.get(&999);
        });

        while !b_registered.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }

        m.set(10, cell.clone());
        m.remove(&10).unwrap();
        drop(cell);

        for _ in 0..64 {
            m.garbage_collect();
            assert!(!flag.load(Ordering::SeqCst));
        }

        proceed.store(true, Ordering::Release);

        let mut reclaimed = false;
        for _ in 0..100_000 {
            if m.garbage_collect() > 0 {
                reclaimed = true;
                break;
            }
            std::thread::yield_now();
        }
        assert!(reclaimed);
        assert!(flag.load(Ordering::SeqCst));
    })
    .unwrap();
}

#[test]
fn s5_high_contention_read() {
    init_logging();
    let m: AppendOnlyMap<i32, i32> = AppendOnlyMap::new(64);
    m.set(2, 123);
    scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..500_000 {
                    assert_eq!(m.get(&2), Some(123));
                }
            });
        }
    })
    .unwrap();
}

#[test]
fn s6_mixed_random_workload_matches_reference_map() {
    init_logging();
    let m: RemovableMap<u32, u32> = RemovableMap::new(32);
    let reference: Mutex<HashMap<u32, u32>> = Mutex::new(HashMap::new());

    scope(|s| {
        for thread_id in 0..4u32 {
            let m = &m;
            let reference = &reference;
            s.spawn(move |_| {
                let mut rng = rand::thread_rng();
                for _ in 0..50_000 {
                    let key = rng.gen_range(0..64);
                    match rng.gen_range(0..3) {
                        0 => {
                            let value = key.wrapping_mul(31).wrapping_add(thread_id);
                            m.set(key, value);
                            reference.lock().unwrap().insert(key, value);
                        }
                        1 => {
                            let _ = m.remove(&key);
                            reference.lock().unwrap().remove(&key);
                        }
                        _ => {
                            let _ = m.get(&key);
                        }
                    }
                }
            });
        }
    })
    .unwrap();

    // Drain every deferred retirement: every participating thread has
    // exited by now, so the registry is empty and `min()` is unbounded.
    for _ in 0..4 {
        m.garbage_collect();
    }

    let reference = reference.into_inner().unwrap();
    for (key, value) in reference.iter() {
        assert_eq!(m.get(key), Some(*value));
    }
    for key in 0..64u32 {
        if !reference.contains_key(&key) {
            assert_eq!(m.get(&key), None);
        }
    }
}

#[test]
fn never_observe_a_value_whose_allocation_was_already_reclaimed() {
    init_logging();
    struct Sentinel(Arc<AtomicBool>);
    impl Drop for Sentinel {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let m: RemovableMap<u32, Arc<Sentinel>> = RemovableMap::new(16);
    let violations = AtomicUsize::new(0);

    scope(|s| {
        for _ in 0..4 {
            let m = &m;
            let violations = &violations;
            s.spawn(move |_| {
                for i in 0..20_000u32 {
                    let key = i % 8;
                    let dropped = Arc::new(AtomicBool::new(false));
                    m.set(key, Arc::new(Sentinel(dropped.clone())));
                    if let Some(value) = m.get(&key) {
                        if value.0.load(Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    let _ = m.remove(&key);
                    m.garbage_collect();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn global_tick_is_monotonic_under_concurrent_advances() {
    let clock = conhashmap::clock::global();
    let before = clock.current();

    let observed: Mutex<Vec<u64>> = Mutex::new(Vec::new());
    scope(|s| {
        for _ in 0..8 {
            let observed = &observed;
            s.spawn(move |_| {
                for _ in 0..1000 {
                    let t = clock.advance();
                    observed.lock().unwrap().push(t);
                }
            });
        }
    })
    .unwrap();

    let mut ticks = observed.into_inner().unwrap();
    ticks.sort_unstable();
    ticks.dedup();
    assert_eq!(ticks.len(), 8000);
    assert!(*ticks.first().unwrap() > before);
}
