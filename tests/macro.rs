use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

use singleton_cell::singleton;

static CONFIG_BUILT: AtomicUsize = AtomicUsize::new(0);
static NAMES_BUILT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
pub struct Config {
    pub workers: usize,
}

singleton! {
    /// Built on first call.
    pub fn config() -> &'static Config = {
        CONFIG_BUILT.fetch_add(1, Ordering::SeqCst);
        Config { workers: 4 }
    };

    fn names() -> &'static Vec<String> as Synchronized = {
        NAMES_BUILT.fetch_add(1, Ordering::SeqCst);
        vec!["ivory".to_string(), "tower".to_string()]
    };

    fn answer() -> &'static u64 as DoubleChecked = 42;
}

#[test]
fn holder_function_builds_on_first_call() {
    const THREADS: usize = 32;
    let barrier = Barrier::new(THREADS);

    let addrs: HashSet<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    config() as *const Config as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(addrs.len(), 1);
    assert_eq!(CONFIG_BUILT.load(Ordering::SeqCst), 1);
    assert_eq!(config().workers, 4);
}

#[test]
fn strategy_can_be_chosen() {
    assert_eq!(NAMES_BUILT.load(Ordering::SeqCst), 0);
    assert_eq!(names().len(), 2);
    assert!(std::ptr::eq(names(), names()));
    assert_eq!(NAMES_BUILT.load(Ordering::SeqCst), 1);

    assert_eq!(*answer(), 42);
}
