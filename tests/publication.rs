//! Readers polling the fast path while a slow constructor runs must never see a value that is
//! not fully built.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use singleton_cell::{DoubleChecked, OnceSlot, Strategy};

const READERS: usize = 100;
const LEN: usize = 4096;

struct Ledger {
    entries: Vec<u64>,
    checksum: u64,
    // written last
    sealed: bool,
}

impl Ledger {
    fn build_slowly() -> Ledger {
        let mut ledger = Ledger { entries: Vec::new(), checksum: 0, sealed: false };
        for i in 0..LEN as u64 {
            ledger.entries.push(i * 3);
            ledger.checksum = ledger.checksum.wrapping_add(i * 3);
            if i % 1024 == 0 {
                thread::sleep(Duration::from_millis(5));
            }
        }
        ledger.sealed = true;
        ledger
    }

    fn assert_complete(&self) {
        assert!(self.sealed);
        assert_eq!(self.entries.len(), LEN);
        assert_eq!(self.entries.iter().fold(0u64, |a, &e| a.wrapping_add(e)), self.checksum);
    }
}

fn readers_see_whole_value<S: Strategy<Ledger> + Sync>() {
    let slot = S::EMPTY;
    let built = AtomicUsize::new(0);
    let barrier = Barrier::new(READERS + 1);

    thread::scope(|s| {
        for _ in 0..READERS {
            let (slot, barrier) = (&slot, &barrier);
            s.spawn(move || {
                barrier.wait();
                // spin on the unlocked read until the value appears
                let ledger = loop {
                    if let Some(ledger) = slot.get() {
                        break ledger;
                    }
                    thread::yield_now();
                };
                ledger.assert_complete();
            });
        }

        barrier.wait();
        let ledger = slot
            .get_or_try_init(|| {
                built.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Ledger::build_slowly())
            })
            .unwrap();
        ledger.assert_complete();
    });

    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn double_checked_publishes_whole_value() {
    readers_see_whole_value::<DoubleChecked<Ledger>>();
}

#[test]
fn holder_publishes_whole_value() {
    readers_see_whole_value::<OnceSlot<Ledger>>();
}

#[test]
fn racing_initializers_see_whole_value() {
    let slot = DoubleChecked::new();
    let barrier = Barrier::new(READERS);

    thread::scope(|s| {
        for _ in 0..READERS {
            let (slot, barrier) = (&slot, &barrier);
            s.spawn(move || {
                barrier.wait();
                slot.get_or_init(Ledger::build_slowly).assert_complete();
            });
        }
    });
}
