//! The construction state machine shared by the lazy strategies.
//!
//! A slot moves `NEW -> RUNNING -> READY`.  A failed or unwinding construction moves it back from
//! `RUNNING` to `NEW`, which is done by dropping a [ResetGuard] instead of publishing it.

use std::{
    cell::RefCell,
    mem,
    sync::atomic::{AtomicU8, Ordering},
    sync::{Condvar, Mutex, PoisonError},
};

use crate::Phase;

pub(crate) const NEW: u8 = 0;
pub(crate) const RUNNING: u8 = 1;
pub(crate) const READY: u8 = 2;

pub(crate) fn phase_of(state: u8) -> Phase {
    match state {
        NEW => Phase::Uninitialized,
        RUNNING => Phase::InProgress,
        READY => Phase::Ready,
        _ => unreachable!("invalid slot state {}", state),
    }
}

/// Threads parked until a running construction either publishes or resets.
#[derive(Debug)]
pub(crate) struct Waiters {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Waiters {
    pub(crate) const fn new() -> Self {
        Waiters { lock: Mutex::new(()), cond: Condvar::new() }
    }

    /// Block while `state` is `RUNNING`.
    ///
    /// The state is checked under the lock and [Waiters::notify] takes the same lock after the
    /// state changes, so a transition can't slip between the check and the wait.
    pub(crate) fn wait_while_running(&self, state: &AtomicU8) {
        let mut lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while state.load(Ordering::Acquire) == RUNNING {
            lock = self.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn notify(&self) {
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.cond.notify_all();
    }
}

/// Ownership of a slot in the `RUNNING` state.
///
/// Dropping the guard returns the slot to `NEW`; this happens on an `Err` from the initializer and
/// while unwinding from a panic in it.  Either way the parked waiters are woken so one of them can
/// take over, rather than waiting on a construction that will never finish.
pub(crate) struct ResetGuard<'a> {
    state: &'a AtomicU8,
    waiters: Option<&'a Waiters>,
}

impl<'a> ResetGuard<'a> {
    /// Wrap a slot whose state the caller has already moved to `RUNNING`.
    pub(crate) fn new(state: &'a AtomicU8, waiters: Option<&'a Waiters>) -> Self {
        debug_assert_eq!(state.load(Ordering::Relaxed), RUNNING);
        ResetGuard { state, waiters }
    }

    /// Mark the slot `READY`.
    ///
    /// The caller must have written the value already: this Release pairs with the Acquire loads
    /// on the fast paths, which is what makes the value visible fully formed.
    pub(crate) fn publish(self) {
        self.state.store(READY, Ordering::Release);
        if let Some(waiters) = self.waiters {
            waiters.notify();
        }
        mem::forget(self);
    }
}

impl<'a> Drop for ResetGuard<'a> {
    fn drop(&mut self) {
        self.state.store(NEW, Ordering::Release);
        if let Some(waiters) = self.waiters {
            waiters.notify();
        }
    }
}

thread_local! {
    /// Addresses of the slots this thread is currently constructing.
    static CONSTRUCTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// True if the current thread is inside the initializer of the slot at `addr`.
///
/// A slot asking this before it locks or parks turns a self-deadlock into an error.
pub(crate) fn constructing(addr: usize) -> bool {
    CONSTRUCTING.try_with(|c| c.borrow().contains(&addr)).unwrap_or(false)
}

/// Record that this thread is running the initializer of the slot at `addr` until the returned
/// mark is dropped.
pub(crate) fn enter(addr: usize) -> ConstructionMark {
    let _ = CONSTRUCTING.try_with(|c| c.borrow_mut().push(addr));
    ConstructionMark { addr }
}

pub(crate) struct ConstructionMark {
    addr: usize,
}

impl Drop for ConstructionMark {
    fn drop(&mut self) {
        let addr = self.addr;
        let _ = CONSTRUCTING.try_with(|c| {
            let mut c = c.borrow_mut();
            if let Some(pos) = c.iter().rposition(|&a| a == addr) {
                c.remove(pos);
            }
        });
    }
}
