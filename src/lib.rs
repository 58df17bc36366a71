//! Process-wide single instances, constructed at most once no matter how many threads race for
//! them.
//!
//! Every type here hands out references to one shared value that is never replaced once it
//! exists.  They differ in when the value is built and how concurrent first callers are kept from
//! building it twice:
//!
//! - [Eager] holds a value built before anyone can ask for it.  In a `static` that means at
//!   compile time, so there is nothing to race.
//! - [Synchronized] takes one lock on every access, including reads of a finished value.
//! - [DoubleChecked] reads an atomic state without locking and only takes the lock while the value
//!   is missing, checking again under the lock.  The value is published with a Release store that
//!   pairs with the Acquire load on the fast path.
//! - [OnceSlot] is a one-time initialization cell: the first caller claims the slot with a
//!   compare-and-swap and runs the initializer, later callers park until it finishes.  It is the
//!   default, and backs the function-local statics declared by [singleton!].
//!
//! The lazy strategies share the [Strategy] trait and the state machine
//! `Uninitialized -> InProgress -> Ready` (see [Phase]).  An initializer that returns an error or
//! panics moves the slot back to `Uninitialized`, and the threads that were waiting on it go on to
//! try their own initializer, so a failure never leaves anyone blocked or the slot stuck.
//!
//! [Singleton] binds a strategy to a stored constructor, which is the usual way to declare a
//! global:
//!
//! ```
//! use singleton_cell::{DoubleChecked, Eager, GetInstance, Singleton, Synchronized};
//!
//! #[derive(Debug)]
//! struct IvoryTower {
//!     floors: u32,
//! }
//!
//! static EAGER: Eager<IvoryTower> = Eager::new(IvoryTower { floors: 1 });
//! static LOCKED: Singleton<IvoryTower, Synchronized<IvoryTower>> =
//!     Singleton::new(|| IvoryTower { floors: 2 });
//! static CHECKED: Singleton<IvoryTower, DoubleChecked<IvoryTower>> =
//!     Singleton::new(|| IvoryTower { floors: 3 });
//! static HOLDER: Singleton<IvoryTower> = Singleton::new(|| IvoryTower { floors: 4 });
//!
//! fn same_twice(access: &impl GetInstance<Target = IvoryTower>) -> u32 {
//!     let first = access.get_instance();
//!     let second = access.get_instance();
//!     assert!(std::ptr::eq(first, second));
//!     first.floors
//! }
//!
//! assert_eq!(same_twice(&EAGER), 1);
//! assert_eq!(same_twice(&LOCKED), 2);
//! assert_eq!(same_twice(&CHECKED), 3);
//! assert_eq!(same_twice(&HOLDER), 4);
//! ```
//!
//! With the `tracing` feature (on by default) construction, failure and contention are reported as
//! `tracing` events.

#[macro_use]
mod logging;

mod double_checked;
mod eager;
mod error;
mod holder;
mod singleton;
mod state;
mod synchronized;

pub use double_checked::DoubleChecked;
pub use eager::Eager;
pub use error::InitError;
pub use holder::OnceSlot;
pub use singleton::Singleton;
pub use synchronized::Synchronized;

/// A [Singleton] whose every access takes a lock.
pub type SyncSingleton<T, F = fn() -> T> = Singleton<T, Synchronized<T>, F>;
/// A [Singleton] using double-checked locking.
pub type DclSingleton<T, F = fn() -> T> = Singleton<T, DoubleChecked<T>, F>;
/// A [Singleton] backed by a [OnceSlot].  Same as the default.
pub type HolderSingleton<T, F = fn() -> T> = Singleton<T, OnceSlot<T>, F>;

/// Where a slot is in its construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Phase {
    /// No value, and nobody is constructing one.
    Uninitialized,
    /// A thread is running the initializer.
    InProgress,
    /// The value exists and will not change.
    Ready,
}

/// A slot that holds at most one value, constructed by the first successful initializer.
///
/// Implemented by the lazy strategies [Synchronized], [DoubleChecked] and [OnceSlot].  For all of
/// them:
///
/// - at most one initializer runs at a time, and none runs once the slot is `Ready`;
/// - every reference returned from a `Ready` slot points to the same value;
/// - a returned reference never points to a value whose construction is still running;
/// - an initializer that fails or panics leaves the slot `Uninitialized`.
pub trait Strategy<T>: Sized {
    /// An empty slot, usable to initialize a `static`.
    const EMPTY: Self;

    /// Short name used in log events.
    const NAME: &'static str;

    /// Gets the value if it has been constructed.  Never runs an initializer.
    fn get(&self) -> Option<&T>;

    fn phase(&self) -> Phase;

    /// Gets the value, running `init` if no value has been constructed yet.
    ///
    /// If another thread is constructing, this either blocks until it is done or (if that attempt
    /// fails) runs `init` itself.  Returns [InitError::Reentrant] if called from inside an
    /// initializer for the same slot.
    fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>>;
}

/// The accessor contract shared by every strategy: one shared instance, built on first need.
pub trait GetInstance {
    type Target;

    fn get_instance(&self) -> &Self::Target;
}

impl<'a, A: GetInstance + ?Sized> GetInstance for &'a A {
    type Target = A::Target;

    fn get_instance(&self) -> &A::Target {
        (**self).get_instance()
    }
}
