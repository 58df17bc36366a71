use std::{
    any::type_name,
    cell::UnsafeCell,
    convert::Infallible,
    fmt,
    panic::{RefUnwindSafe, UnwindSafe},
    sync::atomic::{AtomicU8, Ordering},
};

use crate::{
    state::{self, ResetGuard, Waiters, NEW, READY, RUNNING},
    InitError, Phase, Strategy,
};

/// A cell which runs its initializer at most once to completion, without any locking by the
/// caller.
///
/// The first caller to move the state from `NEW` to `RUNNING` runs the initializer.  Callers that
/// arrive while it runs are parked and woken when it finishes.  If it succeeded they return the
/// value; if it failed or panicked the state is back to `NEW` and one of them runs its own
/// initializer instead.  Once `READY`, a read is one Acquire load.
///
/// This is the default strategy of [Singleton](crate::Singleton), and what the
/// [singleton!](crate::singleton!) macro places in a function-local static.
///
/// ```
/// use singleton_cell::OnceSlot;
/// use std::sync::Arc;
///
/// let shared = Arc::new(OnceSlot::new());
/// let value: &i32 = shared.get_or_init(|| 4);
/// assert_eq!(value, &4);
///
/// // A second init is not called
/// let second = shared.get_or_init(|| unreachable!());
/// assert_eq!(second, &4);
/// ```
pub struct OnceSlot<T> {
    state: AtomicU8,
    waiters: Waiters,
    value: UnsafeCell<Option<T>>,
}

// Safety: acts like RwLock<Option<T>> whose write lock is only taken once.
unsafe impl<T: Sync + Send> Sync for OnceSlot<T> {}

impl<T: RefUnwindSafe + UnwindSafe> RefUnwindSafe for OnceSlot<T> {}
impl<T: UnwindSafe> UnwindSafe for OnceSlot<T> {}

impl<T> OnceSlot<T> {
    /// Creates a new empty slot.
    pub const fn new() -> Self {
        OnceSlot {
            state: AtomicU8::new(NEW),
            waiters: Waiters::new(),
            value: UnsafeCell::new(None),
        }
    }

    /// Gets the value if it has been constructed.
    ///
    /// Returns `None` if the slot is empty or being initialized.  This method never blocks.
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // Safety: READY is final and the Acquire orders us after the value write
            Some(unsafe { self.ready_unchecked() })
        } else {
            None
        }
    }

    /// Gets the contents of the slot, initializing it with `init` if the slot was empty.
    ///
    /// Many threads may call `get_or_init` concurrently with different initializers, but only one
    /// of them will be executed.
    ///
    /// If `init` panics, the panic is propagated to the caller, the slot remains uninitialized, and
    /// a waiting thread runs its own initializer.
    ///
    /// # Panics
    ///
    /// It is an error to reentrantly initialize the slot from `init`; that panics instead of
    /// deadlocking.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        match self.get_or_try_init(|| Ok::<T, Infallible>(init())) {
            Ok(v) => v,
            Err(InitError::Failed(e)) => match e {},
            Err(InitError::Reentrant) => panic!("reentrant init of {}", type_name::<T>()),
        }
    }

    /// Gets the contents of the slot, initializing it with `init` if the slot was empty.  If the
    /// slot was empty and `init` failed, an error is returned and the slot remains empty.
    ///
    /// Threads blocked on a failed attempt are not handed the error; they retry with their own
    /// initializer.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        match self.get() {
            Some(v) => Ok(v),
            None => self.init_slow(init),
        }
    }

    #[cold]
    fn init_slow<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, InitError<E>> {
        let addr = self as *const Self as usize;
        if state::constructing(addr) {
            error!(ty = type_name::<T>(), strategy = "holder", "reentrant initialization");
            return Err(InitError::Reentrant);
        }

        loop {
            match self.state.compare_exchange(NEW, RUNNING, Ordering::Acquire, Ordering::Acquire) {
                Ok(_) => break,
                // Safety: READY is final, and the failed exchange loaded it with Acquire
                Err(READY) => return Ok(unsafe { self.ready_unchecked() }),
                Err(_) => {
                    trace!(ty = type_name::<T>(), "waiting on construction in another thread");
                    self.waiters.wait_while_running(&self.state);
                }
            }
        }

        // We won the exchange, so we own the value until the guard is published or dropped
        let guard = ResetGuard::new(&self.state, Some(&self.waiters));
        let mark = state::enter(addr);
        debug!(ty = type_name::<T>(), strategy = "holder", "constructing instance");
        let value = match init() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    ty = type_name::<T>(),
                    strategy = "holder",
                    "construction failed; slot reset"
                );
                return Err(InitError::Failed(e));
            }
        };
        drop(mark);

        unsafe {
            *self.value.get() = Some(value);
        }
        // Release the value and wake everyone parked on it
        guard.publish();
        debug!(ty = type_name::<T>(), strategy = "holder", "instance ready");

        Ok(unsafe { self.ready_unchecked() })
    }

    pub fn phase(&self) -> Phase {
        state::phase_of(self.state.load(Ordering::Acquire))
    }

    /// Gets a mutable reference to the underlying value.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.get_mut().as_mut()
    }

    /// Takes the value out of this `OnceSlot`, moving it back to an uninitialized state.
    pub fn take(&mut self) -> Option<T> {
        *self.state.get_mut() = NEW;
        self.value.get_mut().take()
    }

    /// Consumes the OnceSlot, returning the wrapped value. Returns None if the slot was empty.
    pub fn into_inner(self) -> Option<T> {
        self.value.into_inner()
    }

    unsafe fn ready_unchecked(&self) -> &T {
        match &*self.value.get() {
            Some(v) => v,
            None => unreachable!(),
        }
    }
}

impl<T> Strategy<T> for OnceSlot<T> {
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: Self = OnceSlot::new();
    const NAME: &'static str = "holder";

    fn get(&self) -> Option<&T> {
        OnceSlot::get(self)
    }

    fn phase(&self) -> Phase {
        OnceSlot::phase(self)
    }

    fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        OnceSlot::get_or_try_init(self, init)
    }
}

impl<T> Default for OnceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for OnceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceSlot")
            .field("phase", &self.phase())
            .field("value", &self.get())
            .finish()
    }
}

impl<T> From<T> for OnceSlot<T> {
    fn from(value: T) -> Self {
        OnceSlot {
            state: AtomicU8::new(READY),
            waiters: Waiters::new(),
            value: UnsafeCell::new(Some(value)),
        }
    }
}

/// Declares functions returning a `&'static` instance that is constructed on the first call.
///
/// Each function keeps its instance in a static nested inside its own body, so nothing is built
/// until the function is first called, and every call after that returns the same reference.  The
/// strategy defaults to [OnceSlot]; name another with `as`.
///
/// ```
/// use singleton_cell::singleton;
/// use std::collections::HashMap;
///
/// singleton! {
///     /// Lookup table built on first use.
///     pub fn table() -> &'static HashMap<&'static str, u32> = {
///         let mut map = HashMap::new();
///         map.insert("ivory", 1);
///         map
///     };
///
///     fn tower() -> &'static String as DoubleChecked = "tower".to_string();
/// }
///
/// assert_eq!(table()["ivory"], 1);
/// assert!(std::ptr::eq(table(), table()));
/// assert_eq!(tower(), "tower");
/// ```
#[macro_export]
macro_rules! singleton {
    () => {};
    (
        $(#[$attr:meta])*
        $vis:vis fn $name:ident() -> &'static $ty:ty as $strategy:ident = $init:expr;
        $($rest:tt)*
    ) => {
        $(#[$attr])*
        $vis fn $name() -> &'static $ty {
            fn init() -> $ty {
                $init
            }
            static HOLDER: $crate::Singleton<$ty, $crate::$strategy<$ty>> =
                $crate::Singleton::new(init);
            HOLDER.get_instance()
        }
        $crate::singleton!($($rest)*);
    };
    (
        $(#[$attr:meta])*
        $vis:vis fn $name:ident() -> &'static $ty:ty = $init:expr;
        $($rest:tt)*
    ) => {
        $crate::singleton! {
            $(#[$attr])*
            $vis fn $name() -> &'static $ty as OnceSlot = $init;
            $($rest)*
        }
    };
}
