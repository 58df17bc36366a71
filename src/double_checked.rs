use std::{
    any::type_name,
    cell::UnsafeCell,
    convert::Infallible,
    fmt,
    panic::{RefUnwindSafe, UnwindSafe},
    sync::atomic::{AtomicU8, Ordering},
    sync::{Mutex, PoisonError},
};

use crate::{
    state::{self, ResetGuard, NEW, READY, RUNNING},
    InitError, Phase, Strategy,
};

/// A slot using double-checked locking.
///
/// Once the value exists, a read is a single Acquire load of the state.  Only callers that see an
/// empty slot take the lock, and they check the state again under it before constructing: another
/// thread may have finished in between.
///
/// The value is published by a Release store of `READY` after it has been written.  A reader whose
/// Acquire load sees `READY` therefore also sees every write the initializer made.
///
/// ```
/// use singleton_cell::DoubleChecked;
///
/// static TOWER: DoubleChecked<Vec<u32>> = DoubleChecked::new();
///
/// let a = TOWER.get_or_init(|| vec![1, 2, 3]);
/// let b = TOWER.get_or_init(|| unreachable!());
/// assert!(std::ptr::eq(a, b));
/// ```
pub struct DoubleChecked<T> {
    state: AtomicU8,
    lock: Mutex<()>,
    value: UnsafeCell<Option<T>>,
}

// Safety: writes to the value happen under the lock before READY is released, and never after.
unsafe impl<T: Sync + Send> Sync for DoubleChecked<T> {}

impl<T: RefUnwindSafe + UnwindSafe> RefUnwindSafe for DoubleChecked<T> {}
impl<T: UnwindSafe> UnwindSafe for DoubleChecked<T> {}

impl<T> DoubleChecked<T> {
    /// Creates a new empty slot.
    pub const fn new() -> Self {
        DoubleChecked {
            state: AtomicU8::new(NEW),
            lock: Mutex::new(()),
            value: UnsafeCell::new(None),
        }
    }

    /// Gets the value if it has been constructed.  Never blocks.
    pub fn get(&self) -> Option<&T> {
        // This Acquire pairs with the Release in ResetGuard::publish
        if self.state.load(Ordering::Acquire) == READY {
            // Safety: READY is final and was stored after the value
            Some(unsafe { self.ready_unchecked() })
        } else {
            None
        }
    }

    /// Gets the value, constructing it with `init` if the slot is empty.
    ///
    /// # Panics
    ///
    /// If `init` panics, the panic is propagated and the slot stays empty.  Calling this from
    /// inside `init` on the same slot also panics.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        match self.get_or_try_init(|| Ok::<T, Infallible>(init())) {
            Ok(v) => v,
            Err(InitError::Failed(e)) => match e {},
            Err(InitError::Reentrant) => panic!("reentrant init of {}", type_name::<T>()),
        }
    }

    /// Gets the value, constructing it with `init` if the slot is empty.
    ///
    /// If `init` fails the slot stays empty and the error is returned.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        // first check, no lock
        match self.get() {
            Some(v) => Ok(v),
            None => self.init_slow(init),
        }
    }

    #[cold]
    fn init_slow<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, InitError<E>> {
        let addr = self as *const Self as usize;
        if state::constructing(addr) {
            error!(ty = type_name::<T>(), strategy = "double-checked", "reentrant initialization");
            return Err(InitError::Reentrant);
        }

        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Second check.  Without it, every thread that lost the race for the lock would construct
        // its own instance after the winner released it.
        if let Some(v) = self.get() {
            return Ok(v);
        }

        self.state.store(RUNNING, Ordering::Relaxed);
        let guard = ResetGuard::new(&self.state, None);
        let mark = state::enter(addr);
        debug!(ty = type_name::<T>(), strategy = "double-checked", "constructing instance");
        let value = match init() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    ty = type_name::<T>(),
                    strategy = "double-checked",
                    "construction failed; slot reset"
                );
                return Err(InitError::Failed(e));
            }
        };
        drop(mark);

        // Safety: we hold the lock and the state is not READY, so no reader can reach the value
        unsafe {
            *self.value.get() = Some(value);
        }
        // The Release here is the publication barrier for the fast path
        guard.publish();
        debug!(ty = type_name::<T>(), strategy = "double-checked", "instance ready");

        Ok(unsafe { self.ready_unchecked() })
    }

    pub fn phase(&self) -> Phase {
        state::phase_of(self.state.load(Ordering::Acquire))
    }

    /// Gets a mutable reference to the value.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.get_mut().as_mut()
    }

    /// Takes the value out, moving the slot back to an uninitialized state.
    pub fn take(&mut self) -> Option<T> {
        *self.state.get_mut() = NEW;
        self.value.get_mut().take()
    }

    /// Consumes the slot, returning the value if it was constructed.
    pub fn into_inner(self) -> Option<T> {
        self.value.into_inner()
    }

    /// Safety: the state must have been observed as READY with Acquire ordering.
    unsafe fn ready_unchecked(&self) -> &T {
        match &*self.value.get() {
            Some(v) => v,
            None => unreachable!(),
        }
    }
}

impl<T> Strategy<T> for DoubleChecked<T> {
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: Self = DoubleChecked::new();
    const NAME: &'static str = "double-checked";

    fn get(&self) -> Option<&T> {
        DoubleChecked::get(self)
    }

    fn phase(&self) -> Phase {
        DoubleChecked::phase(self)
    }

    fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        DoubleChecked::get_or_try_init(self, init)
    }
}

impl<T> Default for DoubleChecked<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for DoubleChecked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleChecked")
            .field("phase", &self.phase())
            .field("value", &self.get())
            .finish()
    }
}
