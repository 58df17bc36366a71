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

/// A slot where every access goes through one lock.
///
/// The check for an existing value and the construction of a missing one both happen while the
/// lock is held, so at most one thread is ever inside the initializer.  The price is that reading
/// an already constructed value also takes the lock.
///
/// ```
/// use singleton_cell::Synchronized;
///
/// static COUNTER: Synchronized<String> = Synchronized::new();
///
/// let a = COUNTER.get_or_init(|| "tower".to_string());
/// let b = COUNTER.get_or_init(|| unreachable!());
/// assert!(std::ptr::eq(a, b));
/// ```
pub struct Synchronized<T> {
    lock: Mutex<()>,
    // Only written under the lock.  Readers outside the lock use it to report a phase.
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

// Safety: the value is only written under the lock, and never again once READY.
unsafe impl<T: Sync + Send> Sync for Synchronized<T> {}

impl<T: RefUnwindSafe + UnwindSafe> RefUnwindSafe for Synchronized<T> {}
impl<T: UnwindSafe> UnwindSafe for Synchronized<T> {}

impl<T> Synchronized<T> {
    /// Creates a new empty slot.
    pub const fn new() -> Self {
        Synchronized {
            lock: Mutex::new(()),
            state: AtomicU8::new(NEW),
            value: UnsafeCell::new(None),
        }
    }

    /// Gets the value, taking the lock.  Returns `None` if it has not been constructed.
    ///
    /// Blocks while another thread is constructing.
    pub fn get(&self) -> Option<&T> {
        if state::constructing(self as *const Self as usize) {
            return None;
        }
        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ready()
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
    /// If `init` fails the slot stays empty and the error is returned; the next caller runs its
    /// own initializer.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        let addr = self as *const Self as usize;
        // The lock is held for the whole construction, so waiting on it from inside init would
        // never return.
        if state::constructing(addr) {
            error!(ty = type_name::<T>(), strategy = "synchronized", "reentrant initialization");
            return Err(InitError::Reentrant);
        }

        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(v) = self.ready() {
            return Ok(v);
        }

        self.state.store(RUNNING, Ordering::Relaxed);
        let guard = ResetGuard::new(&self.state, None);
        let mark = state::enter(addr);
        debug!(ty = type_name::<T>(), strategy = "synchronized", "constructing instance");
        let value = match init() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    ty = type_name::<T>(),
                    strategy = "synchronized",
                    "construction failed; slot reset"
                );
                return Err(InitError::Failed(e));
            }
        };
        drop(mark);

        // Safety: we hold the lock and the slot is not READY, so nobody holds a reference
        unsafe {
            *self.value.get() = Some(value);
        }
        guard.publish();
        debug!(ty = type_name::<T>(), strategy = "synchronized", "instance ready");

        // Safety: just published
        Ok(unsafe { self.ready_unchecked() })
    }

    /// Reports the construction phase without taking the lock.
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

    fn ready(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // Safety: READY is only stored after the value is written, with Release
            Some(unsafe { self.ready_unchecked() })
        } else {
            None
        }
    }

    /// Safety: the state must have been observed as READY.
    unsafe fn ready_unchecked(&self) -> &T {
        match &*self.value.get() {
            Some(v) => v,
            None => unreachable!(),
        }
    }
}

impl<T> Strategy<T> for Synchronized<T> {
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: Self = Synchronized::new();
    const NAME: &'static str = "synchronized";

    fn get(&self) -> Option<&T> {
        Synchronized::get(self)
    }

    fn phase(&self) -> Phase {
        Synchronized::phase(self)
    }

    fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, InitError<E>> {
        Synchronized::get_or_try_init(self, init)
    }
}

impl<T> Default for Synchronized<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Synchronized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronized")
            .field("phase", &self.phase())
            .field("value", &self.ready())
            .finish()
    }
}
