use std::{any::type_name, convert::Infallible, fmt, marker::PhantomData, ops::Deref};

use crate::{GetInstance, InitError, OnceSlot, Phase, Strategy};

/// A value which is constructed on first access, by a constructor stored alongside its slot.
///
/// `S` picks the construction strategy and defaults to [OnceSlot].  The constructor is `Fn`, not
/// `FnOnce`: a fallible constructor is called again after a failed attempt.
///
/// ```
/// use singleton_cell::{DoubleChecked, Singleton, Synchronized};
/// use std::collections::HashMap;
///
/// static CONFIG: Singleton<HashMap<&str, &str>> = Singleton::new(|| {
///     let mut map = HashMap::new();
///     map.insert("tower", "ivory");
///     map
/// });
///
/// static LOCKED: Singleton<u64, Synchronized<u64>> = Singleton::new(|| 42);
/// static CHECKED: Singleton<u64, DoubleChecked<u64>> = Singleton::new(|| 42);
///
/// assert_eq!(CONFIG.get_instance()["tower"], "ivory");
/// assert_eq!(CONFIG.get("tower"), Some(&"ivory"));
/// assert_eq!(*LOCKED.get_instance(), *CHECKED.get_instance());
/// ```
///
/// A constructor returning `Result` is used through [Singleton::try_get_instance]:
///
/// ```
/// use singleton_cell::{OnceSlot, Singleton};
///
/// static PORT: Singleton<u16, OnceSlot<u16>, fn() -> Result<u16, String>> =
///     Singleton::new(|| "8080".parse::<u16>().map_err(|e| e.to_string()));
///
/// assert_eq!(PORT.try_get_instance(), Ok(&8080));
/// ```
pub struct Singleton<T, S = OnceSlot<T>, F = fn() -> T> {
    slot: S,
    init: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Strategy<T>, F> Singleton<T, S, F> {
    /// Creates a new singleton with the given constructor.  Nothing is constructed yet.
    pub const fn new(init: F) -> Self {
        Singleton { slot: S::EMPTY, init, _marker: PhantomData }
    }

    /// Gets the instance without constructing it.
    pub fn try_get(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn phase(&self) -> Phase {
        self.slot.phase()
    }

    /// Gets the instance, running the constructor if no attempt has succeeded yet.
    ///
    /// On failure the error is returned and the slot stays empty; the next call runs the
    /// constructor again.
    pub fn try_get_instance<E>(&self) -> Result<&T, InitError<E>>
    where
        F: Fn() -> Result<T, E>,
    {
        self.slot.get_or_try_init(&self.init)
    }

    /// The underlying slot.
    pub fn slot(&self) -> &S {
        &self.slot
    }
}

impl<T, S: Strategy<T>, F: Fn() -> T> Singleton<T, S, F> {
    /// Gets the instance, constructing it on the first call.
    ///
    /// # Panics
    ///
    /// If the constructor panics, so does this call; the next call will try again.  Also panics
    /// if called from inside the constructor.
    pub fn get_instance(&self) -> &T {
        match self.slot.get_or_try_init(|| Ok::<T, Infallible>((self.init)())) {
            Ok(v) => v,
            Err(InitError::Failed(e)) => match e {},
            Err(InitError::Reentrant) => {
                panic!("{} requested from its own constructor", type_name::<T>())
            }
        }
    }
}

impl<T, S: Strategy<T>, F: Fn() -> T> GetInstance for Singleton<T, S, F> {
    type Target = T;

    fn get_instance(&self) -> &T {
        Singleton::get_instance(self)
    }
}

impl<T, S: Strategy<T>, F: Fn() -> T> Deref for Singleton<T, S, F> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get_instance()
    }
}

impl<T: fmt::Debug, S: Strategy<T>, F> fmt::Debug for Singleton<T, S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("strategy", &S::NAME)
            .field("phase", &self.slot.phase())
            .field("value", &self.slot.get())
            .finish()
    }
}
