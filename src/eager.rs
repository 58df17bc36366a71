use std::{fmt, ops::Deref};

use crate::{GetInstance, Phase};

/// An instance that is fully built before anything can ask for it.
///
/// In a `static`, the value is evaluated at compile time and is part of the binary image, so no
/// caller can ever race its construction.  That needs a `const` constructor; a constructor that
/// can fail or that has to run at runtime belongs in one of the lazy strategies instead.
///
/// A `static` `Eager` is also how a single-variant enum instance is expressed:
///
/// ```
/// use singleton_cell::Eager;
///
/// #[derive(Debug, PartialEq)]
/// enum IvoryTower {
///     Instance,
/// }
///
/// static TOWER: Eager<IvoryTower> = Eager::new(IvoryTower::Instance);
///
/// let a = TOWER.get_instance();
/// let b = TOWER.get_instance();
/// assert!(std::ptr::eq(a, b));
/// assert_eq!(*a, IvoryTower::Instance);
/// ```
pub struct Eager<T> {
    value: T,
}

impl<T> Eager<T> {
    /// Wraps an already constructed value.
    pub const fn new(value: T) -> Self {
        Eager { value }
    }

    /// Runs `init` now and wraps its result.
    ///
    /// If `init` panics, so does this.  Eager construction has no way to recover, so a failing
    /// constructor should be unwrapped here, where the failure stops startup.
    pub fn from_fn(init: impl FnOnce() -> T) -> Self {
        debug!(ty = std::any::type_name::<T>(), strategy = "eager", "constructing instance");
        Eager { value: init() }
    }

    pub const fn get_instance(&self) -> &T {
        &self.value
    }

    /// Always [Phase::Ready].
    pub const fn phase(&self) -> Phase {
        Phase::Ready
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> GetInstance for Eager<T> {
    type Target = T;

    fn get_instance(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Eager<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Default> Default for Eager<T> {
    fn default() -> Self {
        Eager::from_fn(T::default)
    }
}

impl<T: fmt::Debug> fmt::Debug for Eager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Eager").field(&self.value).finish()
    }
}
