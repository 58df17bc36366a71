use thiserror::Error;

/// The reason a lazy strategy did not return an instance.
///
/// In both cases the slot is left uninitialized, so a later call may try again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InitError<E> {
    /// The initializer run by this call returned an error.
    #[error("instance construction failed: {0}")]
    Failed(E),

    /// The initializer tried to get the instance it is in the middle of constructing.
    #[error("instance requested reentrantly from its own initializer")]
    Reentrant,
}

impl<E> InitError<E> {
    /// The initializer's error, if that was the cause.
    pub fn into_failure(self) -> Option<E> {
        match self {
            InitError::Failed(e) => Some(e),
            InitError::Reentrant => None,
        }
    }

    /// Maps the initializer's error, leaving [InitError::Reentrant] alone.
    pub fn map<U>(self, f: impl FnOnce(E) -> U) -> InitError<U> {
        match self {
            InitError::Failed(e) => InitError::Failed(f(e)),
            InitError::Reentrant => InitError::Reentrant,
        }
    }

    pub fn is_reentrant(&self) -> bool {
        matches!(self, InitError::Reentrant)
    }
}
