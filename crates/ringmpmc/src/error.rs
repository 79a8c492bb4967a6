use std::fmt;
use thiserror::Error;

/// Error codes of the queue family, distinct from the in-band engine
/// sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    /// An enqueue hit a full bounded queue.
    #[error("bounded queue overflow")]
    BoundedQueueOverflow,
}

/// Enqueue failure carrying the rejected value back to the caller.
///
/// Overflow is a failure with value preservation: the element never made it
/// into the queue, so ownership travels back inside the error. The queue is
/// untouched and usable.
///
/// # Example
///
/// ```
/// use ringmpmc_rs::ScalableCircularQueue;
///
/// let queue = ScalableCircularQueue::<u32>::new(1);
/// queue.enqueue(1).unwrap();
/// let err = queue.enqueue(2).unwrap_err();
/// assert_eq!(*err.get(), 2);
/// assert_eq!(err.into_value(), 2);
/// ```
#[derive(Error)]
#[error("{message}")]
pub struct OverflowError<T> {
    message: &'static str,
    code: ErrorCode,
    value: T,
}

impl<T> OverflowError<T> {
    pub(crate) fn new(message: &'static str, value: T) -> Self {
        Self {
            message,
            code: ErrorCode::BoundedQueueOverflow,
            value,
        }
    }

    /// The fixed error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Borrows the rejected value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutably borrows the rejected value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Recovers the rejected value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}

// Manual Debug so the error stays usable with `unwrap`/`expect` for any T.
impl<T> fmt::Debug for OverflowError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverflowError")
            .field("message", &self.message)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}
