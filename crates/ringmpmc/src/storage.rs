use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// One uninitialized, suitably aligned slot for a queue element.
///
/// The cell itself keeps no liveness state: whether a `T` is currently
/// constructed inside is tracked entirely by the index engines. Exactly one
/// party owns the slot at any instant - the `free` ring, the producer that is
/// constructing into it, the `allocated` ring, or the consumer moving out -
/// and the engine's acq-rel index hand-off orders the accesses.
pub struct DataStorage<T> {
    storage: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for DataStorage<T> {
    fn default() -> Self {
        Self {
            storage: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

impl<T> DataStorage<T> {
    /// Constructs `value` in place.
    ///
    /// # Safety
    ///
    /// The slot must be empty and the caller must hold exclusive ownership of
    /// it (i.e. its index was just dequeued from the `free` ring).
    #[inline]
    pub unsafe fn set(&self, value: T) {
        // SAFETY: exclusive ownership is the caller's contract; the write
        // targets uninitialized storage so nothing is dropped.
        unsafe { (*self.storage.get()).write(value) };
    }

    /// Moves the value out, leaving the slot empty.
    ///
    /// # Safety
    ///
    /// The slot must hold an initialized `T` and the caller must hold
    /// exclusive ownership of it (its index was just dequeued from the
    /// `allocated` ring). The slot must not be read again before the next
    /// `set`.
    #[inline]
    pub unsafe fn take(&self) -> T {
        // SAFETY: initialized per the caller's contract; assume_init_read
        // moves ownership out and the protocol forbids a second read.
        unsafe { (*self.storage.get()).assume_init_read() }
    }

    /// Returns a shared reference to the contained value.
    ///
    /// # Safety
    ///
    /// The slot must hold an initialized `T` and no thread may be writing it.
    #[inline]
    pub unsafe fn get(&self) -> &T {
        // SAFETY: initialized per the caller's contract.
        unsafe { (*self.storage.get()).assume_init_ref() }
    }

    /// Returns an exclusive reference to the contained value.
    ///
    /// # Safety
    ///
    /// The slot must hold an initialized `T` and the caller must guarantee no
    /// other access for the lifetime of the returned reference.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        // SAFETY: exclusivity per the caller's contract.
        unsafe { (*self.storage.get()).assume_init_mut() }
    }
}
