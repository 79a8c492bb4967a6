use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Polymorphic untyped allocator used for all queue backing storage.
///
/// Implementations must be thread-safe: the queue allocates during
/// construction and `set_capacity` only, but nothing stops callers from
/// sharing one resource across many queues on many threads.
pub trait MemoryResource: Send + Sync {
    /// Allocates a block for `layout`. Returns null on failure.
    fn allocate(&self, layout: Layout) -> *mut u8;

    /// Deallocates a block previously returned by [`allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on the same resource with
    /// the same `layout`, and must not be used afterwards.
    ///
    /// [`allocate`]: MemoryResource::allocate
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout);
}

/// The process-global allocator as a [`MemoryResource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalResource;

impl MemoryResource for GlobalResource {
    fn allocate(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0);
        // SAFETY: layout has non-zero size, checked above.
        unsafe { alloc::alloc(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: forwarded contract - ptr came from alloc::alloc with layout.
        unsafe { alloc::dealloc(ptr, layout) }
    }
}

/// Fixed-length array allocated through a [`MemoryResource`].
///
/// The common backing-array primitive for the slot storage and both index
/// engines. Elements are default-constructed in place at creation and the
/// block is returned to the owning resource on drop. The length never
/// changes; resizing is done by replacing the whole array.
pub(crate) struct RawArray<T> {
    ptr: NonNull<T>,
    len: usize,
    resource: Arc<dyn MemoryResource>,
}

// Safety: RawArray is a plain owned buffer; it adds no sharing of its own.
unsafe impl<T: Send> Send for RawArray<T> {}
unsafe impl<T: Sync> Sync for RawArray<T> {}

impl<T: Default> RawArray<T> {
    /// Allocates `len` elements and default-constructs each in place.
    ///
    /// Aborts via `handle_alloc_error` if the resource cannot satisfy the
    /// request, matching the behavior of std collections.
    pub(crate) fn new(len: usize, resource: Arc<dyn MemoryResource>) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len: 0,
                resource,
            };
        }
        let layout = Layout::array::<T>(len).expect("backing array size overflows isize");
        let raw = resource.allocate(layout);
        let Some(ptr) = NonNull::new(raw.cast::<T>()) else {
            alloc::handle_alloc_error(layout);
        };
        for i in 0..len {
            // SAFETY: i < len, so the write stays inside the fresh block.
            unsafe { ptr.as_ptr().add(i).write(T::default()) };
        }
        Self { ptr, len, resource }
    }
}

impl<T> RawArray<T> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: ptr/len describe a block of initialized elements owned by
        // self (or len == 0 with a dangling, never-dereferenced pointer).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for RawArray<T> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: elements were constructed in new() and the layout matches
        // the original allocation.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            let layout = Layout::array::<T>(self.len).expect("layout checked at allocation");
            self.resource
                .deallocate(self.ptr.as_ptr().cast::<u8>(), layout);
        }
    }
}
