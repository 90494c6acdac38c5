//! A heap shared behind a spin lock.

use spin::Mutex;

use crate::{
    block::HeapPtr, config::HeapConfig, error::InitError, heap::Heap, region::MemoryRegion,
};

/// A [`Heap`] protected by a spin lock.
///
/// The heap itself requires exclusive access for every operation. This
/// wrapper serializes callers so that one heap can be used from several
/// threads through a shared reference.
pub struct LockedHeap<R> {
    inner: Mutex<Heap<R>>,
}

impl<R> LockedHeap<R> {
    /// Wraps an initialized heap.
    pub const fn new(heap: Heap<R>) -> Self {
        Self {
            inner: Mutex::new(heap),
        }
    }

    /// Acquires the lock for a sequence of operations.
    pub fn lock(&self) -> spin::MutexGuard<'_, Heap<R>> {
        self.inner.lock()
    }

    #[must_use]
    pub fn into_inner(self) -> Heap<R> {
        self.inner.into_inner()
    }
}

impl<R> LockedHeap<R>
where
    R: MemoryRegion,
{
    /// Initializes a heap over `region` and wraps it.
    pub fn with_config(region: R, config: HeapConfig) -> Result<Self, InitError> {
        Heap::with_config(region, config).map(Self::new)
    }

    /// See [`Heap::allocate`].
    pub fn allocate(&self, size: usize) -> Option<HeapPtr> {
        self.inner.lock().allocate(size)
    }

    /// See [`Heap::deallocate`].
    pub fn deallocate(&self, ptr: Option<HeapPtr>) {
        self.inner.lock().deallocate(ptr);
    }

    /// See [`Heap::reallocate`].
    pub fn reallocate(&self, ptr: Option<HeapPtr>, size: usize) -> Option<HeapPtr> {
        self.inner.lock().reallocate(ptr, size)
    }
}

impl<R> core::fmt::Debug for LockedHeap<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockedHeap").finish_non_exhaustive()
    }
}
