use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted slot with read-write locking.
///
/// `MtResource` is how the terrain hands data across the main/worker thread
/// boundary: the worker writes a finished chunk into a slot, the main thread
/// takes it out on a later frame. It wraps an `Arc<RwLock<T>>`.
///
/// Unlike a bare `RwLock`, a poisoned lock is recovered rather than
/// propagated. The only writers are short, non-panicking critical sections
/// (moving an `Option` in or out), so the inner value is always consistent.
///
/// # Examples
///
/// ```
/// use voxel_terrain::core::MtResource;
///
/// let slot = MtResource::new(None::<u32>);
/// let worker_side = slot.clone();
///
/// std::thread::spawn(move || {
///     *worker_side.get_mut() = Some(7);
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(slot.take(), Some(7));
/// assert_eq!(slot.take(), None);
/// ```
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read guard for the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a write guard for the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync> MtResource<Option<T>> {
    /// Moves the value out of an optional slot, leaving `None` behind.
    pub fn take(&self) -> Option<T> {
        self.get_mut().take()
    }

    /// Stores a value into an optional slot, returning the previous one.
    pub fn replace(&self, value: T) -> Option<T> {
        self.get_mut().replace(value)
    }

    /// Returns `true` if the slot currently holds a value.
    pub fn is_some(&self) -> bool {
        self.get().is_some()
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + Default> Default for MtResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
