use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value shared between threads behind one `RwLock`.
///
/// The voxel world lives inside one of these: the simulation thread takes the write
/// guard for each edit, mesh workers take the read guard while copying a snapshot.
/// Clones share the value.
///
/// # Examples
///
/// ```
/// use chunk_mesh_engine::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let counter_clone = counter.clone();
///
/// let handle = std::thread::spawn(move || {
///     *counter_clone.get_mut() += 1;
/// });
///
/// handle.join().unwrap();
/// assert_eq!(*counter.get(), 1);
/// assert_eq!(counter.handle_count(), 1);
/// ```
///
/// # Poisoning
/// A panic while a guard is held poisons the lock. The data behind the lock is
/// still structurally valid for every type stored in the engine, so poisoned
/// guards are recovered instead of propagating the panic to unrelated threads.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Moves `resource` behind the lock.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Shared access. Blocks while a writer holds the lock.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access. Blocks until every other guard is released.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of handles sharing the value.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
