//! Two-tier locking discipline
//!
//! Every cluster owns one [`ClusterGlobalLock`] guarding its topology. Every
//! entity wraps its mutable fields in an [`EntityLock`], which shares the
//! cluster's global lock and adds a private one.
//!
//! Acquisition order is always global, then local. The guard types
//! [`ScopedRead`] and [`ScopedWrite`] hold both and declare the local guard
//! first, so it is released first.
//!
//! - Reading fields: global read + local read.
//! - Updating fields of a persisted entity: global read + local write.
//! - First persist of a new entity, or any topology change: global write.
//!
//! Code already holding the global lock must use [`EntityLock::read_held`] /
//! [`EntityLock::write_held`], which take only the local lock. Global reads are
//! recursive so nested read sections cannot deadlock behind a queued writer.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cluster-wide read/write lock shared by every entity of one cluster
#[derive(Clone, Default)]
pub struct ClusterGlobalLock {
    inner: Arc<RwLock<()>>,
}

impl ClusterGlobalLock {
    /// Create a fresh lock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire shared
    #[inline]
    pub fn read(&self) -> GlobalReadGuard<'_> {
        GlobalReadGuard {
            _guard: self.inner.read_recursive(),
            lock: self,
        }
    }

    /// Acquire exclusive
    #[inline]
    pub fn write(&self) -> GlobalWriteGuard<'_> {
        GlobalWriteGuard {
            _guard: self.inner.write(),
            lock: self,
        }
    }

    fn is_held_by(&self, held: &impl GlobalHeld) -> bool {
        Arc::ptr_eq(&self.inner, &held.global_lock().inner)
    }
}

impl fmt::Debug for ClusterGlobalLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterGlobalLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// Proof that a cluster-global lock is held by the caller
pub trait GlobalHeld {
    /// The lock that is held
    fn global_lock(&self) -> &ClusterGlobalLock;
}

/// Shared hold on a cluster-global lock
pub struct GlobalReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    lock: &'a ClusterGlobalLock,
}

impl GlobalHeld for GlobalReadGuard<'_> {
    fn global_lock(&self) -> &ClusterGlobalLock {
        self.lock
    }
}

/// Exclusive hold on a cluster-global lock
pub struct GlobalWriteGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    lock: &'a ClusterGlobalLock,
}

impl GlobalHeld for GlobalWriteGuard<'_> {
    fn global_lock(&self) -> &ClusterGlobalLock {
        self.lock
    }
}

enum GlobalGuard<'a> {
    Shared(GlobalReadGuard<'a>),
    Exclusive(GlobalWriteGuard<'a>),
}

/// Global read + local read
pub struct ScopedRead<'a, T> {
    local: RwLockReadGuard<'a, T>,
    global: GlobalReadGuard<'a>,
}

impl<T> Deref for ScopedRead<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.local
    }
}

impl<T> GlobalHeld for ScopedRead<'_, T> {
    fn global_lock(&self) -> &ClusterGlobalLock {
        self.global.lock
    }
}

/// Global (read or write) + local write
pub struct ScopedWrite<'a, T> {
    local: RwLockWriteGuard<'a, T>,
    global: GlobalGuard<'a>,
}

impl<T> ScopedWrite<'_, T> {
    /// Whether the global lock is held exclusively
    #[inline]
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(self.global, GlobalGuard::Exclusive(_))
    }
}

impl<T> Deref for ScopedWrite<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.local
    }
}

impl<T> DerefMut for ScopedWrite<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.local
    }
}

impl<T> GlobalHeld for ScopedWrite<'_, T> {
    fn global_lock(&self) -> &ClusterGlobalLock {
        match &self.global {
            GlobalGuard::Shared(g) => g.lock,
            GlobalGuard::Exclusive(g) => g.lock,
        }
    }
}

/// An entity's private lock plus a handle to its cluster's global lock
pub struct EntityLock<T> {
    global: ClusterGlobalLock,
    local: RwLock<T>,
    persisted: AtomicBool,
}

impl<T> EntityLock<T> {
    /// Wrap fields of a new, not yet persisted entity
    #[must_use]
    pub fn new(global: ClusterGlobalLock, value: T) -> Self {
        Self {
            global,
            local: RwLock::new(value),
            persisted: AtomicBool::new(false),
        }
    }

    /// Wrap fields of an entity that is already durable
    #[must_use]
    pub fn persisted(global: ClusterGlobalLock, value: T) -> Self {
        let lock = Self::new(global, value);
        lock.persisted.store(true, Ordering::Release);
        lock
    }

    /// The cluster-global lock this entity shares
    #[inline]
    #[must_use]
    pub fn global(&self) -> &ClusterGlobalLock {
        &self.global
    }

    /// Whether the entity has been persisted at least once
    #[inline]
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::Acquire)
    }

    /// Global read, then local read
    pub fn read(&self) -> ScopedRead<'_, T> {
        let global = self.global.read();
        let local = self.local.read();
        ScopedRead { local, global }
    }

    /// Global read, then local write
    pub fn write(&self) -> ScopedWrite<'_, T> {
        let global = GlobalGuard::Shared(self.global.read());
        let local = self.local.write();
        ScopedWrite { local, global }
    }

    /// Global write, then local write
    pub fn write_exclusive(&self) -> ScopedWrite<'_, T> {
        let global = GlobalGuard::Exclusive(self.global.write());
        let local = self.local.write();
        ScopedWrite { local, global }
    }

    /// Local read under a global lock the caller already holds
    pub fn read_held<'a>(&'a self, held: &impl GlobalHeld) -> RwLockReadGuard<'a, T> {
        debug_assert!(self.global.is_held_by(held), "foreign cluster-global lock");
        self.local.read()
    }

    /// Local write under a global lock the caller already holds
    pub fn write_held<'a>(&'a self, held: &impl GlobalHeld) -> RwLockWriteGuard<'a, T> {
        debug_assert!(self.global.is_held_by(held), "foreign cluster-global lock");
        self.local.write()
    }

    /// Persist the entity
    ///
    /// The first call takes the global lock exclusively and runs `first`,
    /// which registers the entity and writes it out. Later calls take the
    /// global lock shared and run `store`.
    ///
    /// # Errors
    /// Whatever `first` or `store` return; the persisted flag is only set
    /// when `first` succeeds.
    pub fn persist<E>(
        &self,
        first: impl FnOnce(&GlobalWriteGuard<'_>, &T) -> Result<(), E>,
        store: impl FnOnce(&T) -> Result<(), E>,
    ) -> Result<(), E> {
        if !self.is_persisted() {
            let global = self.global.write();
            let local = self.local.write();
            if !self.is_persisted() {
                first(&global, &*local)?;
                self.persisted.store(true, Ordering::Release);
                return Ok(());
            }
            return store(&*local);
        }
        let guard = self.write();
        store(&*guard)
    }
}

impl<T: Clone> EntityLock<T> {
    /// Mutate a copy, persist it, then commit
    ///
    /// `store` only runs once the entity is persisted; until then the change
    /// is committed in memory and written out by the first persist. When
    /// `mutate` or `store` fails the entity is left untouched.
    ///
    /// # Errors
    /// Whatever `mutate` or `store` return.
    pub fn update<R, E>(
        &self,
        mutate: impl FnOnce(&mut T) -> Result<R, E>,
        store: impl FnOnce(&T) -> Result<(), E>,
    ) -> Result<R, E> {
        let mut guard = self.write();
        let mut draft = (*guard).clone();
        let out = mutate(&mut draft)?;
        if self.is_persisted() {
            store(&draft)?;
        }
        *guard = draft;
        Ok(out)
    }

    /// Snapshot of the fields
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.read().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for EntityLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLock")
            .field("persisted", &self.is_persisted())
            .field("value", &self.local.try_read().as_deref())
            .finish()
    }
}
