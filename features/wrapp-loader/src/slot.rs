use std::{
    any::type_name,
    fmt::Debug,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    errors::AttachError,
    types::{Injectable, Instance},
};

/// A field receiving another component once it is retrieved
///
/// Starts out empty and is filled exactly once by the loader. The slot only keeps
/// a weak reference - mutually dependent components would otherwise keep each
/// other alive forever. The loader holds every component until it is reset, so
/// a filled slot resolves for as long as the component is loaded.
pub struct Slot<T: Injectable> {
    once: OnceLock<Weak<T>>,
}
impl<T: Injectable> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: Injectable + Debug> Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(dependency) => f.debug_tuple("Slot").field(&dependency).finish(),
            None if self.is_filled() => f.debug_tuple("Slot").field(&"Dropped").finish(),
            None => f.debug_tuple("Slot").field(&"Empty").finish(),
        }
    }
}

impl<T: Injectable> Slot<T> {
    pub const fn new() -> Self {
        Slot {
            once: OnceLock::new(),
        }
    }

    /// Fills the slot with `dependency`
    ///
    /// Fails if the dependency is not a `T`, or if the slot was filled before.
    pub fn fill(&self, dependency: &Instance) -> Result<(), AttachError> {
        let dependency = dependency
            .downcast::<T>()
            .map_err(|actual| AttachError::TypeMismatch {
                expected: type_name::<T>(),
                actual,
            })?;

        self.once
            .set(Arc::downgrade(&dependency))
            .map_err(|_| AttachError::AlreadyFilled)
    }

    pub fn is_filled(&self) -> bool {
        self.once.get().is_some()
    }

    /// The attached dependency
    ///
    /// `None` while the slot is empty, or once the dependency was dropped.
    pub fn get(&self) -> Option<Arc<T>> {
        self.once.get().and_then(Weak::upgrade)
    }
}
