//! User-defined island contract
//!
//! A user-defined island decides *where and how* one evolution epoch runs.
//! Its `run_evolve` method receives the island's algorithm and population
//! behind already-locked handles and may release them around the long
//! computation, so that observers stay responsive while an epoch is in
//! flight.

use std::any::Any;
use std::sync::{Mutex, MutexGuard, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};
use crate::population::Population;
use crate::serial::{short_type_name, Registry};

use super::thread_island::ThreadIsland;

/// A mutex together with its currently-held guard.
///
/// `run_evolve` receives the island's fields through these handles, locked
/// on entry. An island implementation typically snapshots the protected
/// value, calls [`unlock`](LockHandle::unlock), runs the long computation,
/// then [`relock`](LockHandle::relock)s to publish the result. Anything
/// still held when the handle is dropped is released.
pub struct LockHandle<'a, T> {
    mutex: &'a Mutex<T>,
    what: &'static str,
    guard: Option<MutexGuard<'a, T>>,
}

impl<'a, T> LockHandle<'a, T> {
    /// Lock `mutex` and wrap it in a handle.
    pub(crate) fn acquire(mutex: &'a Mutex<T>, what: &'static str) -> Result<Self> {
        let guard = mutex.lock().map_err(|_| {
            Error::Synchronization(format!(
                "the {what} lock was poisoned by a panicked thread"
            ))
        })?;
        Ok(Self {
            mutex,
            what,
            guard: Some(guard),
        })
    }

    /// Shared access to the protected value. Fails if the handle is
    /// currently unlocked.
    pub fn get(&self) -> Result<&T> {
        self.guard.as_deref().ok_or_else(|| {
            Error::Synchronization(format!(
                "the {} handle was accessed while unlocked",
                self.what
            ))
        })
    }

    /// Exclusive access to the protected value. Fails if the handle is
    /// currently unlocked.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        let what = self.what;
        self.guard.as_deref_mut().ok_or_else(|| {
            Error::Synchronization(format!(
                "the {what} handle was accessed while unlocked"
            ))
        })
    }

    /// Release the lock. A no-op if already unlocked.
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    /// Re-acquire the lock. A no-op if already locked.
    pub fn relock(&mut self) -> Result<()> {
        if self.guard.is_none() {
            self.guard = Some(self.mutex.lock().map_err(|_| {
                Error::Synchronization(format!(
                    "the {} lock was poisoned by a panicked thread",
                    self.what
                ))
            })?);
        }
        Ok(())
    }

    /// Whether the handle currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }
}

/// Interface implemented by user-defined islands.
///
/// Only [`run_evolve`](UserIsland::run_evolve) is mandatory. An island is
/// accessed concurrently from the worker thread and from observers (for
/// cloning and naming), hence the `Send + Sync` bounds.
pub trait UserIsland: Clone + Serialize + Send + Sync + 'static {
    /// Run one evolution epoch.
    ///
    /// Both handles are locked on entry. The implementation must leave the
    /// evolved population in the population slot; mutations to the
    /// algorithm are discarded by convention.
    fn run_evolve(
        &self,
        algo: &mut LockHandle<'_, Algorithm>,
        pop: &mut LockHandle<'_, Population>,
    ) -> Result<()>;

    /// Human-readable name.
    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Additional human-readable detail.
    fn extra_info(&self) -> String {
        String::new()
    }

    /// Stable tag identifying the concrete type in archives.
    fn type_tag(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Object-safe form of [`UserIsland`]; the escape hatch for binding layers,
/// implemented for every user island by a blanket impl.
pub trait DynIsland: Send + Sync {
    fn run_evolve(
        &self,
        algo: &mut LockHandle<'_, Algorithm>,
        pop: &mut LockHandle<'_, Population>,
    ) -> Result<()>;
    fn name(&self) -> String;
    fn extra_info(&self) -> String;
    fn type_tag(&self) -> String;
    fn to_value(&self) -> Result<serde_json::Value>;
    fn clone_boxed(&self) -> Box<dyn DynIsland>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: UserIsland> DynIsland for T {
    fn run_evolve(
        &self,
        algo: &mut LockHandle<'_, Algorithm>,
        pop: &mut LockHandle<'_, Population>,
    ) -> Result<()> {
        UserIsland::run_evolve(self, algo, pop)
    }

    fn name(&self) -> String {
        UserIsland::name(self)
    }

    fn extra_info(&self) -> String {
        UserIsland::extra_info(self)
    }

    fn type_tag(&self) -> String {
        UserIsland::type_tag(self)
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn clone_boxed(&self) -> Box<dyn DynIsland> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn registry() -> &'static Registry<dyn DynIsland> {
    static REGISTRY: OnceLock<Registry<dyn DynIsland>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = Registry::new();
        registry.insert("thread_island", |value| {
            let island: ThreadIsland = serde_json::from_value(value)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(Box::new(island) as Box<dyn DynIsland>)
        });
        registry
    })
}

/// Register an island type for deserialization under an explicit tag.
///
/// The tag must match the value returned by the type's
/// [`type_tag`](UserIsland::type_tag).
pub fn register_island_as<T: UserIsland + DeserializeOwned>(tag: &str) {
    registry().insert(tag, |value| {
        let island: T =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Box::new(island) as Box<dyn DynIsland>)
    });
}

/// Register an island type for deserialization under its default tag.
pub fn register_island<T: UserIsland + DeserializeOwned>() {
    register_island_as::<T>(std::any::type_name::<T>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_handle_unlock_and_relock() {
        let mutex = Mutex::new(5_u32);
        let mut handle = LockHandle::acquire(&mutex, "value").unwrap();
        assert!(handle.is_locked());
        assert_eq!(*handle.get().unwrap(), 5);

        handle.unlock();
        assert!(!handle.is_locked());
        assert!(handle.get().is_err());

        // While unlocked, others can take the mutex.
        *mutex.lock().unwrap() = 6;

        handle.relock().unwrap();
        assert_eq!(*handle.get().unwrap(), 6);
        *handle.get_mut().unwrap() = 7;
        drop(handle);
        assert_eq!(*mutex.lock().unwrap(), 7);
    }

    #[test]
    fn test_lock_handle_unlock_is_idempotent() {
        let mutex = Mutex::new(());
        let mut handle = LockHandle::acquire(&mutex, "unit").unwrap();
        handle.unlock();
        handle.unlock();
        handle.relock().unwrap();
        handle.relock().unwrap();
        assert!(handle.is_locked());
    }

    #[test]
    fn test_drop_releases_a_held_lock() {
        let mutex = Mutex::new(());
        {
            let _handle = LockHandle::acquire(&mutex, "unit").unwrap();
        }
        // Not blocked: the handle released on drop.
        let _guard = mutex.try_lock().unwrap();
    }
}
