//! Tagged persistence for type-erased holders
//!
//! Every type-erased family (problems, algorithms, islands, batch
//! evaluators) persists as a `{ tag, value }` pair. A process-global
//! registry per family maps tags back to concrete deserializers, so a
//! holder restored from an archive regains its dynamic type.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Archive form of a type-erased holder: a stable type tag plus the
/// serialized state of the stored value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct TaggedValue {
    pub tag: String,
    pub value: serde_json::Value,
}

type Factory<B> = Box<dyn Fn(serde_json::Value) -> Result<Box<B>> + Send + Sync>;

/// Registry of deserializers for one type-erased family.
pub(crate) struct Registry<B: ?Sized> {
    entries: RwLock<HashMap<String, Factory<B>>>,
}

impl<B: ?Sized> Registry<B> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a deserializer under `tag`, replacing any previous entry.
    pub(crate) fn insert<F>(&self, tag: impl Into<String>, factory: F)
    where
        F: Fn(serde_json::Value) -> Result<Box<B>> + Send + Sync + 'static,
    {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner());
        entries.insert(tag.into(), Box::new(factory));
    }

    /// Rebuild a boxed value from its archive form.
    pub(crate) fn build(&self, tag: &str, value: serde_json::Value) -> Result<Box<B>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let factory = entries.get(tag).ok_or_else(|| {
            Error::Serialization(format!(
                "no deserializer registered for type tag '{tag}'"
            ))
        })?;
        factory(value)
    }
}

/// The unqualified name of a type, used as the default human-readable name
/// of user objects that do not provide one.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}
