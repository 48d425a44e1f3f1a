//! Algorithm abstraction
//!
//! An algorithm evolves a population into a new population. Like problems,
//! user algorithms are plain values behind a type-erased wrapper that caches
//! the name and the declared thread-safety level.

use std::any::Any;
use std::fmt;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::population::Population;
use crate::serial::{short_type_name, Registry, TaggedValue};
use crate::thread_safety::ThreadSafety;

/// Interface implemented by user-defined algorithms.
pub trait UserAlgorithm: Clone + Serialize + Send + Sync + 'static {
    /// Produce an evolved population from the input population.
    fn evolve(&self, pop: &Population) -> Result<Population>;

    /// Human-readable name.
    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Additional human-readable detail.
    fn extra_info(&self) -> String {
        String::new()
    }

    /// Declared thread-safety level.
    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::Basic
    }

    /// Stable tag identifying the concrete type in archives.
    fn type_tag(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Object-safe form of [`UserAlgorithm`]; the escape hatch for binding
/// layers, implemented for every user algorithm by a blanket impl.
pub trait DynAlgorithm: Send + Sync {
    fn evolve(&self, pop: &Population) -> Result<Population>;
    fn name(&self) -> String;
    fn extra_info(&self) -> String;
    fn thread_safety(&self) -> ThreadSafety;
    fn type_tag(&self) -> String;
    fn to_value(&self) -> Result<serde_json::Value>;
    fn clone_boxed(&self) -> Box<dyn DynAlgorithm>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: UserAlgorithm> DynAlgorithm for T {
    fn evolve(&self, pop: &Population) -> Result<Population> {
        UserAlgorithm::evolve(self, pop)
    }

    fn name(&self) -> String {
        UserAlgorithm::name(self)
    }

    fn extra_info(&self) -> String {
        UserAlgorithm::extra_info(self)
    }

    fn thread_safety(&self) -> ThreadSafety {
        UserAlgorithm::thread_safety(self)
    }

    fn type_tag(&self) -> String {
        UserAlgorithm::type_tag(self)
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn clone_boxed(&self) -> Box<dyn DynAlgorithm> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn registry() -> &'static Registry<dyn DynAlgorithm> {
    static REGISTRY: OnceLock<Registry<dyn DynAlgorithm>> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Register an algorithm type for deserialization under an explicit tag.
pub fn register_algorithm_as<T: UserAlgorithm + DeserializeOwned>(tag: &str) {
    registry().insert(tag, |value| {
        let algorithm: T =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Box::new(algorithm) as Box<dyn DynAlgorithm>)
    });
}

/// Register an algorithm type for deserialization under its default tag.
pub fn register_algorithm<T: UserAlgorithm + DeserializeOwned>() {
    register_algorithm_as::<T>(std::any::type_name::<T>());
}

/// Type-erased algorithm wrapper.
pub struct Algorithm {
    inner: Box<dyn DynAlgorithm>,
    name: String,
    thread_safety: ThreadSafety,
}

impl Algorithm {
    /// Wrap a user algorithm.
    pub fn new(algorithm: impl UserAlgorithm) -> Self {
        Self::from_boxed(Box::new(algorithm))
    }

    /// Wrap an already-erased algorithm.
    pub fn from_boxed(inner: Box<dyn DynAlgorithm>) -> Self {
        Self {
            name: inner.name(),
            thread_safety: inner.thread_safety(),
            inner,
        }
    }

    /// Evolve a population with the stored algorithm.
    pub fn evolve(&self, pop: &Population) -> Result<Population> {
        self.inner.evolve(pop)
    }

    /// Algorithm name, cached at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra human-readable detail from the stored value.
    pub fn extra_info(&self) -> String {
        self.inner.extra_info()
    }

    /// Declared thread-safety level, cached at construction.
    pub fn thread_safety(&self) -> ThreadSafety {
        self.thread_safety
    }

    /// Downcast to the concrete stored type.
    pub fn extract<T: UserAlgorithm>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Whether the stored value is of type `T`.
    pub fn is<T: UserAlgorithm>(&self) -> bool {
        self.extract::<T>().is_some()
    }

    pub(crate) fn type_tag(&self) -> String {
        self.inner.type_tag()
    }

    pub(crate) fn to_value(&self) -> Result<serde_json::Value> {
        self.inner.to_value()
    }
}

impl Clone for Algorithm {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            name: self.name.clone(),
            thread_safety: self.thread_safety,
        }
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Algorithm")
            .field("name", &self.name)
            .field("thread_safety", &self.thread_safety)
            .finish()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Algorithm name: {}", self.name)?;
        writeln!(f, "\tThread safety: {}", self.thread_safety)?;
        let extra = self.extra_info();
        if !extra.is_empty() {
            writeln!(f, "Extra info:\n{extra}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct AlgorithmArchive {
    algorithm: TaggedValue,
}

impl Serialize for Algorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let archive = AlgorithmArchive {
            algorithm: TaggedValue {
                tag: self.type_tag(),
                value: self.to_value().map_err(serde::ser::Error::custom)?,
            },
        };
        archive.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let archive = AlgorithmArchive::deserialize(deserializer)?;
        let inner = registry()
            .build(&archive.algorithm.tag, archive.algorithm.value)
            .map_err(serde::de::Error::custom)?;
        Ok(Algorithm::from_boxed(inner))
    }
}
