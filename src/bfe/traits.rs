//! User-defined batch evaluator contract

use std::any::Any;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::problem::Problem;
use crate::serial::{short_type_name, Registry};
use crate::thread_safety::ThreadSafety;

use super::strategies::{DefaultBfe, MemberBfe, ThreadBfe};

/// Signature accepted from plain functions as batch evaluators.
pub type BfeFn = fn(&Problem, &[f64]) -> Result<Vec<f64>>;

/// Interface implemented by user-defined batch evaluators.
///
/// Only [`call`](BatchEvaluator::call) is mandatory: it receives a problem
/// and a flat concatenation of decision vectors and returns the flat
/// concatenation of the corresponding fitness vectors, in the same order.
pub trait BatchEvaluator: Clone + Serialize + Send + Sync + 'static {
    /// Evaluate a flat batch of decision vectors against `problem`.
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>>;

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

/// Object-safe form of [`BatchEvaluator`]; the escape hatch for binding
/// layers, implemented for every user evaluator by a blanket impl.
pub trait DynBfe: Send + Sync {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>>;
    fn name(&self) -> String;
    fn extra_info(&self) -> String;
    fn thread_safety(&self) -> ThreadSafety;
    fn type_tag(&self) -> String;
    fn to_value(&self) -> Result<serde_json::Value>;
    fn clone_boxed(&self) -> Box<dyn DynBfe>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: BatchEvaluator> DynBfe for T {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        BatchEvaluator::call(self, problem, dvs)
    }

    fn name(&self) -> String {
        BatchEvaluator::name(self)
    }

    fn extra_info(&self) -> String {
        BatchEvaluator::extra_info(self)
    }

    fn thread_safety(&self) -> ThreadSafety {
        BatchEvaluator::thread_safety(self)
    }

    fn type_tag(&self) -> String {
        BatchEvaluator::type_tag(self)
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn clone_boxed(&self) -> Box<dyn DynBfe> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adapter storing a plain function as a batch evaluator.
///
/// Function values decay to this at the [`Bfe`](super::Bfe) boundary. Such
/// evaluators cannot be persisted.
pub(crate) struct FnEvaluator(pub(crate) BfeFn);

impl DynBfe for FnEvaluator {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        (self.0)(problem, dvs)
    }

    fn name(&self) -> String {
        std::any::type_name::<BfeFn>().to_string()
    }

    fn extra_info(&self) -> String {
        String::new()
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::Basic
    }

    fn type_tag(&self) -> String {
        "function_pointer".to_string()
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        Err(Error::Serialization(
            "a function-pointer batch evaluator cannot be serialized".to_string(),
        ))
    }

    fn clone_boxed(&self) -> Box<dyn DynBfe> {
        Box::new(FnEvaluator(self.0))
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }
}

pub(crate) fn registry() -> &'static Registry<dyn DynBfe> {
    static REGISTRY: OnceLock<Registry<dyn DynBfe>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = Registry::new();
        seed::<ThreadBfe>(&registry, "thread_bfe");
        seed::<MemberBfe>(&registry, "member_bfe");
        seed::<DefaultBfe>(&registry, "default_bfe");
        registry
    })
}

fn seed<T: BatchEvaluator + DeserializeOwned>(registry: &Registry<dyn DynBfe>, tag: &str) {
    registry.insert(tag, |value| {
        let evaluator: T =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Box::new(evaluator) as Box<dyn DynBfe>)
    });
}

/// Register a batch-evaluator type for deserialization under an explicit
/// tag, which must match the type's [`type_tag`](BatchEvaluator::type_tag).
pub fn register_bfe_as<T: BatchEvaluator + DeserializeOwned>(tag: &str) {
    registry().insert(tag, |value| {
        let evaluator: T =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Box::new(evaluator) as Box<dyn DynBfe>)
    });
}

/// Register a batch-evaluator type for deserialization under its default
/// tag.
pub fn register_bfe<T: BatchEvaluator + DeserializeOwned>() {
    register_bfe_as::<T>(std::any::type_name::<T>());
}
