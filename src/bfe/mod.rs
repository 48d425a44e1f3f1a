//! Batch fitness evaluation
//!
//! A batch fitness evaluator (BFE) maps a flat concatenation of decision
//! vectors to the flat concatenation of their fitness vectors. The
//! type-erased [`Bfe`] wrapper validates the batch on both sides of the
//! call and caches the evaluator's name and thread-safety level.

mod strategies;
mod traits;

pub use strategies::{set_default_bfe_dispatcher, BfeDispatcher, DefaultBfe, MemberBfe, ThreadBfe};
pub use traits::{register_bfe, register_bfe_as, BatchEvaluator, BfeFn, DynBfe};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::problem::{check_batch_input, check_batch_output, Problem};
use crate::serial::TaggedValue;
use crate::thread_safety::ThreadSafety;

use traits::FnEvaluator;

/// Type-erased batch fitness evaluator.
///
/// The name and thread-safety level of the stored evaluator are captured at
/// construction and never re-queried.
pub struct Bfe {
    inner: Box<dyn DynBfe>,
    name: String,
    thread_safety: ThreadSafety,
}

impl Bfe {
    /// Wrap a user evaluator.
    pub fn new(evaluator: impl BatchEvaluator) -> Self {
        Self::from_boxed(Box::new(evaluator))
    }

    /// Wrap an already-erased evaluator. This is the entry point for
    /// binding layers implementing [`DynBfe`] directly.
    pub fn from_boxed(inner: Box<dyn DynBfe>) -> Self {
        Self {
            name: inner.name(),
            thread_safety: inner.thread_safety(),
            inner,
        }
    }

    /// Evaluate a flat batch of decision vectors against `problem`.
    ///
    /// The input is validated before any user code runs: its length must be
    /// a whole number of decision vectors (an empty batch is legal). The
    /// output must hold one finite fitness vector per input vector.
    pub fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        let k = check_batch_input(problem, dvs)?;
        let fvs = self.inner.call(problem, dvs)?;
        check_batch_output(problem, k, &fvs)?;
        Ok(fvs)
    }

    /// Evaluator name, cached at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra human-readable detail from the stored evaluator.
    pub fn extra_info(&self) -> String {
        self.inner.extra_info()
    }

    /// Declared thread-safety level, cached at construction.
    pub fn thread_safety(&self) -> ThreadSafety {
        self.thread_safety
    }

    /// Downcast to the concrete stored type. For an evaluator built from a
    /// plain function, the stored type is [`BfeFn`].
    pub fn extract<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Whether the stored evaluator is of type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.extract::<T>().is_some()
    }
}

impl Default for Bfe {
    fn default() -> Self {
        Self::new(DefaultBfe)
    }
}

impl From<BfeFn> for Bfe {
    fn from(f: BfeFn) -> Self {
        Self::from_boxed(Box::new(FnEvaluator(f)))
    }
}

impl Clone for Bfe {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            name: self.name.clone(),
            thread_safety: self.thread_safety,
        }
    }
}

impl fmt::Debug for Bfe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bfe")
            .field("name", &self.name)
            .field("thread_safety", &self.thread_safety)
            .finish()
    }
}

impl fmt::Display for Bfe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BFE name: {}", self.name)?;
        writeln!(f, "\tThread safety: {}", self.thread_safety)?;
        let extra = self.extra_info();
        if !extra.is_empty() {
            writeln!(f, "Extra info:\n{extra}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct BfeArchive {
    evaluator: TaggedValue,
    name: String,
    thread_safety: ThreadSafety,
}

impl Serialize for Bfe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let archive = BfeArchive {
            evaluator: TaggedValue {
                tag: self.inner.type_tag(),
                value: self.inner.to_value().map_err(serde::ser::Error::custom)?,
            },
            name: self.name.clone(),
            thread_safety: self.thread_safety,
        };
        archive.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bfe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let archive = BfeArchive::deserialize(deserializer)?;
        let inner = traits::registry()
            .build(&archive.evaluator.tag, archive.evaluator.value)
            .map_err(serde::de::Error::custom)?;
        Ok(Self {
            inner,
            name: archive.name,
            thread_safety: archive.thread_safety,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::problem::UserProblem;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Cube;

    impl UserProblem for Cube {
        fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![dv[0] * dv[0] * dv[0]])
        }

        fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![-2.0], vec![2.0])
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Wide;

    impl UserProblem for Wide {
        fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![dv.iter().sum()])
        }

        fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![0.0; 3], vec![1.0; 3])
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Lying;

    impl BatchEvaluator for Lying {
        fn call(&self, _problem: &Problem, _dvs: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![1.0, 2.0, 3.0, 4.0, 5.0])
        }

        fn thread_safety(&self) -> ThreadSafety {
            ThreadSafety::Constant
        }
    }

    #[test]
    fn test_input_is_validated_before_user_code() {
        let p = Problem::new(Wide).unwrap();
        let bfe = Bfe::default();
        let err = bfe.call(&p, &[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("4"));
        assert_eq!(p.fevals(), 0);
    }

    #[test]
    fn test_output_length_is_validated() {
        let p = Problem::new(Cube).unwrap();
        let bfe = Bfe::new(Lying);
        let err = bfe.call(&p, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_cached_name_and_safety() {
        let bfe = Bfe::new(Lying);
        assert_eq!(bfe.name(), "Lying");
        assert_eq!(bfe.thread_safety(), ThreadSafety::Constant);
    }

    #[test]
    fn test_default_bfe_evaluates() {
        let p = Problem::new(Cube).unwrap();
        let bfe = Bfe::default();
        let fvs = bfe.call(&p, &[1.0, 2.0, -2.0]).unwrap();
        assert_eq!(fvs, vec![1.0, 8.0, -8.0]);
        assert_eq!(p.fevals(), 3);
    }

    #[test]
    fn test_empty_batch_is_legal() {
        let p = Problem::new(Cube).unwrap();
        let bfe = Bfe::default();
        assert!(bfe.call(&p, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_function_pointer_evaluator() {
        fn pass_through(problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
            BatchEvaluator::call(&ThreadBfe, problem, dvs)
        }

        let p = Problem::new(Cube).unwrap();
        let bfe = Bfe::from(pass_through as BfeFn);
        let fvs = bfe.call(&p, &[2.0]).unwrap();
        assert_eq!(fvs, vec![8.0]);
        assert!(bfe.is::<BfeFn>());
    }

    #[test]
    fn test_extract_and_is() {
        let bfe = Bfe::new(ThreadBfe);
        assert!(bfe.is::<ThreadBfe>());
        assert!(!bfe.is::<MemberBfe>());
        assert!(bfe.extract::<ThreadBfe>().is_some());
    }

    #[test]
    fn test_serde_round_trip_keeps_the_cached_fields() {
        let bfe = Bfe::new(ThreadBfe);
        let json = serde_json::to_string(&bfe).unwrap();
        let back: Bfe = serde_json::from_str(&json).unwrap();
        assert!(back.is::<ThreadBfe>());
        assert_eq!(back.name(), "Threaded batch fitness evaluator");
        assert_eq!(back.thread_safety(), ThreadSafety::Basic);
    }
}
