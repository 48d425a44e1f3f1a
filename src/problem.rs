//! Problem abstraction
//!
//! A problem maps decision vectors to fitness vectors. User problems are
//! plain values implementing [`UserProblem`]; the runtime stores them behind
//! the type-erased [`Problem`] wrapper, which validates inputs and outputs,
//! counts fitness evaluations, and carries the serialization tag.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::serial::{short_type_name, Registry, TaggedValue};
use crate::thread_safety::ThreadSafety;

/// Interface implemented by user-defined problems.
///
/// Only [`fitness`](UserProblem::fitness), [`bounds`](UserProblem::bounds)
/// and [`nf`](UserProblem::nf) are mandatory; the remaining methods have
/// defaults that the wrapper picks up when a problem does not provide them.
pub trait UserProblem: Clone + Serialize + Send + Sync + 'static {
    /// Evaluate one decision vector of length `nx`.
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>>;

    /// Box bounds of the decision space. The length of the bound vectors is
    /// the decision-vector dimension `nx`.
    fn bounds(&self) -> (Vec<f64>, Vec<f64>);

    /// Fitness-vector dimension.
    fn nf(&self) -> usize {
        1
    }

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

    /// Whether [`batch_fitness`](UserProblem::batch_fitness) is implemented.
    fn has_batch_fitness(&self) -> bool {
        false
    }

    /// Evaluate a flat batch of decision vectors in one call.
    fn batch_fitness(&self, dvs: &[f64]) -> Result<Vec<f64>> {
        let _ = dvs;
        Err(Error::InvalidArgument(format!(
            "problem '{}' does not implement batch fitness evaluation",
            self.name()
        )))
    }

    /// Stable tag identifying the concrete type in archives.
    fn type_tag(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Object-safe form of [`UserProblem`], implemented for every user problem
/// by a blanket impl. Binding layers that cannot satisfy the value bounds of
/// [`UserProblem`] may implement this trait directly.
pub trait DynProblem: Send + Sync {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>>;
    fn bounds(&self) -> (Vec<f64>, Vec<f64>);
    fn nf(&self) -> usize;
    fn name(&self) -> String;
    fn extra_info(&self) -> String;
    fn thread_safety(&self) -> ThreadSafety;
    fn has_batch_fitness(&self) -> bool;
    fn batch_fitness(&self, dvs: &[f64]) -> Result<Vec<f64>>;
    fn type_tag(&self) -> String;
    fn to_value(&self) -> Result<serde_json::Value>;
    fn clone_boxed(&self) -> Box<dyn DynProblem>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: UserProblem> DynProblem for T {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        UserProblem::fitness(self, dv)
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        UserProblem::bounds(self)
    }

    fn nf(&self) -> usize {
        UserProblem::nf(self)
    }

    fn name(&self) -> String {
        UserProblem::name(self)
    }

    fn extra_info(&self) -> String {
        UserProblem::extra_info(self)
    }

    fn thread_safety(&self) -> ThreadSafety {
        UserProblem::thread_safety(self)
    }

    fn has_batch_fitness(&self) -> bool {
        UserProblem::has_batch_fitness(self)
    }

    fn batch_fitness(&self, dvs: &[f64]) -> Result<Vec<f64>> {
        UserProblem::batch_fitness(self, dvs)
    }

    fn type_tag(&self) -> String {
        UserProblem::type_tag(self)
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn clone_boxed(&self) -> Box<dyn DynProblem> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn registry() -> &'static Registry<dyn DynProblem> {
    static REGISTRY: OnceLock<Registry<dyn DynProblem>> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Register a problem type for deserialization under an explicit tag.
///
/// The tag must match the value returned by the type's
/// [`type_tag`](UserProblem::type_tag).
pub fn register_problem_as<T: UserProblem + DeserializeOwned>(tag: &str) {
    registry().insert(tag, |value| {
        let problem: T =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Box::new(problem) as Box<dyn DynProblem>)
    });
}

/// Register a problem type for deserialization under its default tag.
pub fn register_problem<T: UserProblem + DeserializeOwned>() {
    register_problem_as::<T>(std::any::type_name::<T>());
}

/// Type-erased problem wrapper.
///
/// Validates every fitness call against the cached dimensions, counts
/// evaluations, and exposes the optional methods of the stored value with
/// their defaults filled in.
pub struct Problem {
    inner: Box<dyn DynProblem>,
    nx: usize,
    nf: usize,
    name: String,
    thread_safety: ThreadSafety,
    has_batch_fitness: bool,
    fevals: AtomicU64,
}

impl Problem {
    /// Wrap a user problem.
    pub fn new(problem: impl UserProblem) -> Result<Self> {
        Self::from_boxed(Box::new(problem))
    }

    /// Wrap an already-erased problem.
    pub fn from_boxed(inner: Box<dyn DynProblem>) -> Result<Self> {
        let (lb, ub) = inner.bounds();
        let name = inner.name();
        if lb.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "problem '{name}' declares an empty decision space"
            )));
        }
        if lb.len() != ub.len() {
            return Err(Error::InvalidArgument(format!(
                "problem '{name}' declares mismatched bounds: {} lower vs {} upper",
                lb.len(),
                ub.len()
            )));
        }
        for (i, (lo, hi)) in lb.iter().zip(ub.iter()).enumerate() {
            if !(lo <= hi) {
                return Err(Error::InvalidArgument(format!(
                    "problem '{name}' declares an invalid bound at index {i}: {lo} > {hi}"
                )));
            }
        }
        let nf = inner.nf();
        if nf == 0 {
            return Err(Error::InvalidArgument(format!(
                "problem '{name}' declares a zero-dimensional fitness"
            )));
        }
        Ok(Self {
            nx: lb.len(),
            nf,
            name,
            thread_safety: inner.thread_safety(),
            has_batch_fitness: inner.has_batch_fitness(),
            fevals: AtomicU64::new(0),
            inner,
        })
    }

    /// Decision-vector dimension.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Fitness-vector dimension.
    pub fn nf(&self) -> usize {
        self.nf
    }

    /// Problem name, cached at construction.
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

    /// Whether the stored value implements batch fitness evaluation.
    pub fn has_batch_fitness(&self) -> bool {
        self.has_batch_fitness
    }

    /// Box bounds of the decision space.
    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.inner.bounds()
    }

    /// Number of fitness evaluations charged to this problem instance.
    pub fn fevals(&self) -> u64 {
        self.fevals.load(Ordering::Relaxed)
    }

    /// Add `n` to the fitness-evaluation counter.
    ///
    /// Parallel evaluators that work on copies of the problem use this to
    /// settle the count on the original.
    pub fn increment_fevals(&self, n: u64) {
        self.fevals.fetch_add(n, Ordering::Relaxed);
    }

    /// Evaluate one decision vector, validating dimensions on both sides.
    pub fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        if dv.len() != self.nx {
            return Err(Error::InvalidArgument(format!(
                "problem '{}' expects decision vectors of length {}, got {}",
                self.name,
                self.nx,
                dv.len()
            )));
        }
        let fv = self.inner.fitness(dv)?;
        if fv.len() != self.nf {
            return Err(Error::InvalidArgument(format!(
                "problem '{}' produced a fitness vector of length {}, expected {}",
                self.name,
                fv.len(),
                self.nf
            )));
        }
        self.fevals.fetch_add(1, Ordering::Relaxed);
        Ok(fv)
    }

    /// Evaluate a flat batch of decision vectors through the problem's own
    /// batch method.
    pub fn batch_fitness(&self, dvs: &[f64]) -> Result<Vec<f64>> {
        if !self.has_batch_fitness {
            return Err(Error::InvalidArgument(format!(
                "problem '{}' does not implement batch fitness evaluation",
                self.name
            )));
        }
        let k = check_batch_input(self, dvs)?;
        let fvs = self.inner.batch_fitness(dvs)?;
        check_batch_output(self, k, &fvs)?;
        self.fevals.fetch_add(k as u64, Ordering::Relaxed);
        Ok(fvs)
    }

    /// Downcast to the concrete stored type.
    pub fn extract<T: UserProblem>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Whether the stored value is of type `T`.
    pub fn is<T: UserProblem>(&self) -> bool {
        self.extract::<T>().is_some()
    }

    pub(crate) fn type_tag(&self) -> String {
        self.inner.type_tag()
    }

    pub(crate) fn to_value(&self) -> Result<serde_json::Value> {
        self.inner.to_value()
    }
}

/// Validate a flat batch against the problem dimensions, returning the
/// number of decision vectors it holds.
pub(crate) fn check_batch_input(problem: &Problem, dvs: &[f64]) -> Result<usize> {
    let nx = problem.nx();
    if dvs.len() % nx != 0 {
        return Err(Error::InvalidArgument(format!(
            "batch of {} values is not a whole number of decision vectors for problem '{}' (nx = {})",
            dvs.len(),
            problem.name(),
            nx
        )));
    }
    Ok(dvs.len() / nx)
}

/// Validate the flat output of a batch evaluation of `k` decision vectors.
pub(crate) fn check_batch_output(problem: &Problem, k: usize, fvs: &[f64]) -> Result<()> {
    let expected = k.checked_mul(problem.nf()).ok_or_else(|| {
        Error::Overflow(format!(
            "output size of a batch evaluation overflows: {k} vectors times nf = {}",
            problem.nf()
        ))
    })?;
    if fvs.len() != expected {
        return Err(Error::InvalidArgument(format!(
            "batch evaluation for problem '{}' produced {} fitness values, expected {} ({} vectors times nf = {})",
            problem.name(),
            fvs.len(),
            expected,
            k,
            problem.nf()
        )));
    }
    if let Some(bad) = fvs.iter().find(|v| !v.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "batch evaluation for problem '{}' produced a non-finite fitness value {bad}",
            problem.name()
        )));
    }
    Ok(())
}

impl Clone for Problem {
    fn clone(&self) -> Self {
        // Deep copy of the stored value; the evaluation counter carries the
        // current count but advances independently afterwards.
        Self {
            inner: self.inner.clone_boxed(),
            nx: self.nx,
            nf: self.nf,
            name: self.name.clone(),
            thread_safety: self.thread_safety,
            has_batch_fitness: self.has_batch_fitness,
            fevals: AtomicU64::new(self.fevals()),
        }
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("name", &self.name)
            .field("nx", &self.nx)
            .field("nf", &self.nf)
            .field("thread_safety", &self.thread_safety)
            .field("fevals", &self.fevals())
            .finish()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem name: {}", self.name)?;
        writeln!(f, "\tDecision dimension: {}", self.nx)?;
        writeln!(f, "\tFitness dimension: {}", self.nf)?;
        writeln!(f, "\tThread safety: {}", self.thread_safety)?;
        writeln!(f, "\tFitness evaluations: {}", self.fevals())?;
        let extra = self.extra_info();
        if !extra.is_empty() {
            writeln!(f, "Extra info:\n{extra}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ProblemArchive {
    problem: TaggedValue,
    fevals: u64,
}

impl Serialize for Problem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let archive = ProblemArchive {
            problem: TaggedValue {
                tag: self.type_tag(),
                value: self.to_value().map_err(serde::ser::Error::custom)?,
            },
            fevals: self.fevals(),
        };
        archive.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Problem {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let archive = ProblemArchive::deserialize(deserializer)?;
        let inner = registry()
            .build(&archive.problem.tag, archive.problem.value)
            .map_err(serde::de::Error::custom)?;
        let problem = Problem::from_boxed(inner).map_err(serde::de::Error::custom)?;
        problem.increment_fevals(archive.fevals);
        Ok(problem)
    }
}
