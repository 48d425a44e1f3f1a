//! Built-in batch evaluation strategies
//!
//! Three strategies cover the common cases: delegate to the problem's own
//! batch method, spread the evaluations over a thread pool, or pick between
//! the two automatically.

use std::sync::{Arc, OnceLock, RwLock};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bfe::traits::BatchEvaluator;
use crate::error::{Error, Result};
use crate::problem::Problem;
use crate::thread_safety::ThreadSafety;

/// Evaluator that delegates to the problem's own batch method.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MemberBfe;

impl BatchEvaluator for MemberBfe {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        problem.batch_fitness(dvs)
    }

    fn name(&self) -> String {
        "Member batch fitness evaluator".to_string()
    }

    fn type_tag(&self) -> String {
        "member_bfe".to_string()
    }
}

/// Evaluator that runs the problem's scalar fitness over a work-stealing
/// thread pool.
///
/// A problem declaring `constant` thread safety is shared across the
/// parallel evaluations; one declaring `basic` is copied per worker, and
/// the evaluation count is settled on the original afterwards. Anything
/// weaker is refused.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ThreadBfe;

impl BatchEvaluator for ThreadBfe {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        let nx = problem.nx();
        let nf = problem.nf();
        debug_assert_eq!(dvs.len() % nx, 0);
        let k = dvs.len() / nx;
        let total = k.checked_mul(nf).ok_or_else(|| {
            Error::Overflow(format!(
                "output size of a threaded batch evaluation overflows: {k} vectors times nf = {nf}"
            ))
        })?;

        let fvs: Vec<Vec<f64>> = match problem.thread_safety() {
            ThreadSafety::Constant => dvs
                .par_chunks(nx)
                .map(|dv| problem.fitness(dv))
                .collect::<Result<_, _>>()?,
            ThreadSafety::Basic => {
                let results = dvs
                    .par_chunks(nx)
                    .map_init(|| problem.clone(), |local, dv| local.fitness(dv))
                    .collect::<Result<_, _>>()?;
                // The parallel calls charged their evaluations to per-worker
                // copies; settle the count on the original.
                problem.increment_fevals(k as u64);
                results
            }
            level => {
                return Err(Error::InvalidArgument(format!(
                    "cannot run a threaded batch evaluation on problem '{}': it declares the \
                     '{level}' thread safety level, but at least 'basic' is required",
                    problem.name()
                )))
            }
        };

        let mut out = Vec::with_capacity(total);
        for fv in fvs {
            out.extend(fv);
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "Threaded batch fitness evaluator".to_string()
    }

    fn type_tag(&self) -> String {
        "thread_bfe".to_string()
    }
}

/// Picks a batch evaluation strategy for a problem.
pub type BfeDispatcher = dyn Fn(&Problem, &[f64]) -> Result<Vec<f64>> + Send + Sync;

fn dispatcher() -> &'static RwLock<Arc<BfeDispatcher>> {
    static DISPATCHER: OnceLock<RwLock<Arc<BfeDispatcher>>> = OnceLock::new();
    DISPATCHER.get_or_init(|| {
        let default: Arc<BfeDispatcher> = Arc::new(dispatch);
        RwLock::new(default)
    })
}

// Built-in strategy choice: the problem's own batch method has priority,
// then the threaded fallback for problems that tolerate it.
fn dispatch(problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
    if problem.has_batch_fitness() {
        return MemberBfe.call(problem, dvs);
    }
    if problem.thread_safety().is_at_least(ThreadSafety::Basic) {
        return ThreadBfe.call(problem, dvs);
    }
    Err(Error::InvalidArgument(format!(
        "cannot evaluate fitnesses in batch mode for problem '{}': it implements no batch \
         method and its thread safety level is too weak for the threaded fallback",
        problem.name()
    )))
}

/// Replace the process-global strategy choice used by [`DefaultBfe`].
///
/// Intended to be called once at initialization time.
pub fn set_default_bfe_dispatcher(
    f: impl Fn(&Problem, &[f64]) -> Result<Vec<f64>> + Send + Sync + 'static,
) {
    let mut slot = dispatcher().write().unwrap_or_else(|e| e.into_inner());
    *slot = Arc::new(f);
}

/// Evaluator that defers the strategy choice to the process-global
/// dispatcher.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DefaultBfe;

impl BatchEvaluator for DefaultBfe {
    fn call(&self, problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        let f = dispatcher().read().unwrap_or_else(|e| e.into_inner()).clone();
        f(problem, dvs)
    }

    fn name(&self) -> String {
        "Default batch fitness evaluator".to_string()
    }

    fn type_tag(&self) -> String {
        "default_bfe".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::UserProblem;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Square {
        safety: ThreadSafety,
    }

    impl UserProblem for Square {
        fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![dv[0] * dv[0]])
        }

        fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
            (vec![-10.0], vec![10.0])
        }

        fn thread_safety(&self) -> ThreadSafety {
            self.safety
        }
    }

    fn square(safety: ThreadSafety) -> Problem {
        Problem::new(Square { safety }).unwrap()
    }

    #[test]
    fn test_thread_bfe_with_basic_safety() {
        let p = square(ThreadSafety::Basic);
        let fvs = ThreadBfe.call(&p, &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(fvs, vec![0.0, 1.0, 4.0, 9.0]);
        assert_eq!(p.fevals(), 4);
    }

    #[test]
    fn test_thread_bfe_with_constant_safety() {
        let p = square(ThreadSafety::Constant);
        let fvs = ThreadBfe.call(&p, &[1.0, 2.0]).unwrap();
        assert_eq!(fvs, vec![1.0, 4.0]);
        assert_eq!(p.fevals(), 2);
    }

    #[test]
    fn test_thread_bfe_refuses_weak_safety() {
        let p = square(ThreadSafety::None);
        let err = ThreadBfe.call(&p, &[1.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("Square"));
    }

    #[test]
    fn test_thread_bfe_empty_batch() {
        let p = square(ThreadSafety::Basic);
        let fvs = ThreadBfe.call(&p, &[]).unwrap();
        assert!(fvs.is_empty());
        assert_eq!(p.fevals(), 0);
    }

    #[test]
    fn test_member_bfe_requires_the_member() {
        let p = square(ThreadSafety::Basic);
        let err = MemberBfe.call(&p, &[1.0]).unwrap_err();
        assert!(err.to_string().contains("Square"));
    }

    #[test]
    fn test_default_falls_back_to_threads() {
        let p = square(ThreadSafety::Basic);
        let fvs = DefaultBfe.call(&p, &[2.0, 3.0]).unwrap();
        assert_eq!(fvs, vec![4.0, 9.0]);
    }

    #[test]
    fn test_default_refuses_a_hopeless_problem() {
        let p = square(ThreadSafety::None);
        let err = DefaultBfe.call(&p, &[1.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("Square"));
    }
}
