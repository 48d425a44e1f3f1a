//! End-to-end tests of batch fitness evaluation
//!
//! Covers input/output validation, the three built-in strategies, the
//! strategy selection of the default evaluator and evaluation counting.

use serde::{Deserialize, Serialize};

use pelago::prelude::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Square;

impl UserProblem for Square {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![dv[0] * dv[0]])
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![-10.0], vec![10.0])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Triplet;

impl UserProblem for Triplet {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![dv.iter().sum()])
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0; 3], vec![1.0; 3])
    }
}

/// Scalar fitness is `x²`, but the batch member reports `x² + 1`, so tests
/// can tell which path produced a result.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Batched;

impl UserProblem for Batched {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![dv[0] * dv[0]])
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![-10.0], vec![10.0])
    }

    fn has_batch_fitness(&self) -> bool {
        true
    }

    fn batch_fitness(&self, dvs: &[f64]) -> Result<Vec<f64>> {
        Ok(dvs.iter().map(|x| x * x + 1.0).collect())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Hopeless;

impl UserProblem for Hopeless {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![dv[0]])
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0], vec![1.0])
    }

    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::None
    }
}

/// Counts how many times its scalar fitness runs, to show input validation
/// fires before any user code.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Oversized;

impl UserProblem for Oversized {
    fn fitness(&self, dv: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![dv[0]])
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0], vec![1.0])
    }

    fn nf(&self) -> usize {
        usize::MAX
    }
}

#[test]
fn malformed_batches_are_rejected_before_user_code() {
    let p = Problem::new(Triplet).unwrap();
    let bfe = Bfe::default();
    let err = bfe.call(&p, &[1.0, 2.0, 3.0, 4.0]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(err.to_string().contains("Triplet"));
    assert_eq!(p.fevals(), 0);
}

#[test]
fn default_falls_back_to_the_threaded_strategy() {
    let p = Problem::new(Square).unwrap();
    let bfe = Bfe::default();
    let fvs = bfe.call(&p, &[0.0, 1.0, 2.0, 3.0]).unwrap();
    assert_eq!(fvs, vec![0.0, 1.0, 4.0, 9.0]);
    assert_eq!(p.fevals(), 4);
}

#[test]
fn batch_law_matches_sequential_evaluation() {
    let p = Problem::new(Triplet).unwrap();
    let batch: Vec<f64> = (0..12).map(f64::from).collect();
    let bfe = Bfe::new(ThreadBfe);
    let batched = bfe.call(&p, &batch).unwrap();

    let sequential: Vec<f64> = batch
        .chunks(3)
        .flat_map(|dv| p.fitness(dv).unwrap())
        .collect();
    assert_eq!(batched, sequential);
}

#[test]
fn threaded_strategy_counts_one_evaluation_per_vector() {
    let p = Problem::new(Square).unwrap();
    let bfe = Bfe::new(ThreadBfe);
    bfe.call(&p, &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    assert_eq!(p.fevals(), 5);
    bfe.call(&p, &[6.0]).unwrap();
    assert_eq!(p.fevals(), 6);
}

#[test]
fn default_prefers_the_member_strategy() {
    let p = Problem::new(Batched).unwrap();
    let input = [1.0, 2.0, 3.0];

    let via_default = Bfe::default().call(&p, &input).unwrap();
    let via_member = Bfe::new(MemberBfe).call(&p, &input).unwrap();
    assert_eq!(via_default, via_member);
    assert_eq!(via_default, vec![2.0, 5.0, 10.0]);

    // The threaded path would have used the scalar fitness instead.
    let via_thread = Bfe::new(ThreadBfe).call(&p, &input).unwrap();
    assert_eq!(via_thread, vec![1.0, 4.0, 9.0]);
}

#[test]
fn default_matches_the_threaded_strategy_without_a_member() {
    let p = Problem::new(Square).unwrap();
    let input = [2.0, 4.0];
    let via_default = Bfe::default().call(&p, &input).unwrap();
    let via_thread = Bfe::new(ThreadBfe).call(&p, &input).unwrap();
    assert_eq!(via_default, via_thread);
}

#[test]
fn default_refuses_a_problem_with_no_viable_strategy() {
    let p = Problem::new(Hopeless).unwrap();
    let err = Bfe::default().call(&p, &[0.5]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(err.to_string().contains("Hopeless"));
}

#[test]
fn member_strategy_counts_the_whole_batch() {
    let p = Problem::new(Batched).unwrap();
    Bfe::new(MemberBfe).call(&p, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(p.fevals(), 4);
}

#[test]
fn oversized_outputs_are_an_overflow_error() {
    let p = Problem::new(Oversized).unwrap();
    let err = Bfe::new(ThreadBfe).call(&p, &[0.1, 0.2]).unwrap_err();
    assert!(matches!(err, Error::Overflow(_)));
    assert_eq!(p.fevals(), 0);
}

#[test]
fn empty_batches_are_legal() {
    let p = Problem::new(Square).unwrap();
    assert!(Bfe::default().call(&p, &[]).unwrap().is_empty());
    assert_eq!(p.fevals(), 0);
}

#[test]
fn function_pointers_decay_into_evaluators() {
    fn doubler(problem: &Problem, dvs: &[f64]) -> Result<Vec<f64>> {
        let _ = problem;
        Ok(dvs.iter().map(|x| x * 2.0).collect())
    }

    let p = Problem::new(Square).unwrap();
    let bfe = Bfe::from(doubler as BfeFn);
    let fvs = bfe.call(&p, &[1.0, 2.0]).unwrap();
    assert_eq!(fvs, vec![2.0, 4.0]);
    assert!(bfe.is::<BfeFn>());
    assert!(bfe.extract::<ThreadBfe>().is_none());
}

#[test]
fn bfe_round_trips_through_an_archive() {
    let bfe = Bfe::new(MemberBfe);
    let json = serde_json::to_string(&bfe).unwrap();
    let restored: Bfe = serde_json::from_str(&json).unwrap();
    assert!(restored.is::<MemberBfe>());
    assert_eq!(restored.name(), bfe.name());
    assert_eq!(restored.thread_safety(), bfe.thread_safety());

    let p = Problem::new(Batched).unwrap();
    assert_eq!(restored.call(&p, &[3.0]).unwrap(), vec![10.0]);
}
