//! # pelago
//!
//! An asynchronous runtime for the parallel evolution of populations of
//! candidate solutions.
//!
//! Users pair optimization problems with algorithms operating on
//! populations; the runtime dispatches evolution work onto background
//! worker threads and provides safe concurrent observation, joining,
//! snapshotting and persistence of the live state.
//!
//! ## Features
//!
//! - **Asynchronous islands**: each [`Island`](island::Island) evolves its
//!   population on a dedicated worker thread, one epoch at a time, in
//!   submission order
//! - **Pluggable behaviors**: user-defined islands and batch evaluators are
//!   plain values behind type-erased wrappers
//! - **Thread-safety aware**: user objects declare a
//!   [`ThreadSafety`](thread_safety::ThreadSafety) level that gates the
//!   parallelization strategies
//! - **Batch fitness evaluation**: evaluate whole batches of candidate
//!   solutions through the problem's own batch method or a work-stealing
//!   thread pool
//! - **Persistence**: live islands and evaluators round-trip through tagged
//!   JSON archives
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pelago::prelude::*;
//!
//! fn main() -> pelago::Result<()> {
//!     let problem = Problem::new(MyProblem::default())?;
//!     let island = Island::with_problem(Algorithm::new(MyAlgorithm), problem, 20, 42)?;
//!
//!     // Run four epochs in the background, then join.
//!     for _ in 0..4 {
//!         island.evolve()?;
//!     }
//!     island.wait()?;
//!
//!     println!("best fitness: {:?}", island.population()?.champion_fv());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`island`]: the asynchronous island and the user-defined island contract
//! - [`bfe`]: batch fitness evaluation and its built-in strategies
//! - [`problem`], [`algorithm`], [`population`]: the entities evolved
//! - [`task_queue`]: the per-island FIFO worker
//! - [`thread_safety`]: the concurrency classification of user objects
//! - [`rng`]: the process-global seed source

pub mod algorithm;
pub mod bfe;
pub mod error;
pub mod island;
pub mod population;
pub mod problem;
pub mod rng;
pub mod task_queue;
pub mod thread_safety;

mod serial;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithm::{
        register_algorithm, register_algorithm_as, Algorithm, DynAlgorithm, UserAlgorithm,
    };
    pub use crate::bfe::{
        register_bfe, register_bfe_as, set_default_bfe_dispatcher, BatchEvaluator, Bfe, BfeFn,
        DefaultBfe, DynBfe, MemberBfe, ThreadBfe,
    };
    pub use crate::error::{Error, Result};
    pub use crate::island::{
        register_island, register_island_as, set_island_factory, set_wait_hook, DynIsland,
        Island, LockHandle, ThreadIsland, UserIsland,
    };
    pub use crate::population::{Individual, Population};
    pub use crate::problem::{register_problem, register_problem_as, DynProblem, Problem, UserProblem};
    pub use crate::rng::RandomDevice;
    pub use crate::task_queue::{TaskHandle, TaskQueue};
    pub use crate::thread_safety::ThreadSafety;
}
