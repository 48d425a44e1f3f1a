//! Built-in thread island
//!
//! The default user-defined island. It runs the evolution directly on the
//! island's worker thread: snapshot the algorithm and the population,
//! release both locks, evolve unlocked, then relock the population to
//! publish the result.

use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};
use crate::island::traits::{LockHandle, UserIsland};
use crate::population::Population;
use crate::thread_safety::ThreadSafety;

/// User-defined island that evolves on the island's own worker thread.
///
/// Requires the algorithm and the population's problem to declare at least
/// the basic thread-safety level, because both are copied while another
/// thread may be observing the originals.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ThreadIsland;

fn ensure_basic(level: ThreadSafety, name: &str, role: &str) -> Result<()> {
    if level.is_at_least(ThreadSafety::Basic) {
        return Ok(());
    }
    Err(Error::InvalidArgument(format!(
        "the thread island requires at least the 'basic' thread safety level, \
         but the {role} '{name}' declares '{level}'"
    )))
}

impl UserIsland for ThreadIsland {
    fn run_evolve(
        &self,
        algo: &mut LockHandle<'_, Algorithm>,
        pop: &mut LockHandle<'_, Population>,
    ) -> Result<()> {
        let algo_snapshot = {
            let algo_ref = algo.get()?;
            ensure_basic(algo_ref.thread_safety(), algo_ref.name(), "algorithm")?;
            let problem = pop.get()?.problem();
            ensure_basic(problem.thread_safety(), problem.name(), "problem")?;
            algo_ref.clone()
        };
        algo.unlock();

        let pop_snapshot = pop.get()?.clone();
        pop.unlock();

        let evolved = algo_snapshot.evolve(&pop_snapshot)?;

        pop.relock()?;
        *pop.get_mut()? = evolved;
        Ok(())
    }

    fn name(&self) -> String {
        "Thread island".to_string()
    }

    fn type_tag(&self) -> String {
        "thread_island".to_string()
    }
}
