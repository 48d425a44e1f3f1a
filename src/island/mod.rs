//! Asynchronous evolution island
//!
//! An island couples a user-defined island, an algorithm and a population,
//! and evolves the population in the background on a dedicated worker
//! thread. Any number of threads may observe a live island; evolution
//! epochs are joined through [`Island::wait`].

mod thread_island;
mod traits;

pub use thread_island::ThreadIsland;
pub use traits::{register_island, register_island_as, DynIsland, LockHandle, UserIsland};

use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::error::{lock, Error, Result};
use crate::population::Population;
use crate::problem::Problem;
use crate::serial::TaggedValue;
use crate::task_queue::{TaskHandle, TaskQueue};

/// Selects the user-defined island when a constructor is not given one.
pub type IslandFactory = dyn Fn(&Algorithm, &Population) -> Box<dyn DynIsland> + Send + Sync;

/// Produces the guard held for the duration of [`Island::wait`].
pub type WaitHook = dyn Fn() -> Box<dyn Any + Send> + Send + Sync;

fn island_factory() -> &'static RwLock<Arc<IslandFactory>> {
    static FACTORY: OnceLock<RwLock<Arc<IslandFactory>>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let default: Arc<IslandFactory> =
            Arc::new(|_: &Algorithm, _: &Population| Box::new(ThreadIsland) as Box<dyn DynIsland>);
        RwLock::new(default)
    })
}

/// Replace the process-global island factory used by the constructors that
/// are not given a user-defined island explicitly.
///
/// Intended to be called once at initialization time, e.g. by a binding
/// layer that prefers a different default island.
pub fn set_island_factory(
    factory: impl Fn(&Algorithm, &Population) -> Box<dyn DynIsland> + Send + Sync + 'static,
) {
    let mut slot = island_factory()
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *slot = Arc::new(factory);
}

fn wait_hook() -> &'static RwLock<Arc<WaitHook>> {
    static HOOK: OnceLock<RwLock<Arc<WaitHook>>> = OnceLock::new();
    HOOK.get_or_init(|| {
        let default: Arc<WaitHook> = Arc::new(|| Box::new(()) as Box<dyn Any + Send>);
        RwLock::new(default)
    })
}

/// Replace the process-global provider of the guard held while waiting.
///
/// The default guard does nothing. A binding layer can install a provider
/// whose guard releases a host-runtime lock for the duration of the wait.
pub fn set_wait_hook(hook: impl Fn() -> Box<dyn Any + Send> + Send + Sync + 'static) {
    let mut slot = wait_hook().write().unwrap_or_else(|e| e.into_inner());
    *slot = Arc::new(hook);
}

/// Nullable observer handle to the aggregate that owns this island.
pub type ArchipelagoRef = Weak<dyn Any + Send + Sync>;

struct IslandData {
    // The holder is accessed concurrently from the worker thread and from
    // observers without a lock of its own; `DynIsland: Sync` carries that
    // obligation into user code.
    inner: Box<dyn DynIsland>,
    algo: Mutex<Algorithm>,
    pop: Mutex<Population>,
    futures: Mutex<Vec<TaskHandle>>,
    archi: Mutex<Option<ArchipelagoRef>>,
    queue: TaskQueue,
}

/// An asynchronously evolving `(user island, algorithm, population)` triple.
///
/// Epochs submitted through [`evolve`](Island::evolve) run in submission
/// order on the island's worker thread. Failures raised inside an epoch are
/// stored and re-raised by the first [`wait`](Island::wait); observation
/// through [`algorithm`](Island::algorithm) and
/// [`population`](Island::population) is safe at any time.
///
/// Dropping an island waits for outstanding epochs, swallowing failures
/// from user code.
pub struct Island {
    data: Arc<IslandData>,
}

impl Island {
    /// Build an island from an algorithm and a population; the user-defined
    /// island is chosen by the process-global factory.
    pub fn new(algo: Algorithm, pop: Population) -> Result<Self> {
        let factory = island_factory()
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let inner = factory(&algo, &pop);
        Self::from_boxed(inner, algo, pop)
    }

    /// Build an island with an explicit user-defined island.
    pub fn with_udi(udi: impl UserIsland, algo: Algorithm, pop: Population) -> Result<Self> {
        Self::from_boxed(Box::new(udi), algo, pop)
    }

    /// Build an island from an algorithm and a freshly seeded random
    /// population of `size` individuals.
    pub fn with_problem(
        algo: Algorithm,
        problem: Problem,
        size: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::new(algo, Population::new(problem, size, seed)?)
    }

    /// As [`with_problem`](Island::with_problem), with an explicit
    /// user-defined island.
    pub fn with_udi_and_problem(
        udi: impl UserIsland,
        algo: Algorithm,
        problem: Problem,
        size: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_udi(udi, algo, Population::new(problem, size, seed)?)
    }

    /// Build an island from an already-erased user island. This is the
    /// entry point for binding layers implementing [`DynIsland`] directly.
    pub fn from_boxed(
        inner: Box<dyn DynIsland>,
        algo: Algorithm,
        pop: Population,
    ) -> Result<Self> {
        Ok(Self {
            data: Arc::new(IslandData {
                inner,
                algo: Mutex::new(algo),
                pop: Mutex::new(pop),
                futures: Mutex::new(Vec::new()),
                archi: Mutex::new(None),
                queue: TaskQueue::new()?,
            }),
        })
    }

    /// Launch one evolution epoch in the background.
    ///
    /// Epochs are queued FIFO; each one hands the algorithm and population
    /// to the user-defined island behind locked handles. Failures inside
    /// the epoch are stored and surface on [`wait`](Island::wait).
    pub fn evolve(&self) -> Result<()> {
        let mut futures = lock(&self.data.futures, "futures")?;
        let data = Arc::clone(&self.data);
        // Either the epoch is queued and tracked, or the error propagates
        // and nothing is tracked.
        let handle = self.data.queue.enqueue(move || {
            {
                let mut algo_handle = LockHandle::acquire(&data.algo, "algorithm")?;
                let mut pop_handle = LockHandle::acquire(&data.pop, "population")?;
                data.inner.run_evolve(&mut algo_handle, &mut pop_handle)?;
            }
            // Migration hand-off site: observe the back-reference with the
            // field locks released. Migration itself lives in the owning
            // aggregate.
            let _archi = lock(&data.archi, "archipelago")?.clone();
            Ok(())
        })?;
        futures.push(handle);
        Ok(())
    }

    /// Block until every epoch submitted so far has completed.
    ///
    /// Re-raises the failure of the earliest failed epoch, if any; the
    /// outcomes of later epochs from the same batch are drained and
    /// discarded. The pending set is empty when this returns, success or
    /// not.
    pub fn wait(&self) -> Result<()> {
        let hook = wait_hook().read().unwrap_or_else(|e| e.into_inner()).clone();
        let _guard = hook();
        let mut futures = lock(&self.data.futures, "futures")?;
        let mut first_failure = None;
        for handle in futures.drain(..) {
            match handle.wait() {
                Ok(()) => {}
                Err(err) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether any submitted epoch has not finished yet. Non-blocking.
    pub fn busy(&self) -> Result<bool> {
        let futures = lock(&self.data.futures, "futures")?;
        for handle in futures.iter() {
            if !handle.is_finished()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A copy of the island's algorithm. Safe while the island is evolving.
    pub fn algorithm(&self) -> Result<Algorithm> {
        Ok(lock(&self.data.algo, "algorithm")?.clone())
    }

    /// A copy of the island's population. Safe while the island is
    /// evolving.
    pub fn population(&self) -> Result<Population> {
        Ok(lock(&self.data.pop, "population")?.clone())
    }

    /// Name of the user-defined island.
    pub fn name(&self) -> String {
        self.data.inner.name()
    }

    /// Extra human-readable detail from the user-defined island.
    pub fn extra_info(&self) -> String {
        self.data.inner.extra_info()
    }

    /// A detached copy: cloned user island, snapshots of algorithm and
    /// population, an empty queue and no archipelago back-reference. Safe
    /// while the source is evolving.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_boxed(
            self.data.inner.clone_boxed(),
            self.algorithm()?,
            self.population()?,
        )
    }

    /// Attach the back-reference to an owning aggregate.
    pub fn set_archipelago(&self, archi: ArchipelagoRef) -> Result<()> {
        *lock(&self.data.archi, "archipelago")? = Some(archi);
        Ok(())
    }

    /// Clear the back-reference to the owning aggregate.
    pub fn detach_archipelago(&self) -> Result<()> {
        *lock(&self.data.archi, "archipelago")? = None;
        Ok(())
    }

    /// Persist the island as `{ user island, algorithm, population }`,
    /// captured through the copy-out getters. Safe while evolving.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let archive = IslandArchive {
            island: TaggedValue {
                tag: self.data.inner.type_tag(),
                value: self.data.inner.to_value()?,
            },
            algorithm: self.algorithm()?,
            population: self.population()?,
        };
        serde_json::to_writer(writer, &archive).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore an island persisted with [`save`](Island::save). The
    /// user-island type must have been registered.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let archive: IslandArchive =
            serde_json::from_reader(reader).map_err(|e| Error::Serialization(e.to_string()))?;
        let inner = traits::registry().build(&archive.island.tag, archive.island.value)?;
        Self::from_boxed(inner, archive.algorithm, archive.population)
    }
}

impl Drop for Island {
    fn drop(&mut self) {
        // Failures from user code are swallowed; a failed synchronization
        // primitive would leave the worker thread loose, so it is fatal.
        if let Err(Error::Synchronization(msg)) = self.wait() {
            panic!("cannot shut down an island: {msg}");
        }
    }
}

impl fmt::Display for Island {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Island name: {}", self.name())?;
        let algorithm = self.algorithm().map_err(|_| fmt::Error)?;
        let population = self.population().map_err(|_| fmt::Error)?;
        writeln!(f, "{algorithm}")?;
        writeln!(f, "{population}")?;
        let extra = self.extra_info();
        if !extra.is_empty() {
            writeln!(f, "Extra info:\n{extra}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct IslandArchive {
    island: TaggedValue,
    algorithm: Algorithm,
    population: Population,
}
