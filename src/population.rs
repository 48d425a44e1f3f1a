//! Population type
//!
//! A population binds a set of candidate solutions to the problem they were
//! evaluated against. The island treats it as a pure value, replaced
//! wholesale after each evolution epoch.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::problem::Problem;
use crate::rng::RandomDevice;

/// One candidate solution with its evaluated fitness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Decision vector of length `nx`.
    pub decision: Vec<f64>,
    /// Fitness vector of length `nf`.
    pub fitness: Vec<f64>,
}

/// A population of evaluated candidate solutions bound to a problem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Population {
    problem: Problem,
    individuals: Vec<Individual>,
}

impl Population {
    /// Create a population of `size` random individuals drawn uniformly
    /// within the problem bounds, using an explicit seed.
    pub fn new(problem: Problem, size: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (lb, ub) = problem.bounds();
        let mut pop = Self::empty(problem);
        for _ in 0..size {
            let dv: Vec<f64> = lb
                .iter()
                .zip(ub.iter())
                .map(|(&lo, &hi)| rng.gen_range(lo..=hi))
                .collect();
            pop.push(dv)?;
        }
        Ok(pop)
    }

    /// Create a random population seeded from the process-global device.
    pub fn random(problem: Problem, size: usize) -> Result<Self> {
        Self::new(problem, size, RandomDevice::next())
    }

    /// Create an empty population bound to `problem`.
    pub fn empty(problem: Problem) -> Self {
        Self {
            problem,
            individuals: Vec::new(),
        }
    }

    /// Evaluate a decision vector and append the resulting individual.
    pub fn push(&mut self, decision: Vec<f64>) -> Result<()> {
        let fitness = self.problem.fitness(&decision)?;
        self.individuals.push(Individual { decision, fitness });
        Ok(())
    }

    /// Append an individual whose fitness is already known, without
    /// charging an evaluation to the problem.
    pub fn push_evaluated(&mut self, decision: Vec<f64>, fitness: Vec<f64>) -> Result<()> {
        if decision.len() != self.problem.nx() {
            return Err(Error::InvalidArgument(format!(
                "decision vector of length {} does not match problem '{}' (nx = {})",
                decision.len(),
                self.problem.name(),
                self.problem.nx()
            )));
        }
        if fitness.len() != self.problem.nf() {
            return Err(Error::InvalidArgument(format!(
                "fitness vector of length {} does not match problem '{}' (nf = {})",
                fitness.len(),
                self.problem.name(),
                self.problem.nf()
            )));
        }
        self.individuals.push(Individual { decision, fitness });
        Ok(())
    }

    /// The problem this population is bound to.
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Number of individuals.
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// Whether the population holds no individuals.
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// The individuals, in insertion order.
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Iterate over the individuals.
    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter()
    }

    /// The best individual by first fitness component (minimization).
    pub fn champion(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .min_by(|a, b| a.fitness[0].total_cmp(&b.fitness[0]))
    }

    /// Decision vector of the champion.
    pub fn champion_dv(&self) -> Option<Vec<f64>> {
        self.champion().map(|ind| ind.decision.clone())
    }

    /// Fitness vector of the champion.
    pub fn champion_fv(&self) -> Option<Vec<f64>> {
        self.champion().map(|ind| ind.fitness.clone())
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem name: {}", self.problem.name())?;
        writeln!(f, "Population size: {}", self.len())?;
        if let Some(champion) = self.champion() {
            writeln!(f, "Champion fitness: {:?}", champion.fitness)?;
        }
        Ok(())
    }
}
