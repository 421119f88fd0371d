//! Campaign execution: restart, initial generation, MOEA/D generations.
//!
//! [`CampaignRunner`] drives the whole campaign:
//! restart diagnosis → fill generation 0 → evolve → snapshot → repeat.
//! Every evaluation is archived before the next one starts, and a
//! snapshot is written after every complete generation.

use super::operators::{offspring, tchebycheff};
use super::weights::{generate_weights, neighbourhoods};
use crate::archive::{ArchiveStore, EvaluationRecord};
use crate::config::CampaignConfig;
use crate::error::{CampaignError, Result};
use crate::pareto::{hypervolume, non_dominated_sort};
use crate::pipeline::CandidateEvaluator;
use crate::restart::{CampaignStatus, RestartCoordinator, StartPoint};
use crate::snapshot::{PopulationSnapshot, PopulationSnapshotStore};
use crate::types::{Candidate, Member, ObjectiveVector, Population};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Summary of one completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStats {
    pub generation: u64,
    /// Archive cardinality after the generation.
    pub evaluations: u64,
    /// Hypervolume of the population against the bad-fitness reference.
    pub hypervolume: f64,
    /// Members on the first non-dominated front that beat the reference.
    pub front_size: usize,
}

/// Result of a campaign run.
#[derive(Debug, Clone)]
pub struct CampaignResult {
    /// Restart diagnosis this run started from.
    pub status: CampaignStatus,

    /// Population of the last completed generation. If the run was
    /// cancelled before generation 0 completed, this holds only the
    /// members evaluated so far.
    pub population: Population,

    /// Last completed generation, `None` if generation 0 never completed.
    pub generations: Option<u64>,

    /// Archive cardinality at the end of the run.
    pub evaluations: u64,

    /// Evaluations performed by this run.
    pub new_evaluations: u64,

    /// Whether the run was cancelled externally.
    pub cancelled: bool,

    /// Hypervolume of the starting population and of every generation
    /// completed by this run.
    pub quality_history: Vec<f64>,
}

/// Executes an optimization campaign against a persistent archive.
///
/// # Usage
///
/// ```ignore
/// let config = CampaignConfig::from_toml_file("campaign.toml")?;
/// let mut runner = CampaignRunner::new(config, pipeline)
///     .with_on_generation(|s| println!("gen {}: hv {:.4e}", s.generation, s.hypervolume));
/// let result = runner.run()?;
/// ```
pub struct CampaignRunner<E> {
    config: CampaignConfig,
    evaluator: E,
    on_generation: Option<Box<dyn FnMut(&GenerationStats)>>,
}

impl<E: CandidateEvaluator> CampaignRunner<E> {
    pub fn new(config: CampaignConfig, evaluator: E) -> Self {
        Self {
            config,
            evaluator,
            on_generation: None,
        }
    }

    /// Registers a callback invoked after every completed generation,
    /// including the starting population.
    pub fn with_on_generation(mut self, f: impl FnMut(&GenerationStats) + 'static) -> Self {
        self.on_generation = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Runs (or resumes) the campaign until the generation budget is spent.
    pub fn run(&mut self) -> Result<CampaignResult> {
        self.run_with_cancel(None)
    }

    /// Runs the campaign with an optional cancellation token.
    ///
    /// The flag is checked before every evaluation. An evaluation already
    /// in flight always completes and is archived first.
    pub fn run_with_cancel(&mut self, cancel: Option<Arc<AtomicBool>>) -> Result<CampaignResult> {
        self.config.validate().map_err(CampaignError::Config)?;

        let archive = ArchiveStore::open(&self.config.archive_path)?;
        let snapshots = PopulationSnapshotStore::new(&self.config.snapshot_path);
        let plan = RestartCoordinator::new(&archive, &snapshots, &self.config).plan()?;

        let p = self.config.population_size;
        let weights = generate_weights(
            self.config.moead.weight_generation,
            p,
            self.config.num_objectives(),
            plan.seed,
        )
        .map_err(CampaignError::Config)?;
        let hoods = neighbourhoods(&weights, self.config.moead.neighbours);

        let mut session = Session {
            config: &self.config,
            evaluator: &mut self.evaluator,
            archive,
            snapshots,
            seed: plan.seed,
            cancel,
            new_evaluations: 0,
        };
        let on_generation = &mut self.on_generation;
        let mut quality_history = Vec::new();
        let mut report = |population: &Population, generation: u64, evaluations: u64| {
            let stats =
                generation_stats(population, generation, evaluations, &self.config.bad_fitness);
            info!(
                "generation {}: {} evaluations, hypervolume {:.6e}, {} on the front",
                stats.generation, stats.evaluations, stats.hypervolume, stats.front_size
            );
            quality_history.push(stats.hypervolume);
            if let Some(f) = on_generation.as_mut() {
                f(&stats);
            }
        };

        let pending = plan.pending_snapshot();
        let (mut population, mut generation) = match plan.start {
            StartPoint::InitialGeneration { evaluated } => {
                match session.fill_initial_generation(evaluated)? {
                    Fill::Complete(population) => (population, 0),
                    Fill::Cancelled(members) => {
                        info!("campaign cancelled during generation 0");
                        return Ok(CampaignResult {
                            status: plan.status,
                            population: Population::new(members),
                            generations: None,
                            evaluations: session.archive.len() as u64,
                            new_evaluations: session.new_evaluations,
                            cancelled: true,
                            quality_history,
                        });
                    }
                }
            }
            StartPoint::Generation {
                generation,
                population,
                ..
            } => {
                if let Some(snapshot) = pending {
                    session.snapshots.write(&snapshot)?;
                }
                (population, generation)
            }
        };
        report(&population, generation, session.archive.len() as u64);

        let mut cancelled = false;
        while generation < self.config.max_generations as u64 {
            let next = generation + 1;
            let mut offspring = population.clone();
            if !session.evolve(&mut offspring, next, &weights, &hoods)? {
                info!("campaign cancelled during generation {next}");
                cancelled = true;
                break;
            }
            population = offspring;
            generation = next;
            session.write_snapshot(generation, &population)?;
            report(&population, generation, session.archive.len() as u64);
        }

        Ok(CampaignResult {
            status: plan.status,
            population,
            generations: Some(generation),
            evaluations: session.archive.len() as u64,
            new_evaluations: session.new_evaluations,
            cancelled,
            quality_history,
        })
    }
}

/// Random stream of generation `g`; independent of how the campaign got
/// there, so a resumed run reproduces an uninterrupted one.
fn generation_rng(seed: u64, g: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ g.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn generation_stats(
    population: &Population,
    generation: u64,
    evaluations: u64,
    reference: &[f64],
) -> GenerationStats {
    let objs = population.objectives();
    let feasible: Vec<&ObjectiveVector> = objs
        .iter()
        .filter(|o| o.iter().zip(reference).all(|(v, r)| v < r))
        .collect();
    let front_size = non_dominated_sort(&feasible)
        .fronts
        .first()
        .map_or(0, Vec::len);
    GenerationStats {
        generation,
        evaluations,
        hypervolume: hypervolume(&objs, reference),
        front_size,
    }
}

enum Fill {
    Complete(Population),
    Cancelled(Vec<Member>),
}

/// Mutable state of one `run_with_cancel` call.
struct Session<'c, E> {
    config: &'c CampaignConfig,
    evaluator: &'c mut E,
    archive: ArchiveStore,
    snapshots: PopulationSnapshotStore,
    seed: u64,
    cancel: Option<Arc<AtomicBool>>,
    new_evaluations: u64,
}

impl<E: CandidateEvaluator> Session<'_, E> {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Evaluates the remaining members of generation 0.
    ///
    /// All candidates are drawn from the generation-0 stream up front, so
    /// members replayed from the archive keep their sampled positions.
    fn fill_initial_generation(&mut self, mut members: Vec<Member>) -> Result<Fill> {
        let p = self.config.population_size;
        let mut rng = generation_rng(self.seed, 0);
        let candidates: Vec<Candidate> = (0..p)
            .map(|_| self.config.bounds.sample(&mut rng))
            .collect();

        for x in &candidates[members.len()..] {
            if self.cancelled() {
                return Ok(Fill::Cancelled(members));
            }
            let record = self.evaluate(x)?;
            members.push(record.member());
        }

        let population = Population::new(members);
        self.write_snapshot(0, &population)?;
        Ok(Fill::Complete(population))
    }

    /// Evolves `population` by one generation in place: every subproblem
    /// is visited once, in shuffled order, and gets one offspring.
    ///
    /// Returns `false` if cancelled part-way; `population` then holds a
    /// mix of both generations and is discarded by the caller.
    fn evolve(
        &mut self,
        population: &mut Population,
        generation: u64,
        weights: &[Vec<f64>],
        hoods: &[Vec<usize>],
    ) -> Result<bool> {
        let config = self.config;
        let moead = &config.moead;
        let p = population.len();
        let mut rng = generation_rng(self.seed, generation);
        let mut ideal = ideal_point(population);

        let mut order: Vec<usize> = (0..p).collect();
        order.shuffle(&mut rng);

        for i in order {
            if self.cancelled() {
                return Ok(false);
            }

            let in_hood = !moead.preserve_diversity || rng.random::<f64>() < moead.realb;
            let mut pool: Vec<usize> = if in_hood {
                hoods[i].clone()
            } else {
                (0..p).collect()
            };
            let (r1, r2) = pick_mates(&pool, &mut rng);
            let child = offspring(
                &population.get(i).x,
                &population.get(r1).x,
                &population.get(r2).x,
                &config.bounds,
                moead,
                &mut rng,
            );

            let record = self.evaluate(&child)?;
            for (z, &f) in ideal.iter_mut().zip(&record.objs) {
                *z = z.min(f);
            }

            let limit = if moead.preserve_diversity {
                moead.limit
            } else {
                usize::MAX
            };
            pool.shuffle(&mut rng);
            let mut replaced = 0;
            for j in pool {
                if replaced >= limit {
                    break;
                }
                let current = tchebycheff(&population.get(j).objs, &weights[j], &ideal);
                let candidate = tchebycheff(&record.objs, &weights[j], &ideal);
                if candidate < current {
                    population.replace(j, record.member());
                    replaced += 1;
                }
            }
            debug!("subproblem {i}: offspring replaced {replaced} members");
        }
        Ok(true)
    }

    /// Evaluates `x` with retries and archives the record.
    fn evaluate(&mut self, x: &Candidate) -> Result<EvaluationRecord> {
        let evaluation = self.archive.len() as u64;
        let mut attempt = 0;
        let record = loop {
            match self.evaluator.evaluate(x, evaluation) {
                Ok(record) => break record,
                Err(e @ CampaignError::Infrastructure { .. }) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "evaluation #{evaluation} failed ({e}); retry {attempt} of {}",
                        self.config.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        };

        self.archive.append(&record)?;
        self.new_evaluations += 1;
        if let Some(rejection) = &record.rejection {
            debug!(
                "evaluation #{evaluation} rejected at '{}': {}",
                rejection.stage, rejection.reason
            );
        } else {
            debug!("evaluation #{evaluation}: {:?}", record.objs);
        }
        Ok(record)
    }

    fn write_snapshot(&self, generation: u64, population: &Population) -> Result<()> {
        let snapshot = PopulationSnapshot::new(
            generation,
            self.archive.len() as u64,
            self.seed,
            population,
        );
        self.snapshots.write(&snapshot)
    }
}

/// Component-wise minimum of the population's objectives.
fn ideal_point(population: &Population) -> Vec<f64> {
    let m = population.get(0).objs.len();
    let mut ideal = vec![f64::INFINITY; m];
    for member in population.iter() {
        for (z, &f) in ideal.iter_mut().zip(&member.objs) {
            *z = z.min(f);
        }
    }
    ideal
}

/// Two distinct members of `pool`.
fn pick_mates<R: Rng>(pool: &[usize], rng: &mut R) -> (usize, usize) {
    let a = rng.random_range(0..pool.len());
    let mut b = rng.random_range(0..pool.len() - 1);
    if b >= a {
        b += 1;
    }
    (pool[a], pool[b])
}
