//! Collaborator traits of the evaluation pipeline.
//!
//! Domain code plugs into the pipeline through three seams:
//!
//! 1. [`Architect`]: turns a free-variable vector into a design
//! 2. [`AnalysisStage`]: one physics analysis over the running state
//! 3. [`ObjectiveFunction`]: maps the final state to objective values

use crate::archive::EvaluationRecord;
use crate::error::{Result, StageError};
use crate::types::{Candidate, ObjectiveVector};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of a step that may find the design infeasible.
///
/// `Rejected` is an expected result (sleeve stress over the material
/// limit, magnet beyond its temperature rating), not an error. The design
/// is scored with the bad-fitness sentinel and still archived.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Accepted(T),
    Rejected(String),
}

impl<T> StageOutcome<T> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, StageOutcome::Rejected(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Accepted(v) => StageOutcome::Accepted(f(v)),
            StageOutcome::Rejected(reason) => StageOutcome::Rejected(reason),
        }
    }
}

/// Derives a fully elaborated design from a candidate.
///
/// Must be deterministic and free of side effects.
pub trait Architect {
    type Design: Clone + Serialize;

    fn create_design(&self, x: &[f64]) -> Self::Design;
}

/// Per-evaluation context handed to every stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    work_dir: PathBuf,
    evaluation: u64,
}

impl StageContext {
    pub fn new(work_dir: impl Into<PathBuf>, evaluation: u64) -> Self {
        Self {
            work_dir: work_dir.into(),
            evaluation,
        }
    }

    /// Directory owned by this evaluation alone; stages write their
    /// artifacts (solver decks, result files) here.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Zero-based index of this evaluation within the campaign.
    pub fn evaluation(&self) -> u64 {
        self.evaluation
    }
}

/// One analysis in the chain.
///
/// A stage builds a problem from the running state, runs the analysis and
/// folds the results back into a new state. Either of the last two steps
/// may reject the design. A returned [`StageError`] means the analysis
/// could not be carried out at all (I/O failure, solver crash) and aborts
/// the evaluation without scoring it.
///
/// # Implementing
///
/// ```ignore
/// struct Structural { max_stress: f64 }
///
/// impl AnalysisStage<RotorState> for Structural {
///     type Problem = SleeveProblem;
///     type Results = SleeveResults;
///
///     fn name(&self) -> &str { "structural" }
///
///     fn build_problem(&self, s: &RotorState, _: &StageContext) -> Result<SleeveProblem, StageError> {
///         Ok(SleeveProblem::from(s))
///     }
///
///     fn run(&self, p: SleeveProblem, _: &StageContext) -> Result<StageOutcome<SleeveResults>, StageError> {
///         Ok(StageOutcome::Accepted(p.solve()))
///     }
///
///     fn post_process(&self, r: SleeveResults, s: &RotorState) -> Result<StageOutcome<RotorState>, StageError> {
///         if r.stress > self.max_stress {
///             return Ok(StageOutcome::Rejected("sleeve stress exceeds limit".into()));
///         }
///         Ok(StageOutcome::Accepted(s.with_sleeve(r)))
///     }
/// }
/// ```
pub trait AnalysisStage<S> {
    type Problem;
    type Results;

    fn name(&self) -> &str;

    fn build_problem(
        &self,
        state: &S,
        ctx: &StageContext,
    ) -> std::result::Result<Self::Problem, StageError>;

    fn run(
        &self,
        problem: Self::Problem,
        ctx: &StageContext,
    ) -> std::result::Result<StageOutcome<Self::Results>, StageError>;

    fn post_process(
        &self,
        results: Self::Results,
        state: &S,
    ) -> std::result::Result<StageOutcome<S>, StageError>;
}

/// Object-safe view of an [`AnalysisStage`], so stages with different
/// problem and result types can share one pipeline.
pub(crate) trait ErasedStage<S> {
    fn name(&self) -> &str;

    fn apply(
        &self,
        state: &S,
        ctx: &StageContext,
    ) -> std::result::Result<StageOutcome<S>, StageError>;
}

impl<S, T: AnalysisStage<S>> ErasedStage<S> for T {
    fn name(&self) -> &str {
        AnalysisStage::name(self)
    }

    fn apply(
        &self,
        state: &S,
        ctx: &StageContext,
    ) -> std::result::Result<StageOutcome<S>, StageError> {
        let problem = self.build_problem(state, ctx)?;
        match self.run(problem, ctx)? {
            StageOutcome::Accepted(results) => self.post_process(results, state),
            StageOutcome::Rejected(reason) => Ok(StageOutcome::Rejected(reason)),
        }
    }
}

/// Maps the final pipeline state to objective values (all minimized).
pub trait ObjectiveFunction<S> {
    fn objectives(&self, state: &S) -> StageOutcome<ObjectiveVector>;
}

impl<S, F> ObjectiveFunction<S> for F
where
    F: Fn(&S) -> StageOutcome<ObjectiveVector>,
{
    fn objectives(&self, state: &S) -> StageOutcome<ObjectiveVector> {
        self(state)
    }
}

/// Scores one candidate and produces its archive record.
///
/// `evaluation` is the zero-based archive position the record will take.
/// Implemented by [`EvaluationPipeline`](super::EvaluationPipeline); the
/// campaign runner only depends on this trait.
pub trait CandidateEvaluator {
    fn evaluate(&mut self, x: &Candidate, evaluation: u64) -> Result<EvaluationRecord>;
}

impl<F> CandidateEvaluator for F
where
    F: FnMut(&Candidate, u64) -> Result<EvaluationRecord>,
{
    fn evaluate(&mut self, x: &Candidate, evaluation: u64) -> Result<EvaluationRecord> {
        self(x, evaluation)
    }
}
