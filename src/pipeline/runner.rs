//! Chained-analysis evaluation of a single candidate.

use super::types::{
    AnalysisStage, Architect, CandidateEvaluator, ErasedStage, ObjectiveFunction, StageContext,
    StageOutcome,
};
use crate::archive::{EvaluationRecord, Rejection, StageResult};
use crate::error::{CampaignError, Result, StageError};
use crate::types::{Candidate, ObjectiveVector};
use log::debug;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ARCHITECT_STAGE: &str = "architect";
const WORKSPACE_STAGE: &str = "workspace";
const OBJECTIVE_STAGE: &str = "objectives";

/// Runs a candidate through an architect, an ordered list of analysis
/// stages and an objective function.
///
/// The running state `S` starts as `S::from(design)` and each stage
/// replaces it. A rejection anywhere yields the bad-fitness sentinel; a
/// [`StageError`] becomes [`CampaignError::Infrastructure`] and nothing is
/// scored.
///
/// # Examples
///
/// ```ignore
/// let pipeline = EvaluationPipeline::new(architect, objectives, vec![1e9; 3], "evaluations")
///     .with_stage(Structural::default())
///     .with_stage(Electromagnetic::new(solver))
///     .with_stage(Thermal::default());
/// ```
pub struct EvaluationPipeline<A, S, O> {
    architect: A,
    stages: Vec<Box<dyn ErasedStage<S>>>,
    objectives: O,
    bad_fitness: ObjectiveVector,
    work_dir: PathBuf,
}

impl<A, S, O> EvaluationPipeline<A, S, O>
where
    A: Architect,
    S: From<A::Design> + Serialize,
    O: ObjectiveFunction<S>,
{
    /// Creates a pipeline with no stages.
    ///
    /// Evaluation `k` gets the private directory `work_dir/eval_{k:06}`.
    pub fn new(
        architect: A,
        objectives: O,
        bad_fitness: ObjectiveVector,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            architect,
            stages: Vec::new(),
            objectives,
            bad_fitness,
            work_dir: work_dir.into(),
        }
    }

    /// Appends a stage; stages run in insertion order.
    pub fn with_stage<T: AnalysisStage<S> + 'static>(mut self, stage: T) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn bad_fitness(&self) -> &[f64] {
        &self.bad_fitness
    }

    /// Working directory reserved for evaluation number `evaluation`.
    pub fn evaluation_dir(&self, evaluation: u64) -> PathBuf {
        self.work_dir.join(format!("eval_{evaluation:06}"))
    }

    fn run_pipeline(&self, x: &Candidate, evaluation: u64) -> Result<EvaluationRecord> {
        let infra = |stage: &str, source: StageError| CampaignError::Infrastructure {
            stage: stage.to_string(),
            evaluation,
            source,
        };

        let design = self.architect.create_design(x);
        let design_json = serde_json::to_value(&design)
            .map_err(|e| infra(ARCHITECT_STAGE, StageError::Serialization(e)))?;

        let dir = self.evaluation_dir(evaluation);
        prepare_dir(&dir).map_err(|e| infra(WORKSPACE_STAGE, StageError::Io(e)))?;
        let ctx = StageContext::new(dir, evaluation);

        let mut record = EvaluationRecord {
            x: x.clone(),
            design: design_json,
            full_results: Vec::with_capacity(self.stages.len()),
            objs: self.bad_fitness.clone(),
            rejection: None,
        };

        let mut state = S::from(design);
        for stage in &self.stages {
            let name = stage.name();
            match stage.apply(&state, &ctx).map_err(|e| infra(name, e))? {
                StageOutcome::Accepted(next) => {
                    let snapshot = serde_json::to_value(&next)
                        .map_err(|e| infra(name, StageError::Serialization(e)))?;
                    record.full_results.push(StageResult {
                        stage: name.to_string(),
                        state: snapshot,
                    });
                    state = next;
                }
                StageOutcome::Rejected(reason) => {
                    return Ok(self.rejected(record, name, reason));
                }
            }
        }

        match self.objectives.objectives(&state) {
            StageOutcome::Accepted(objs) => {
                if objs.len() != self.bad_fitness.len() {
                    return Err(infra(
                        OBJECTIVE_STAGE,
                        StageError::Tool(format!(
                            "objective function returned {} values, expected {}",
                            objs.len(),
                            self.bad_fitness.len()
                        )),
                    ));
                }
                if objs.iter().any(|v| !v.is_finite()) {
                    let reason = format!("non-finite objective values {objs:?}");
                    return Ok(self.rejected(record, OBJECTIVE_STAGE, reason));
                }
                record.objs = objs;
                Ok(record)
            }
            StageOutcome::Rejected(reason) => Ok(self.rejected(record, OBJECTIVE_STAGE, reason)),
        }
    }

    fn rejected(&self, mut record: EvaluationRecord, stage: &str, reason: String) -> EvaluationRecord {
        debug!("design rejected at stage '{stage}': {reason}");
        record.objs = self.bad_fitness.clone();
        record.rejection = Some(Rejection {
            stage: stage.to_string(),
            reason,
        });
        record
    }
}

impl<A, S, O> CandidateEvaluator for EvaluationPipeline<A, S, O>
where
    A: Architect,
    S: From<A::Design> + Serialize,
    O: ObjectiveFunction<S>,
{
    fn evaluate(&mut self, x: &Candidate, evaluation: u64) -> Result<EvaluationRecord> {
        self.run_pipeline(x, evaluation)
    }
}

/// Gives the evaluation an empty directory. Leftovers from an evaluation
/// that crashed before being archived are removed.
fn prepare_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("cleared stale evaluation directory '{}'", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    const SENTINEL: [f64; 3] = [1e9, 1e9, 1e9];

    #[derive(Clone, Serialize)]
    struct Rotor {
        radius: f64,
        sleeve: f64,
    }

    struct RotorArchitect;

    impl Architect for RotorArchitect {
        type Design = Rotor;

        fn create_design(&self, x: &[f64]) -> Rotor {
            Rotor {
                radius: x[0],
                sleeve: x[1],
            }
        }
    }

    #[derive(Clone, Serialize)]
    struct State {
        radius: f64,
        sleeve: f64,
        stress: Option<f64>,
        loss: Option<f64>,
    }

    impl From<Rotor> for State {
        fn from(r: Rotor) -> Self {
            State {
                radius: r.radius,
                sleeve: r.sleeve,
                stress: None,
                loss: None,
            }
        }
    }

    struct Sleeve {
        limit: f64,
    }

    impl AnalysisStage<State> for Sleeve {
        type Problem = (f64, f64);
        type Results = f64;

        fn name(&self) -> &str {
            "structural"
        }

        fn build_problem(&self, s: &State, _: &StageContext) -> std::result::Result<(f64, f64), StageError> {
            Ok((s.radius, s.sleeve))
        }

        fn run(
            &self,
            (r, t): (f64, f64),
            _: &StageContext,
        ) -> std::result::Result<StageOutcome<f64>, StageError> {
            Ok(StageOutcome::Accepted(r / t))
        }

        fn post_process(&self, stress: f64, s: &State) -> std::result::Result<StageOutcome<State>, StageError> {
            if stress > self.limit {
                return Ok(StageOutcome::Rejected(format!(
                    "sleeve stress {stress} exceeds {}",
                    self.limit
                )));
            }
            Ok(StageOutcome::Accepted(State {
                stress: Some(stress),
                ..s.clone()
            }))
        }
    }

    /// Writes an artifact into its directory and counts its runs.
    struct Losses {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl AnalysisStage<State> for Losses {
        type Problem = f64;
        type Results = f64;

        fn name(&self) -> &str {
            "losses"
        }

        fn build_problem(&self, s: &State, ctx: &StageContext) -> std::result::Result<f64, StageError> {
            fs::write(ctx.work_dir().join("deck.txt"), format!("{}", s.radius))?;
            Ok(s.radius)
        }

        fn run(&self, r: f64, _: &StageContext) -> std::result::Result<StageOutcome<f64>, StageError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(StageError::Tool("solver exited with status 3".into()));
            }
            Ok(StageOutcome::Accepted(r * r))
        }

        fn post_process(&self, loss: f64, s: &State) -> std::result::Result<StageOutcome<State>, StageError> {
            Ok(StageOutcome::Accepted(State {
                loss: Some(loss),
                ..s.clone()
            }))
        }
    }

    fn objectives(s: &State) -> StageOutcome<ObjectiveVector> {
        match (s.stress, s.loss) {
            (Some(stress), Some(loss)) => StageOutcome::Accepted(vec![-s.radius, loss, stress]),
            _ => StageOutcome::Rejected("incomplete state".into()),
        }
    }

    type TestPipeline =
        EvaluationPipeline<RotorArchitect, State, fn(&State) -> StageOutcome<ObjectiveVector>>;

    fn pipeline(work_dir: &Path, calls: Rc<Cell<usize>>, fail: bool) -> TestPipeline {
        EvaluationPipeline::new(
            RotorArchitect,
            objectives as fn(&State) -> StageOutcome<ObjectiveVector>,
            SENTINEL.to_vec(),
            work_dir,
        )
        .with_stage(Sleeve { limit: 10.0 })
        .with_stage(Losses { calls, fail })
    }

    fn candidate(v: &[f64]) -> Candidate {
        Candidate::from_trusted(v.to_vec())
    }

    #[test]
    fn test_feasible_design_is_scored_with_stage_history() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let mut p = pipeline(dir.path(), calls.clone(), false);
        assert_eq!(p.stage_names(), vec!["structural", "losses"]);

        let record = p.evaluate(&candidate(&[2.0, 0.5]), 0).unwrap();
        assert_eq!(record.objs, vec![-2.0, 4.0, 4.0]);
        assert!(!record.is_rejected());
        assert_eq!(record.full_results.len(), 2);
        assert_eq!(record.full_results[0].stage, "structural");
        assert_eq!(record.full_results[1].state["loss"], 4.0);
        assert_eq!(record.design["radius"], 2.0);
        assert!(dir.path().join("eval_000000/deck.txt").exists());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_rejected_design_gets_sentinel_and_skips_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let mut p = pipeline(dir.path(), calls.clone(), false);

        for (k, x) in [[5.0, 0.1], [9.0, 0.2]].iter().enumerate() {
            let record = p.evaluate(&candidate(x), k as u64).unwrap();
            assert_eq!(record.objs, SENTINEL.to_vec());
            let rejection = record.rejection.unwrap();
            assert_eq!(rejection.stage, "structural");
            assert!(rejection.reason.contains("sleeve stress"));
            assert!(record.full_results.is_empty());
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_stage_error_is_infrastructure_not_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Rc::new(Cell::new(0)), true);

        match p.evaluate(&candidate(&[2.0, 0.5]), 17) {
            Err(CampaignError::Infrastructure {
                stage, evaluation, ..
            }) => {
                assert_eq!(stage, "losses");
                assert_eq!(evaluation, 17);
            }
            other => panic!("expected infrastructure error, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_evaluation_dir_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Rc::new(Cell::new(0)), false);
        let stale = p.evaluation_dir(3);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover.res"), b"partial").unwrap();

        p.evaluate(&candidate(&[2.0, 0.5]), 3).unwrap();
        assert!(!stale.join("leftover.res").exists());
        assert!(stale.join("deck.txt").exists());
    }

    #[test]
    fn test_non_finite_objectives_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut p: EvaluationPipeline<_, State, _> = EvaluationPipeline::new(
            RotorArchitect,
            |_: &State| StageOutcome::Accepted(vec![f64::NAN, 0.0, 0.0]),
            SENTINEL.to_vec(),
            dir.path(),
        );
        let record = p.evaluate(&candidate(&[1.0, 1.0]), 0).unwrap();
        assert_eq!(record.objs, SENTINEL.to_vec());
        assert_eq!(record.rejection.unwrap().stage, "objectives");
    }

    #[test]
    fn test_wrong_objective_count_is_infrastructure() {
        let dir = tempfile::tempdir().unwrap();
        let mut p: EvaluationPipeline<_, State, _> = EvaluationPipeline::new(
            RotorArchitect,
            |_: &State| StageOutcome::Accepted(vec![1.0]),
            SENTINEL.to_vec(),
            dir.path(),
        );
        let err = p.evaluate(&candidate(&[1.0, 1.0]), 0).unwrap_err();
        assert!(matches!(err, CampaignError::Infrastructure { ref stage, .. } if stage == "objectives"));
    }
}
