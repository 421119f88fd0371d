//! Chained physics analyses that score one candidate.
//!
//! # Flow
//!
//! ```text
//! x ─▶ Architect ─▶ design ─▶ S::from ─▶ stage 1 ─▶ … ─▶ stage n ─▶ objectives
//!                                           │                │
//!                                       Rejected         StageError
//!                                           ▼                ▼
//!                                   bad-fitness record   Infrastructure error
//! ```
//!
//! Every accepted stage state is recorded in the archive record's
//! `full_results`, so intermediate results can be inspected post hoc.

mod runner;
mod types;

pub use runner::EvaluationPipeline;
pub use types::{
    AnalysisStage, Architect, CandidateEvaluator, ObjectiveFunction, StageContext, StageOutcome,
};
