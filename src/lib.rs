//! Crash-safe multi-objective design-optimization campaigns.
//!
//! Explores a bounded space of electric-machine geometries, scores each
//! candidate through a chain of physics analyses and evolves the
//! population toward the Pareto front, persisting progress so a campaign
//! of expensive evaluations survives being killed at any moment.
//!
//! - **Archive**: append-only, checksummed log of every evaluation; the
//!   durable count of what has been evaluated.
//! - **Snapshot**: atomically replaced copy of the last complete
//!   generation.
//! - **Pipeline**: architect + ordered analysis stages + objective map;
//!   infeasible designs get the bad-fitness sentinel, infrastructure
//!   failures propagate.
//! - **Restart**: explicit state machine reconciling archive and snapshot
//!   at startup.
//! - **MOEA/D**: decomposition-based evolutionary loop with per-generation
//!   hypervolume.
//!
//! # Example
//!
//! ```no_run
//! use mach_opt::{CampaignConfig, CampaignRunner};
//! # use mach_opt::{Candidate, EvaluationRecord, Result};
//! # fn evaluate(x: &Candidate, _evaluation: u64) -> Result<EvaluationRecord> { unimplemented!() }
//!
//! let config = CampaignConfig::from_toml_file("campaign.toml")?;
//! let result = CampaignRunner::new(config, evaluate).run()?;
//! println!("hypervolume history: {:?}", result.quality_history);
//! # Ok::<(), mach_opt::CampaignError>(())
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod moead;
pub mod pareto;
pub mod pipeline;
pub mod restart;
pub mod snapshot;
pub mod types;

pub use archive::{ArchiveStore, EvaluationRecord};
pub use config::CampaignConfig;
pub use error::{CampaignError, Result, StageError};
pub use moead::{CampaignResult, CampaignRunner, GenerationStats, MoeadConfig};
pub use pipeline::{
    AnalysisStage, Architect, CandidateEvaluator, EvaluationPipeline, StageContext, StageOutcome,
};
pub use restart::{CampaignStatus, RestartCoordinator, RestartPlan};
pub use snapshot::{PopulationSnapshot, PopulationSnapshotStore};
pub use types::{Bounds, Candidate, Member, ObjectiveVector, Population};
