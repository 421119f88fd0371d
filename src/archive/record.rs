//! The archived outcome of one evaluation.

use crate::types::{Candidate, Member, ObjectiveVector};
use serde::{Deserialize, Serialize};

/// State after one analysis stage, kept for post-hoc inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub state: serde_json::Value,
}

/// Why a design was scored with the bad-fitness sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub stage: String,
    pub reason: String,
}

/// One completed evaluation. Created once, appended once, never mutated.
///
/// `design` and the per-stage states are opaque JSON to the archive; only
/// `x` and `objs` are interpreted by the campaign engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub x: Candidate,
    pub design: serde_json::Value,
    pub full_results: Vec<StageResult>,
    pub objs: ObjectiveVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl EvaluationRecord {
    /// Whether a stage rejected the design and `objs` is the sentinel.
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    pub fn member(&self) -> Member {
        Member {
            x: self.x.clone(),
            objs: self.objs.clone(),
        }
    }
}
