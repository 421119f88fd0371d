//! Core data model: design-space bounds, candidates, objective vectors and
//! the index-stable population the evolutionary operators work on.
//!
//! All objectives are **minimized**. Maximized quantities (power density,
//! efficiency) are negated by the objective function before they get here.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Objective values of one evaluated candidate. Lower is better.
pub type ObjectiveVector = Vec<f64>;

/// Closed per-dimension interval `[lo, hi]` of the free variables.
///
/// Validated once at construction: every interval is finite with
/// `lo <= hi`, and there is at least one dimension.
///
/// # Examples
///
/// ```
/// use mach_opt::Bounds;
///
/// let bounds = Bounds::new(vec![(0.0022, 0.0069), (24.0, 66.0)]).unwrap();
/// assert_eq!(bounds.dim(), 2);
/// assert!(Bounds::new(vec![(1.0, 0.0)]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Bounds {
    intervals: Vec<(f64, f64)>,
}

impl Bounds {
    /// Creates bounds from ordered `(lo, hi)` pairs.
    pub fn new(intervals: Vec<(f64, f64)>) -> Result<Self, String> {
        if intervals.is_empty() {
            return Err("bounds must have at least one dimension".into());
        }
        for (i, &(lo, hi)) in intervals.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(format!("bounds[{i}] = [{lo}, {hi}] is not finite"));
            }
            if lo > hi {
                return Err(format!("bounds[{i}] has lo {lo} > hi {hi}"));
            }
        }
        Ok(Self { intervals })
    }

    /// Number of free variables.
    pub fn dim(&self) -> usize {
        self.intervals.len()
    }

    pub fn lower(&self, i: usize) -> f64 {
        self.intervals[i].0
    }

    pub fn upper(&self, i: usize) -> f64 {
        self.intervals[i].1
    }

    pub fn intervals(&self) -> &[(f64, f64)] {
        &self.intervals
    }

    /// Whether `x` has the right dimension and lies inside every interval.
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(&self.intervals)
                .all(|(&v, &(lo, hi))| v >= lo && v <= hi)
    }

    /// Samples a candidate uniformly from the bounded box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Candidate {
        Candidate(
            self.intervals
                .iter()
                .map(|&(lo, hi)| rng.random_range(lo..=hi))
                .collect(),
        )
    }

    /// Wraps `values` as a candidate after checking containment.
    pub fn candidate(&self, values: Vec<f64>) -> Result<Candidate, String> {
        if !self.contains(&values) {
            return Err(format!(
                "candidate {values:?} lies outside bounds {:?}",
                self.intervals
            ));
        }
        Ok(Candidate(values))
    }
}

impl TryFrom<Vec<(f64, f64)>> for Bounds {
    type Error = String;

    fn try_from(intervals: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Bounds::new(intervals)
    }
}

impl From<Bounds> for Vec<(f64, f64)> {
    fn from(bounds: Bounds) -> Self {
        bounds.intervals
    }
}

/// A point in the free-variable design space. Immutable once created.
///
/// Fresh candidates come from [`Bounds::sample`], [`Bounds::candidate`] or
/// the variation operators, all of which enforce containment. Candidates
/// replayed from the archive are trusted as they were when archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(Vec<f64>);

impl Candidate {
    /// Wraps values whose containment has already been established.
    pub(crate) fn from_trusted(values: Vec<f64>) -> Self {
        Candidate(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.clone()
    }
}

impl Deref for Candidate {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// An evaluated candidate: the pair stored in populations and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub x: Candidate,
    pub objs: ObjectiveVector,
}

/// One generation's worth of evaluated members.
///
/// Index `i` is the member owned by subproblem `i`; the evolutionary
/// operators rely on that identity within a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    members: Vec<Member>,
}

impl Population {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, i: usize) -> &Member {
        &self.members[i]
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Replaces the member at index `i`, keeping every other index stable.
    pub fn replace(&mut self, i: usize, member: Member) {
        self.members[i] = member;
    }

    /// Objective vectors in index order.
    pub fn objectives(&self) -> Vec<ObjectiveVector> {
        self.members.iter().map(|m| m.objs.clone()).collect()
    }

    pub fn into_members(self) -> Vec<Member> {
        self.members
    }
}
