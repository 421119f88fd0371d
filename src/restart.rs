//! Startup diagnosis of where a campaign left off.
//!
//! The archive count `N` and the snapshot's `evaluations` anchor decide
//! the state; see [`CampaignStatus`] for the recognized states. Anything
//! else is a [`CampaignError::RestartInconsistency`] reported before any
//! new evaluation runs.

use crate::archive::{ArchiveStore, EvaluationRecord};
use crate::config::CampaignConfig;
use crate::error::{CampaignError, Result};
use crate::pareto::select_survivors;
use crate::snapshot::{PopulationSnapshot, PopulationSnapshotStore};
use crate::types::{Member, Population};
use log::{info, warn};
use std::fmt;

/// Where a campaign stands at startup.
///
/// `generation` always names the last *completed* generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Nothing archived, no snapshot.
    Fresh,

    /// Generation 0 was interrupted after `evaluated` evaluations.
    MidGeneration { evaluated: usize },

    /// A generation finished but its snapshot was never written.
    GenerationBoundary { generation: u64 },

    /// The snapshot matches the archive exactly.
    Resumed { generation: u64 },

    /// Generation `generation + 1` was interrupted; its `orphaned`
    /// records stay in the archive and the generation is redone from the
    /// snapshot of `generation`.
    InterruptedGeneration { generation: u64, orphaned: usize },
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Fresh => write!(f, "fresh campaign"),
            CampaignStatus::MidGeneration { evaluated } => {
                write!(f, "initial generation interrupted after {evaluated} evaluations")
            }
            CampaignStatus::GenerationBoundary { generation } => {
                write!(f, "generation {generation} complete, snapshot missing")
            }
            CampaignStatus::Resumed { generation } => {
                write!(f, "resuming after generation {generation}")
            }
            CampaignStatus::InterruptedGeneration {
                generation,
                orphaned,
            } => write!(
                f,
                "generation {} interrupted after {orphaned} evaluations; redoing it from \
                 the snapshot of generation {generation}",
                generation + 1
            ),
        }
    }
}

/// Population the evolutionary loop starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPoint {
    /// Generation 0 is not complete. `evaluated` are its first members in
    /// index order; the rest still have to be sampled and evaluated.
    InitialGeneration { evaluated: Vec<Member> },

    /// A complete population of generation `generation`.
    Generation {
        generation: u64,
        population: Population,
        /// Whether the snapshot must be (re)written before evolving.
        write_snapshot: bool,
    },
}

/// Outcome of restart diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPlan {
    pub status: CampaignStatus,
    /// Seed of the campaign's random stream.
    pub seed: u64,
    /// Archive cardinality at startup.
    pub archived: u64,
    pub start: StartPoint,
}

impl RestartPlan {
    /// The snapshot this plan asks to be written, if any.
    pub fn pending_snapshot(&self) -> Option<PopulationSnapshot> {
        match &self.start {
            StartPoint::Generation {
                generation,
                population,
                write_snapshot: true,
            } => Some(PopulationSnapshot::new(
                *generation,
                self.archived,
                self.seed,
                population,
            )),
            _ => None,
        }
    }
}

/// Reconstructs a consistent starting population from the two stores.
///
/// Diagnosis reads both stores but never writes; the caller persists
/// [`RestartPlan::pending_snapshot`] before evolving.
pub struct RestartCoordinator<'a> {
    archive: &'a ArchiveStore,
    snapshots: &'a PopulationSnapshotStore,
    config: &'a CampaignConfig,
}

impl<'a> RestartCoordinator<'a> {
    pub fn new(
        archive: &'a ArchiveStore,
        snapshots: &'a PopulationSnapshotStore,
        config: &'a CampaignConfig,
    ) -> Self {
        Self {
            archive,
            snapshots,
            config,
        }
    }

    pub fn plan(&self) -> Result<RestartPlan> {
        let p = self.config.population_size;
        let n = self.archive.len();
        let snapshot = self.snapshots.read(p)?;

        let plan = match snapshot {
            None => self.plan_without_snapshot(n, p)?,
            Some(snapshot) => self.plan_from_snapshot(snapshot, n, p)?,
        };
        info!(
            "restart diagnosis: {} ({} archived, population size {p})",
            plan.status, plan.archived
        );
        Ok(plan)
    }

    fn plan_without_snapshot(&self, n: usize, p: usize) -> Result<RestartPlan> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let archived = n as u64;

        if n == 0 {
            return Ok(RestartPlan {
                status: CampaignStatus::Fresh,
                seed,
                archived,
                start: StartPoint::InitialGeneration {
                    evaluated: Vec::new(),
                },
            });
        }
        if n < p {
            if self.config.seed.is_none() {
                warn!(
                    "no seed configured: the {} unevaluated members of generation 0 will \
                     not match those sampled before the interruption",
                    p - n
                );
            }
            let evaluated = self.replay(&self.archive.tail(n)?)?;
            return Ok(RestartPlan {
                status: CampaignStatus::MidGeneration { evaluated: n },
                seed,
                archived,
                start: StartPoint::InitialGeneration { evaluated },
            });
        }
        if n % p != 0 {
            return Err(self.inconsistent(
                n,
                format!(
                    "no population snapshot at '{}' and {n} is not a multiple of the \
                     population size {p}; the interrupted generation cannot be attributed",
                    self.snapshots.path().display()
                ),
            ));
        }

        let generation = (n / p - 1) as u64;
        let population = Population::new(self.replay(&self.archive.tail(p)?)?);
        Ok(RestartPlan {
            status: CampaignStatus::GenerationBoundary { generation },
            seed,
            archived,
            start: StartPoint::Generation {
                generation,
                population,
                write_snapshot: true,
            },
        })
    }

    fn plan_from_snapshot(
        &self,
        snapshot: PopulationSnapshot,
        n: usize,
        p: usize,
    ) -> Result<RestartPlan> {
        if let Some(configured) = self.config.seed.filter(|&s| s != snapshot.seed) {
            warn!(
                "configured seed {configured} ignored; continuing with the campaign's seed {}",
                snapshot.seed
            );
        }
        let seed = snapshot.seed;
        let archived = n as u64;
        let anchor = snapshot.evaluations;

        if anchor > archived {
            return Err(self.inconsistent(
                n,
                format!(
                    "snapshot '{}' was written after {anchor} evaluations but the archive \
                     holds only {n}; archive records have been lost",
                    self.snapshots.path().display()
                ),
            ));
        }

        let since = (archived - anchor) as usize;
        let generation = snapshot.generation;
        self.check_members(&snapshot.members, n)?;
        let population = snapshot.population();

        if since == 0 {
            return Ok(RestartPlan {
                status: CampaignStatus::Resumed { generation },
                seed,
                archived,
                start: StartPoint::Generation {
                    generation,
                    population,
                    write_snapshot: false,
                },
            });
        }
        if since < p {
            warn!(
                "{since} archived evaluations of interrupted generation {} cannot be \
                 attributed to subproblems; they stay in the archive and the generation \
                 is evaluated again",
                generation + 1
            );
            return Ok(RestartPlan {
                status: CampaignStatus::InterruptedGeneration {
                    generation,
                    orphaned: since,
                },
                seed,
                archived,
                start: StartPoint::Generation {
                    generation,
                    population,
                    write_snapshot: true,
                },
            });
        }
        if since > p {
            return Err(self.inconsistent(
                n,
                format!(
                    "{since} evaluations were archived after snapshot '{}' (generation \
                     {generation}), more than one generation of {p}",
                    self.snapshots.path().display()
                ),
            ));
        }

        let offspring = self.replay(&self.archive.tail(p)?)?;
        let mut pool = snapshot.members;
        pool.extend(offspring);
        let keep = select_survivors(&pool.iter().map(|m| m.objs.clone()).collect::<Vec<_>>(), p);
        let survivors: Vec<Member> = keep.into_iter().map(|i| pool[i].clone()).collect();
        let generation = generation + 1;
        Ok(RestartPlan {
            status: CampaignStatus::GenerationBoundary { generation },
            seed,
            archived,
            start: StartPoint::Generation {
                generation,
                population: Population::new(survivors),
                write_snapshot: true,
            },
        })
    }

    /// Turns archived records into members after checking their shape
    /// against the current configuration.
    fn replay(&self, records: &[EvaluationRecord]) -> Result<Vec<Member>> {
        let members: Vec<Member> = records.iter().map(EvaluationRecord::member).collect();
        self.check_members(&members, self.archive.len())?;
        Ok(members)
    }

    fn check_members(&self, members: &[Member], n: usize) -> Result<()> {
        let dim = self.config.bounds.dim();
        let m = self.config.num_objectives();
        for member in members {
            if member.x.len() != dim {
                return Err(self.inconsistent(
                    n,
                    format!(
                        "stored candidate has {} variables but the bounds define {dim}",
                        member.x.len()
                    ),
                ));
            }
            if member.objs.len() != m {
                return Err(self.inconsistent(
                    n,
                    format!(
                        "stored objective vector has {} values but the sentinel has {m}",
                        member.objs.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn inconsistent(&self, archived: usize, reason: String) -> CampaignError {
        CampaignError::RestartInconsistency {
            path: self.archive.path().to_path_buf(),
            archived,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moead::{MoeadConfig, WeightGeneration};
    use crate::types::{Bounds, Candidate};
    use serde_json::json;
    use std::path::Path;

    fn config(dir: &Path, p: usize) -> CampaignConfig {
        CampaignConfig::new(Bounds::new(vec![(0.0, 100.0), (0.0, 1.0)]).unwrap())
            .with_population_size(p)
            .with_seed(11)
            .with_campaign_dir(dir)
            .with_moead(MoeadConfig::default().with_weight_generation(WeightGeneration::Random))
    }

    fn record(i: usize, objs: Vec<f64>) -> EvaluationRecord {
        EvaluationRecord {
            x: Candidate::from_trusted(vec![i as f64, 0.5]),
            design: json!({ "id": i }),
            full_results: Vec::new(),
            objs,
            rejection: None,
        }
    }

    fn fill(archive: &mut ArchiveStore, range: std::ops::Range<usize>) {
        for i in range {
            let v = i as f64;
            archive.append(&record(i, vec![v, -v, 1.0])).unwrap();
        }
    }

    fn members(range: std::ops::Range<usize>) -> Population {
        Population::new(
            range
                .map(|i| record(i, vec![i as f64, -(i as f64), 1.0]).member())
                .collect(),
        )
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: CampaignConfig,
        archive: ArchiveStore,
        snapshots: PopulationSnapshotStore,
    }

    impl Fixture {
        fn new(p: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = config(dir.path(), p);
            let archive = ArchiveStore::open(&config.archive_path).unwrap();
            let snapshots = PopulationSnapshotStore::new(&config.snapshot_path);
            Self {
                _dir: dir,
                config,
                archive,
                snapshots,
            }
        }

        fn plan(&self) -> Result<RestartPlan> {
            RestartCoordinator::new(&self.archive, &self.snapshots, &self.config).plan()
        }

        fn snapshot(&self, generation: u64, evaluations: u64, seed: u64, pop: &Population) {
            self.snapshots
                .write(&PopulationSnapshot::new(generation, evaluations, seed, pop))
                .unwrap();
        }
    }

    #[test]
    fn test_fresh() {
        let fx = Fixture::new(4);
        let plan = fx.plan().unwrap();
        assert_eq!(plan.status, CampaignStatus::Fresh);
        assert_eq!(plan.seed, 11);
        assert_eq!(
            plan.start,
            StartPoint::InitialGeneration {
                evaluated: Vec::new()
            }
        );
        assert!(plan.pending_snapshot().is_none());
    }

    #[test]
    fn test_mid_generation_replays_archive_prefix_in_order() {
        let mut fx = Fixture::new(78);
        fill(&mut fx.archive, 0..40);

        let plan = fx.plan().unwrap();
        assert_eq!(plan.status, CampaignStatus::MidGeneration { evaluated: 40 });
        match plan.start {
            StartPoint::InitialGeneration { evaluated } => {
                assert_eq!(evaluated.len(), 40);
                for (i, m) in evaluated.iter().enumerate() {
                    assert_eq!(m.x.as_slice(), &[i as f64, 0.5]);
                    assert_eq!(m.objs, vec![i as f64, -(i as f64), 1.0]);
                }
            }
            other => panic!("unexpected start {other:?}"),
        }
    }

    #[test]
    fn test_resumed_when_snapshot_matches_archive() {
        let mut fx = Fixture::new(78);
        fill(&mut fx.archive, 0..78);
        fx.snapshot(0, 78, 11, &members(0..78));

        let plan = fx.plan().unwrap();
        assert_eq!(plan.status, CampaignStatus::Resumed { generation: 0 });
        assert!(plan.pending_snapshot().is_none());
        match plan.start {
            StartPoint::Generation { population, .. } => assert_eq!(population, members(0..78)),
            other => panic!("unexpected start {other:?}"),
        }
    }

    #[test]
    fn test_boundary_without_snapshot_uses_last_generation() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..8);

        let plan = fx.plan().unwrap();
        assert_eq!(plan.status, CampaignStatus::GenerationBoundary { generation: 1 });
        let snap = plan.pending_snapshot().unwrap();
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.evaluations, 8);
        assert_eq!(snap.population(), members(4..8));
    }

    #[test]
    fn test_partial_later_generation_without_snapshot_is_inconsistent() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..6);

        let err = fx.plan().unwrap_err();
        assert!(err.is_restart_inconsistency());
        assert!(matches!(err, CampaignError::RestartInconsistency { archived: 6, .. }));
    }

    #[test]
    fn test_interrupted_generation_redoes_from_snapshot() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..6);
        fx.snapshot(0, 4, 5, &members(0..4));

        let plan = fx.plan().unwrap();
        assert_eq!(
            plan.status,
            CampaignStatus::InterruptedGeneration {
                generation: 0,
                orphaned: 2
            }
        );
        assert_eq!(plan.seed, 5);
        let snap = plan.pending_snapshot().unwrap();
        assert_eq!(snap.generation, 0);
        assert_eq!(snap.evaluations, 6);
        assert_eq!(snap.population(), members(0..4));
    }

    #[test]
    fn test_boundary_after_snapshot_selects_non_dominated() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..4);
        // The offspring generation: two dominate everything, two are rejected.
        for (i, objs) in [
            (4, vec![-10.0, -10.0, 0.0]),
            (5, vec![1e9, 1e9, 1e9]),
            (6, vec![-11.0, -9.0, 0.0]),
            (7, vec![1e9, 1e9, 1e9]),
        ] {
            fx.archive.append(&record(i, objs)).unwrap();
        }
        fx.snapshot(0, 4, 11, &members(0..4));

        let plan = fx.plan().unwrap();
        assert_eq!(plan.status, CampaignStatus::GenerationBoundary { generation: 1 });
        let snap = plan.pending_snapshot().unwrap();
        assert_eq!(snap.members.len(), 4);
        let ids: Vec<f64> = snap.members.iter().map(|m| m.x[0]).collect();
        assert!(ids.contains(&4.0) && ids.contains(&6.0), "{ids:?}");
        assert!(!ids.contains(&5.0) && !ids.contains(&7.0), "{ids:?}");
    }

    #[test]
    fn test_more_than_a_generation_past_snapshot_is_inconsistent() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..9);
        fx.snapshot(0, 4, 11, &members(0..4));
        assert!(fx.plan().unwrap_err().is_restart_inconsistency());
    }

    #[test]
    fn test_snapshot_ahead_of_archive_is_inconsistent() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..4);
        fx.snapshot(1, 8, 11, &members(0..4));
        let err = fx.plan().unwrap_err();
        assert!(err.to_string().contains("lost"), "{err}");
    }

    #[test]
    fn test_population_size_change_is_size_mismatch() {
        let mut fx = Fixture::new(4);
        fill(&mut fx.archive, 0..6);
        fx.snapshot(1, 6, 11, &members(0..6));
        match fx.plan() {
            Err(CampaignError::SizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!((expected, actual), (4, 6));
            }
            other => panic!("expected SizeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_replayed_record_with_wrong_dimension_is_inconsistent() {
        let mut fx = Fixture::new(4);
        let mut bad = record(0, vec![0.0, 0.0, 1.0]);
        bad.x = Candidate::from_trusted(vec![1.0, 2.0, 3.0]);
        fx.archive.append(&bad).unwrap();

        let err = fx.plan().unwrap_err();
        assert!(err.to_string().contains("3 variables"), "{err}");
    }
}
