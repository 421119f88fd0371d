//! Atomically replaced snapshot of the live population.

use crate::error::{CampaignError, Result};
use crate::types::{Member, Population};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// One complete generation as persisted at a generation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub schema_version: u32,
    /// Generation this population completed (0 for the initial one).
    pub generation: u64,
    /// Archive cardinality when the snapshot was written.
    pub evaluations: u64,
    /// Campaign seed the random stream of later generations derives from.
    pub seed: u64,
    pub members: Vec<Member>,
}

impl PopulationSnapshot {
    pub fn new(generation: u64, evaluations: u64, seed: u64, population: &Population) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            generation,
            evaluations,
            seed,
            members: population.members().to_vec(),
        }
    }

    pub fn population(&self) -> Population {
        Population::new(self.members.clone())
    }
}

/// Full-overwrite store for [`PopulationSnapshot`]s.
///
/// Writes go to a sibling temp file which is fsynced and renamed over the
/// target, so a reader sees either the previous snapshot or the new one.
#[derive(Debug, Clone)]
pub struct PopulationSnapshotStore {
    path: PathBuf,
}

impl PopulationSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, snapshot: &PopulationSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            CampaignError::Serialization {
                path: self.path.clone(),
                source,
            }
        })?;
        atomic_write(&self.path, &bytes).map_err(|e| CampaignError::io(&self.path, e))?;
        info!(
            "wrote population snapshot '{}' (generation {}, {} members, {} evaluations)",
            self.path.display(),
            snapshot.generation,
            snapshot.members.len(),
            snapshot.evaluations
        );
        Ok(())
    }

    /// Reads the snapshot, or `None` if none has been written yet.
    ///
    /// A snapshot whose cardinality differs from `expected_size` is a
    /// [`CampaignError::SizeMismatch`]; it is reported, never repaired.
    pub fn read(&self, expected_size: usize) -> Result<Option<PopulationSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no population snapshot at '{}'", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(CampaignError::io(&self.path, e)),
        };

        let snapshot: PopulationSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| CampaignError::Serialization {
                path: self.path.clone(),
                source,
            })?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(CampaignError::RestartInconsistency {
                path: self.path.clone(),
                archived: 0,
                reason: format!(
                    "unsupported snapshot schema version {}",
                    snapshot.schema_version
                ),
            });
        }
        if snapshot.members.len() != expected_size {
            return Err(CampaignError::SizeMismatch {
                path: self.path.clone(),
                expected: expected_size,
                actual: snapshot.members.len(),
            });
        }
        Ok(Some(snapshot))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("snapshot");
    let tmp = path.with_file_name(format!(".{name}.tmp"));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;

    if let Err(e) = sync_parent(path) {
        warn!(
            "snapshot '{}' was replaced but its directory could not be synced; \
             the rename may not survive a power loss: {e}",
            path.display()
        );
    }
    Ok(())
}

/// Flushes the directory entry of `path` so a completed rename is durable.
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    File::open(parent)?.sync_all()
}
