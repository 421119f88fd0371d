//! Campaign configuration.
//!
//! [`CampaignConfig`] holds everything a campaign needs besides the
//! evaluation pipeline itself: the design space, the generation budget,
//! the bad-fitness sentinel, file locations and the MOEA/D parameters.

use crate::error::{CampaignError, Result};
use crate::moead::weights::{grid_divisions, nearest_grid_sizes};
use crate::moead::{MoeadConfig, WeightGeneration};
use crate::types::Bounds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration of one optimization campaign.
///
/// # Loading
///
/// ```toml
/// bounds = [[0.0022, 0.0069], [24.0, 66.0], [0.4, 0.9]]
/// population_size = 78
/// max_generations = 100
/// seed = 42
///
/// [moead]
/// neighbours = 20
/// ```
///
/// Relative paths in a file loaded with
/// [`from_toml_file`](CampaignConfig::from_toml_file) are resolved against
/// the file's directory.
///
/// # Builder Pattern
///
/// ```
/// use mach_opt::{Bounds, CampaignConfig};
///
/// let bounds = Bounds::new(vec![(0.0, 1.0); 4]).unwrap();
/// let config = CampaignConfig::new(bounds)
///     .with_population_size(21)
///     .with_max_generations(5)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// Closed interval of every free variable.
    pub bounds: Bounds,

    /// Members per generation; also the number of evaluations per
    /// generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Generations evolved after the initial generation 0.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,

    /// Campaign seed. A resumed campaign keeps the seed stored in its
    /// snapshot.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Objective vector assigned to rejected designs. Its length fixes
    /// the number of objectives; it is also the hypervolume reference.
    #[serde(default = "default_bad_fitness")]
    pub bad_fitness: Vec<f64>,

    /// Retries of an evaluation that failed with an infrastructure error.
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Parent of the per-evaluation working directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub moead: MoeadConfig,
}

fn default_population_size() -> usize {
    78
}

fn default_max_generations() -> usize {
    10
}

fn default_bad_fitness() -> Vec<f64> {
    vec![1e9; 3]
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("opti_archive.bin")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("latest_pop.json")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("evaluations")
}

impl CampaignConfig {
    /// Creates a configuration with default settings over `bounds`.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            seed: None,
            bad_fitness: default_bad_fitness(),
            max_retries: 0,
            archive_path: default_archive_path(),
            snapshot_path: default_snapshot_path(),
            work_dir: default_work_dir(),
            moead: MoeadConfig::default(),
        }
    }

    /// Loads and validates a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| CampaignError::io(path, e))?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| CampaignError::Config(format!("{}: {e}", path.display())))?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.archive_path = base.join(&config.archive_path);
            config.snapshot_path = base.join(&config.snapshot_path);
            config.work_dir = base.join(&config.work_dir);
        }
        config
            .validate()
            .map_err(|e| CampaignError::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    pub fn with_max_generations(mut self, n: usize) -> Self {
        self.max_generations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_bad_fitness(mut self, sentinel: Vec<f64>) -> Self {
        self.bad_fitness = sentinel;
        self
    }

    pub fn with_max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = path.into();
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn with_work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = path.into();
        self
    }

    /// Places the archive, snapshot and work directory under `dir` with
    /// their default file names.
    pub fn with_campaign_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.with_archive_path(dir.join(default_archive_path()))
            .with_snapshot_path(dir.join(default_snapshot_path()))
            .with_work_dir(dir.join(default_work_dir()))
    }

    pub fn with_moead(mut self, moead: MoeadConfig) -> Self {
        self.moead = moead;
        self
    }

    /// Number of objectives, fixed by the sentinel's length.
    pub fn num_objectives(&self) -> usize {
        self.bad_fitness.len()
    }

    /// Validates the configuration.
    ///
    /// Returns `Err` with a description if any parameter is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.population_size < 2 {
            return Err("population_size must be at least 2".into());
        }
        let m = self.num_objectives();
        if m < 2 {
            return Err("bad_fitness must have at least 2 objectives".into());
        }
        if self.bad_fitness.iter().any(|v| !v.is_finite()) {
            return Err("bad_fitness must be finite".into());
        }
        match self.moead.weight_generation {
            WeightGeneration::Grid if grid_divisions(self.population_size, m).is_none() => {
                return Err(format!(
                    "population_size {} is not a simplex-lattice size for {m} objectives \
                     (nearest: {})",
                    self.population_size,
                    nearest_grid_sizes(self.population_size, m)
                ));
            }
            WeightGeneration::Random if self.population_size < m => {
                return Err(format!(
                    "population_size must be at least the number of objectives ({m})"
                ));
            }
            _ => {}
        }
        self.moead.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::new(vec![(0.0, 1.0), (24.0, 66.0)]).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = CampaignConfig::new(bounds());
        assert_eq!(config.population_size, 78);
        assert_eq!(config.max_generations, 10);
        assert_eq!(config.bad_fitness, vec![1e9; 3]);
        assert_eq!(config.max_retries, 0);
        assert!(config.seed.is_none());
        assert_eq!(config.archive_path, PathBuf::from("opti_archive.bin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_lattice_grid_size() {
        let err = CampaignConfig::new(bounds())
            .with_population_size(40)
            .validate()
            .unwrap_err();
        assert!(err.contains("40"), "{err}");

        let ok = CampaignConfig::new(bounds())
            .with_population_size(40)
            .with_moead(MoeadConfig::default().with_weight_generation(WeightGeneration::Random));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_sentinel() {
        let config = CampaignConfig::new(bounds()).with_bad_fitness(vec![1e9]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campaign.toml");
        fs::write(
            &path,
            r#"
bounds = [[0.0, 1.0], [24.0, 66.0]]
population_size = 21
seed = 9
archive_path = "runs/archive.bin"

[moead]
neighbours = 6
"#,
        )
        .unwrap();

        let config = CampaignConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.population_size, 21);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.moead.neighbours, 6);
        assert_eq!(config.archive_path, dir.path().join("runs/archive.bin"));
        assert_eq!(config.snapshot_path, dir.path().join("latest_pop.json"));
    }

    #[test]
    fn test_from_toml_file_reports_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campaign.toml");
        fs::write(&path, "bounds = [[1.0, 0.0]]\n").unwrap();
        let err = CampaignConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, CampaignError::Config(_)));
        assert!(err.to_string().contains("campaign.toml"));

        fs::write(&path, "bounds = [[0.0, 1.0]]\npopsize = 78\n").unwrap();
        assert!(CampaignConfig::from_toml_file(&path).is_err());
    }
}
