//! MOEA/D configuration.
//!
//! [`MoeadConfig`] holds the decomposition and variation parameters of the
//! evolutionary loop.

use serde::{Deserialize, Serialize};

/// How the subproblem weight vectors are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightGeneration {
    /// Simplex lattice. The population size must be `C(H+m-1, m-1)` for
    /// some number of divisions `H`, e.g. 78 for three objectives.
    #[default]
    Grid,

    /// The `m` unit vectors, then uniformly random points on the simplex.
    Random,
}

/// Configuration for the decomposition-based evolutionary loop.
///
/// # Defaults
///
/// ```
/// use mach_opt::moead::{MoeadConfig, WeightGeneration};
///
/// let config = MoeadConfig::default();
/// assert_eq!(config.weight_generation, WeightGeneration::Grid);
/// assert_eq!(config.neighbours, 20);
/// assert_eq!(config.limit, 2);
/// ```
///
/// # Builder Pattern
///
/// ```
/// use mach_opt::moead::{MoeadConfig, WeightGeneration};
///
/// let config = MoeadConfig::default()
///     .with_weight_generation(WeightGeneration::Random)
///     .with_neighbours(10)
///     .with_realb(0.8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoeadConfig {
    pub weight_generation: WeightGeneration,

    /// Size of each subproblem's neighbourhood (clamped to the population
    /// size at run time).
    pub neighbours: usize,

    /// DE crossover rate (0.0–1.0).
    pub cr: f64,

    /// DE differential weight (0.0–1.0).
    pub f: f64,

    /// Distribution index of polynomial mutation. Larger values keep
    /// offspring closer to their parent.
    pub eta_m: f64,

    /// Probability of drawing mates from the neighbourhood rather than the
    /// whole population (0.0–1.0).
    pub realb: f64,

    /// Maximum number of subproblems a single offspring may take over.
    pub limit: usize,

    /// When false, `realb` and `limit` are ignored: mates always come from
    /// the neighbourhood and replacement is unlimited.
    pub preserve_diversity: bool,
}

impl Default for MoeadConfig {
    fn default() -> Self {
        Self {
            weight_generation: WeightGeneration::Grid,
            neighbours: 20,
            cr: 1.0,
            f: 0.5,
            eta_m: 20.0,
            realb: 0.9,
            limit: 2,
            preserve_diversity: true,
        }
    }
}

impl MoeadConfig {
    pub fn with_weight_generation(mut self, weights: WeightGeneration) -> Self {
        self.weight_generation = weights;
        self
    }

    pub fn with_neighbours(mut self, n: usize) -> Self {
        self.neighbours = n;
        self
    }

    /// Sets the DE crossover rate.
    pub fn with_cr(mut self, cr: f64) -> Self {
        self.cr = cr.clamp(0.0, 1.0);
        self
    }

    /// Sets the DE differential weight.
    pub fn with_f(mut self, f: f64) -> Self {
        self.f = f.clamp(0.0, 1.0);
        self
    }

    pub fn with_eta_m(mut self, eta_m: f64) -> Self {
        self.eta_m = eta_m;
        self
    }

    /// Sets the neighbourhood mating probability.
    pub fn with_realb(mut self, realb: f64) -> Self {
        self.realb = realb.clamp(0.0, 1.0);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_preserve_diversity(mut self, on: bool) -> Self {
        self.preserve_diversity = on;
        self
    }

    /// Validates the configuration.
    ///
    /// Returns `Err` with a description if any parameter is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.neighbours < 2 {
            return Err("neighbours must be at least 2".into());
        }
        if !(0.0..=1.0).contains(&self.cr) {
            return Err("cr must be in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.f) {
            return Err("f must be in [0, 1]".into());
        }
        if !(self.eta_m.is_finite() && self.eta_m >= 0.0) {
            return Err("eta_m must be a finite, non-negative number".into());
        }
        if !(0.0..=1.0).contains(&self.realb) {
            return Err("realb must be in [0, 1]".into());
        }
        if self.preserve_diversity && self.limit == 0 {
            return Err("limit must be at least 1".into());
        }
        Ok(())
    }
}
