//! Variation and decomposition operators.
//!
//! - [`de_rand_1`]: differential evolution crossover
//! - [`polynomial_mutation`]: bounded polynomial mutation
//! - [`repair`]: pulls out-of-bounds genes back between bound and parent
//! - [`tchebycheff`]: weighted Chebyshev scalarization against the ideal point

use super::config::MoeadConfig;
use crate::types::{Bounds, Candidate};
use rand::Rng;

/// Weights below this are raised to it, so no objective is ignored.
const MIN_WEIGHT: f64 = 1e-6;

/// DE/rand/1 with binomial crossover.
///
/// Gene `k` becomes `parent[k] + f * (r1[k] - r2[k])` with probability
/// `cr`; one randomly chosen gene always does.
pub fn de_rand_1<R: Rng>(
    parent: &[f64],
    r1: &[f64],
    r2: &[f64],
    cr: f64,
    f: f64,
    rng: &mut R,
) -> Vec<f64> {
    let forced = rng.random_range(0..parent.len());
    parent
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            if k == forced || rng.random::<f64>() < cr {
                p + f * (r1[k] - r2[k])
            } else {
                p
            }
        })
        .collect()
}

/// Deb's polynomial mutation, applied per gene with probability `rate`.
pub fn polynomial_mutation<R: Rng>(
    genes: &mut [f64],
    bounds: &Bounds,
    eta_m: f64,
    rate: f64,
    rng: &mut R,
) {
    for (k, y) in genes.iter_mut().enumerate() {
        let (lo, hi) = (bounds.lower(k), bounds.upper(k));
        if rng.random::<f64>() >= rate || hi <= lo {
            continue;
        }
        let v = y.clamp(lo, hi);
        let delta1 = (v - lo) / (hi - lo);
        let delta2 = (hi - v) / (hi - lo);
        let u: f64 = rng.random();
        let power = 1.0 / (eta_m + 1.0);
        let deltaq = if u < 0.5 {
            let xy = 1.0 - delta1;
            let val = 2.0 * u + (1.0 - 2.0 * u) * xy.powf(eta_m + 1.0);
            val.powf(power) - 1.0
        } else {
            let xy = 1.0 - delta2;
            let val = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * xy.powf(eta_m + 1.0);
            1.0 - val.powf(power)
        };
        *y = v + deltaq * (hi - lo);
    }
}

/// Resamples each out-of-bounds gene uniformly between the violated bound
/// and the parent's gene.
pub fn repair<R: Rng>(genes: &mut [f64], parent: &[f64], bounds: &Bounds, rng: &mut R) {
    for (k, y) in genes.iter_mut().enumerate() {
        let (lo, hi) = (bounds.lower(k), bounds.upper(k));
        if *y < lo || y.is_nan() {
            *y = lo + rng.random::<f64>() * (parent[k] - lo);
        } else if *y > hi {
            *y = hi - rng.random::<f64>() * (hi - parent[k]);
        }
        *y = y.clamp(lo, hi);
    }
}

/// Weighted Chebyshev distance of `objs` from the ideal point.
pub fn tchebycheff(objs: &[f64], weight: &[f64], ideal: &[f64]) -> f64 {
    objs.iter()
        .zip(weight)
        .zip(ideal)
        .map(|((&f, &w), &z)| w.max(MIN_WEIGHT) * (f - z).abs())
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Builds one offspring of `parent` from two mates: DE, then polynomial
/// mutation with per-gene probability `1/dim`, then repair.
pub(crate) fn offspring<R: Rng>(
    parent: &[f64],
    r1: &[f64],
    r2: &[f64],
    bounds: &Bounds,
    config: &MoeadConfig,
    rng: &mut R,
) -> Candidate {
    let mut genes = de_rand_1(parent, r1, r2, config.cr, config.f, rng);
    let rate = 1.0 / bounds.dim() as f64;
    polynomial_mutation(&mut genes, bounds, config.eta_m, rate, rng);
    repair(&mut genes, parent, bounds, rng);
    Candidate::from_trusted(genes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_de_with_full_crossover_moves_every_gene() {
        let mut rng = StdRng::seed_from_u64(3);
        let child = de_rand_1(&[1.0, 1.0], &[3.0, 0.0], &[1.0, 2.0], 1.0, 0.5, &mut rng);
        assert_eq!(child, vec![2.0, 0.0]);
    }

    #[test]
    fn test_de_with_zero_crossover_moves_one_gene() {
        let mut rng = StdRng::seed_from_u64(3);
        let parent = [0.0; 6];
        let child = de_rand_1(&parent, &[1.0; 6], &[0.0; 6], 0.0, 1.0, &mut rng);
        assert_eq!(child.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn test_repair_stays_between_bound_and_parent() {
        let bounds = Bounds::new(vec![(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut genes = vec![-5.0, 7.0];
            repair(&mut genes, &[0.4, 0.6], &bounds, &mut rng);
            assert!((0.0..=0.4).contains(&genes[0]));
            assert!((0.6..=1.0).contains(&genes[1]));
        }
    }

    #[test]
    fn test_tchebycheff_is_weighted_max() {
        let v = tchebycheff(&[3.0, 5.0], &[0.5, 0.5], &[1.0, 1.0]);
        assert!((v - 2.0).abs() < 1e-12);
        // Zero weight is floored, not ignored.
        let v = tchebycheff(&[1.0, 101.0], &[1.0, 0.0], &[1.0, 1.0]);
        assert!((v - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_dimension_is_untouched() {
        let bounds = Bounds::new(vec![(2.0, 2.0), (0.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut genes = vec![2.0, 0.5];
        polynomial_mutation(&mut genes, &bounds, 20.0, 1.0, &mut rng);
        assert_eq!(genes[0], 2.0);
    }

    proptest! {
        #[test]
        fn offspring_stay_in_bounds(seed in any::<u64>(), dim in 1usize..8) {
            let bounds = Bounds::new(
                (0..dim).map(|k| (-(k as f64), 1.0 + k as f64 * 10.0)).collect(),
            ).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let config = MoeadConfig::default();
            let parent = bounds.sample(&mut rng);
            let r1 = bounds.sample(&mut rng);
            let r2 = bounds.sample(&mut rng);
            for _ in 0..20 {
                let child = offspring(&parent, &r1, &r2, &bounds, &config, &mut rng);
                prop_assert!(bounds.contains(&child));
            }
        }
    }
}
