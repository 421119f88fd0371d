//! Subproblem weight vectors and their neighbourhoods.

use super::config::WeightGeneration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WEIGHT_STREAM: u64 = 0x5745_4947_4854_5321;

/// Generates `n` weight vectors over `m` objectives.
///
/// Every vector is non-negative and sums to one. `Random` weights are
/// drawn from a stream derived from `seed`, so they are identical across
/// restarts of the same campaign.
pub fn generate_weights(
    method: WeightGeneration,
    n: usize,
    m: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>, String> {
    if m < 2 {
        return Err(format!("weight vectors need at least 2 objectives, got {m}"));
    }
    match method {
        WeightGeneration::Grid => {
            let h = grid_divisions(n, m).ok_or_else(|| {
                format!(
                    "grid weights cannot produce {n} vectors for {m} objectives; \
                     use a population size of C(H+{m1}, {m1}) for some H (nearest: {})",
                    nearest_grid_sizes(n, m),
                    m1 = m - 1
                )
            })?;
            Ok(lattice(m, h)
                .into_iter()
                .map(|point| point.into_iter().map(|k| k as f64 / h as f64).collect())
                .collect())
        }
        WeightGeneration::Random => {
            if n < m {
                return Err(format!(
                    "random weights need at least {m} vectors (one per objective), got {n}"
                ));
            }
            let mut rng = StdRng::seed_from_u64(seed ^ WEIGHT_STREAM);
            let mut weights: Vec<Vec<f64>> = (0..m)
                .map(|i| (0..m).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
                .collect();
            weights.extend((m..n).map(|_| simplex_point(&mut rng, m)));
            Ok(weights)
        }
    }
}

/// The number of lattice divisions `H` with `C(H+m-1, m-1) == n`.
pub fn grid_divisions(n: usize, m: usize) -> Option<usize> {
    let mut h = 1;
    loop {
        let count = binomial(h + m - 1, m - 1);
        if count >= n as u128 {
            return (count == n as u128).then_some(h);
        }
        h += 1;
    }
}

/// Indices of the `t` weight vectors closest to each vector (itself
/// included), nearest first.
pub fn neighbourhoods(weights: &[Vec<f64>], t: usize) -> Vec<Vec<usize>> {
    let t = t.min(weights.len());
    weights
        .iter()
        .map(|w| {
            let mut by_distance: Vec<(usize, f64)> = weights
                .iter()
                .enumerate()
                .map(|(j, v)| {
                    let d: f64 = w.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum();
                    (j, d)
                })
                .collect();
            by_distance.sort_by(|a, b| a.1.total_cmp(&b.1));
            by_distance.into_iter().take(t).map(|(j, _)| j).collect()
        })
        .collect()
}

/// All compositions of `h` into `m` non-negative parts.
fn lattice(m: usize, h: usize) -> Vec<Vec<usize>> {
    if m == 1 {
        return vec![vec![h]];
    }
    (0..=h)
        .flat_map(|first| {
            lattice(m - 1, h - first).into_iter().map(move |mut rest| {
                rest.insert(0, first);
                rest
            })
        })
        .collect()
}

/// Uniform point on the unit simplex from sorted uniform cut points.
fn simplex_point<R: Rng>(rng: &mut R, m: usize) -> Vec<f64> {
    let mut cuts: Vec<f64> = (0..m - 1).map(|_| rng.random::<f64>()).collect();
    cuts.push(0.0);
    cuts.push(1.0);
    cuts.sort_by(f64::total_cmp);
    cuts.windows(2).map(|w| w[1] - w[0]).collect()
}

fn binomial(n: usize, k: usize) -> u128 {
    let k = k.min(n - k);
    (0..k).fold(1u128, |acc, i| acc * (n - i) as u128 / (i + 1) as u128)
}

pub(crate) fn nearest_grid_sizes(n: usize, m: usize) -> String {
    let mut below = None;
    let mut h = 1;
    loop {
        let count = binomial(h + m - 1, m - 1);
        if count > n as u128 {
            return match below {
                Some(b) => format!("{b} or {count}"),
                None => count.to_string(),
            };
        }
        below = Some(count);
        h += 1;
    }
}
