//! Pareto utilities over objective vectors (minimization).
//!
//! - [`non_dominated_sort`]: fast non-dominated sorting (Deb et al., 2002)
//! - [`crowding_distance`]: diversity measure within a front
//! - [`select_survivors`]: rank-then-crowding truncation of a candidate pool
//! - [`hypervolume`]: exact dominated volume against a reference point
//!
//! # References
//!
//! - Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II"
//! - While, Hingston, Barone & Huband (2006), "A faster algorithm for calculating
//!   hypervolume" (the slicing scheme used by [`hypervolume`])

use std::cmp::Ordering;

/// Result of non-dominated sorting.
#[derive(Debug, Clone, Default)]
pub struct NondominatedSortResult {
    /// Pareto rank per input index (0 = first front).
    pub ranks: Vec<usize>,

    /// Indices grouped by front, each front in ascending index order.
    pub fronts: Vec<Vec<usize>>,
}

/// Pareto dominance between two objective vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dominance {
    Left,
    Right,
    Neither,
}

/// Compares `a` and `b` for Pareto dominance under minimization.
///
/// Identical vectors do not dominate each other.
pub fn dominance(a: &[f64], b: &[f64]) -> Dominance {
    let mut a_better = false;
    let mut b_better = false;

    for (&va, &vb) in a.iter().zip(b) {
        if va < vb {
            a_better = true;
        } else if vb < va {
            b_better = true;
        }
    }

    match (a_better, b_better) {
        (true, false) => Dominance::Left,
        (false, true) => Dominance::Right,
        _ => Dominance::Neither,
    }
}

/// Fast non-dominated sorting, O(m·n²).
///
/// An empty input yields an empty result.
///
/// # Example
///
/// ```
/// use mach_opt::pareto::non_dominated_sort;
///
/// let objs = vec![
///     vec![1.0, 5.0],
///     vec![3.0, 3.0],
///     vec![5.0, 1.0],
///     vec![4.0, 4.0], // dominated by (3, 3)
/// ];
/// let sorted = non_dominated_sort(&objs);
/// assert_eq!(sorted.fronts[0], vec![0, 1, 2]);
/// assert_eq!(sorted.ranks[3], 1);
/// ```
pub fn non_dominated_sort<T: AsRef<[f64]>>(objectives: &[T]) -> NondominatedSortResult {
    let n = objectives.len();
    if n == 0 {
        return NondominatedSortResult::default();
    }

    let mut domination_count = vec![0usize; n];
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut ranks = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            match dominance(objectives[i].as_ref(), objectives[j].as_ref()) {
                Dominance::Left => {
                    dominates[i].push(j);
                    domination_count[j] += 1;
                }
                Dominance::Right => {
                    dominates[j].push(i);
                    domination_count[i] += 1;
                }
                Dominance::Neither => {}
            }
        }
    }

    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    let mut fronts = Vec::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominates[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    ranks[j] = fronts.len() + 1;
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    NondominatedSortResult { ranks, fronts }
}

/// Crowding distance of each vector within the given set.
///
/// Boundary vectors of any objective get `f64::INFINITY`; sets of two or
/// fewer are all boundary.
pub fn crowding_distance<T: AsRef<[f64]>>(objectives: &[T]) -> Vec<f64> {
    let n = objectives.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let m = objectives[0].as_ref().len();
    let mut distances = vec![0.0f64; n];
    let value = |i: usize, k: usize| objectives[i].as_ref()[k];

    for k in 0..m {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| value(a, k).partial_cmp(&value(b, k)).unwrap_or(Ordering::Equal));

        distances[order[0]] = f64::INFINITY;
        distances[order[n - 1]] = f64::INFINITY;

        let range = value(order[n - 1], k) - value(order[0], k);
        if range > 0.0 {
            for w in order.windows(3) {
                distances[w[1]] += (value(w[2], k) - value(w[0], k)) / range;
            }
        }
    }

    distances
}

/// Chooses `k` survivors from a pool: whole fronts first, then the most
/// isolated members (largest crowding distance) of the first front that
/// does not fit.
///
/// Returns pool indices in ascending order so the survivors keep their
/// relative pool order. If `k >= pool.len()` every index is returned.
pub fn select_survivors<T: AsRef<[f64]>>(pool: &[T], k: usize) -> Vec<usize> {
    if k >= pool.len() {
        return (0..pool.len()).collect();
    }

    let sorted = non_dominated_sort(pool);
    let mut chosen = Vec::with_capacity(k);

    for front in &sorted.fronts {
        let room = k - chosen.len();
        if room == 0 {
            break;
        }
        if front.len() <= room {
            chosen.extend_from_slice(front);
            continue;
        }

        let front_objs: Vec<&[f64]> = front.iter().map(|&i| pool[i].as_ref()).collect();
        let distances = crowding_distance(&front_objs);
        let mut order: Vec<usize> = (0..front.len()).collect();
        // Stable sort: ties keep the lower pool index.
        order.sort_by(|&a, &b| {
            distances[b]
                .partial_cmp(&distances[a])
                .unwrap_or(Ordering::Equal)
        });
        chosen.extend(order.into_iter().take(room).map(|i| front[i]));
    }

    chosen.sort_unstable();
    chosen
}

/// Exact hypervolume dominated by `points` and bounded by `reference`.
///
/// Points that are not strictly better than the reference in every
/// objective contribute nothing, so bad-fitness sentinels equal to the
/// reference are ignored.
///
/// # Example
///
/// ```
/// use mach_opt::pareto::hypervolume;
///
/// let front = vec![vec![1.0, 3.0], vec![2.0, 2.0], vec![3.0, 1.0]];
/// let hv = hypervolume(&front, &[4.0, 4.0]);
/// assert!((hv - 6.0).abs() < 1e-12);
/// ```
pub fn hypervolume<T: AsRef<[f64]>>(points: &[T], reference: &[f64]) -> f64 {
    let m = reference.len();
    let inside: Vec<&[f64]> = points
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| p.len() == m && p.iter().zip(reference).all(|(&v, &r)| v < r))
        .collect();

    if inside.is_empty() || m == 0 {
        return 0.0;
    }
    slice_volume(inside, reference, m)
}

/// Hypervolume over the first `dim` coordinates, slicing along the last.
fn slice_volume(mut points: Vec<&[f64]>, reference: &[f64], dim: usize) -> f64 {
    match dim {
        1 => {
            let best = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
            reference[0] - best
        }
        2 => {
            points.sort_by(|a, b| {
                a[0].partial_cmp(&b[0])
                    .unwrap_or(Ordering::Equal)
                    .then(a[1].partial_cmp(&b[1]).unwrap_or(Ordering::Equal))
            });
            let mut area = 0.0;
            let mut ceiling = reference[1];
            for p in points {
                if p[1] < ceiling {
                    area += (reference[0] - p[0]) * (ceiling - p[1]);
                    ceiling = p[1];
                }
            }
            area
        }
        _ => {
            let last = dim - 1;
            points.sort_by(|a, b| a[last].partial_cmp(&b[last]).unwrap_or(Ordering::Equal));
            let mut volume = 0.0;
            for i in 0..points.len() {
                let top = points.get(i + 1).map_or(reference[last], |p| p[last]);
                let depth = top - points[i][last];
                if depth > 0.0 {
                    volume += slice_volume(points[..=i].to_vec(), reference, last) * depth;
                }
            }
            volume
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
