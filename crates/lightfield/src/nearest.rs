//! Nearest-view selection.
//!
//! Two interchangeable paths with the same results: [`find_nearest`] scans
//! the captures per query, [`CaptureIndex`] keeps an R*-tree for repeated
//! queries against a growing capture set. Both order by distance and break
//! ties by registry order.

use crate::capture::Positioned;
use glam::DVec3;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::cmp::Ordering;

/// How many captures the viewer projects at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// Nearest capture only.
    #[default]
    Single,
    /// Three nearest captures, blended.
    Blend,
}

impl ProjectionMode {
    pub fn k(self) -> usize {
        match self {
            ProjectionMode::Single => 1,
            ProjectionMode::Blend => 3,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ProjectionMode::Single => ProjectionMode::Blend,
            ProjectionMode::Blend => ProjectionMode::Single,
        }
    }
}

#[inline]
fn by_distance_then_order(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Returns up to `k` items closest to `query`, nearest first.
///
/// `k` is clamped to `items.len()`; an empty input yields an empty result.
pub fn find_nearest<'a, T: Positioned>(k: usize, query: DVec3, items: &'a [T]) -> Vec<&'a T> {
    let k = k.min(items.len());
    if k == 0 {
        return Vec::new();
    }

    let mut keyed: Vec<(f64, usize)> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.position().distance_squared(query), i))
        .collect();

    if k < keyed.len() {
        keyed.select_nth_unstable_by(k - 1, by_distance_then_order);
        keyed.truncate(k);
    }
    keyed.sort_unstable_by(by_distance_then_order);

    keyed.into_iter().map(|(_, i)| &items[i]).collect()
}

/// Inverse-distance weights for blending the selected captures, summing to 1.
///
/// A capture exactly at the query takes the full weight.
pub fn blend_weights<T: Positioned>(query: DVec3, selected: &[T]) -> Vec<f64> {
    let distances: Vec<f64> = selected.iter().map(|s| s.position().distance(query)).collect();

    if let Some(hit) = distances.iter().position(|&d| d == 0.0) {
        return (0..selected.len()).map(|i| if i == hit { 1.0 } else { 0.0 }).collect();
    }

    let inv: Vec<f64> = distances.iter().map(|d| d.recip()).collect();
    let total: f64 = inv.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return vec![0.0; selected.len()];
    }
    inv.into_iter().map(|w| w / total).collect()
}

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Persistent spatial index over capture positions, keyed by registry order.
#[derive(Debug, Default)]
pub struct CaptureIndex {
    tree: RTree<IndexedPoint>,
}

impl CaptureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-loads positions; item `i` is remembered as order `i`.
    pub fn build<T: Positioned>(items: &[T]) -> Self {
        let points = items
            .iter()
            .enumerate()
            .map(|(i, item)| IndexedPoint::new(item.position().to_array(), i))
            .collect();
        tracing::debug!(captures = items.len(), "Built capture index");
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Adds one position. `order` must be the item's registry index.
    pub fn insert(&mut self, position: DVec3, order: usize) {
        self.tree.insert(IndexedPoint::new(position.to_array(), order));
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Registry indices of the `k` nearest positions, nearest first.
    pub fn nearest_indices(&self, k: usize, query: DVec3) -> Vec<usize> {
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }

        // Pull past the k-th hit while distances tie so the order
        // tie-break sees every candidate.
        let mut hits: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
        for (point, d2) in self.tree.nearest_neighbor_iter_with_distance_2(&query.to_array()) {
            if hits.len() >= k && d2 > hits[k - 1].0 {
                break;
            }
            hits.push((d2, point.data));
        }

        hits.sort_unstable_by(by_distance_then_order);
        hits.truncate(k);
        hits.into_iter().map(|(_, i)| i).collect()
    }

    /// Resolves [`Self::nearest_indices`] against the indexed items.
    pub fn nearest<'a, T>(&self, k: usize, query: DVec3, items: &'a [T]) -> Vec<&'a T> {
        self.nearest_indices(k, query)
            .into_iter()
            .filter_map(|i| items.get(i))
            .collect()
    }
}
