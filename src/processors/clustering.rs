//! Euclidean clustering of the objects cloud.
//!
//! Two points belong to the same cluster when a chain of points connects
//! them with every hop no longer than the cluster tolerance. The clusters
//! are the connected components of that radius graph, computed with:
//! - `kiddo` KD-tree for radius queries
//! - `rayon` for parallel neighbour finding and merging
//! - Atomic union-find for lock-free component merging
//!
//! # Example
//!
//! ```no_run
//! use tabletop_perception::processors::clustering::euclidean_clusters;
//!
//! let coords = vec![[0.0f32, 0.0, 0.0], [0.01, 0.0, 0.0], [1.0, 1.0, 1.0]];
//! let clusters = euclidean_clusters(&coords, 0.02, 2, 100);
//! assert_eq!(clusters, vec![vec![0, 1]]);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::ClusteringConfig;
use crate::core::loaders::PointCloud;
use crate::core::transforms::is_finite_point;

/// Atomic Union-Find data structure for lock-free parallel component merging.
///
/// Uses path compression with atomic compare-and-swap operations so several
/// threads can merge components without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    ///
    /// A failed compression CAS is harmless: the walk still ends at a root.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge happened, false if they already shared a root.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root points at the larger one
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// Group points into Euclidean clusters.
///
/// # Arguments
///
/// * `coords` - Slice of 3D coordinates [x, y, z] per point
/// * `tolerance` - Maximum hop distance between neighbouring cluster members
/// * `min_size` - Smallest cluster kept (inclusive)
/// * `max_size` - Largest cluster kept (inclusive)
///
/// # Returns
///
/// One index list per kept cluster. Indices within a cluster are ascending
/// and clusters are ordered by their smallest index, so the output is fully
/// determined by the input. No index appears in two clusters.
///
/// Points with a NaN or infinite coordinate join no cluster. A tolerance
/// that is not a positive finite number yields no clusters.
pub fn euclidean_clusters(
    coords: &[[f32; 3]],
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<usize>> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        log::warn!("cluster tolerance {} is not positive, no clusters formed", tolerance);
        return Vec::new();
    }

    // Tree slot -> input index, ascending.
    let finite: Vec<usize> = (0..coords.len())
        .filter(|&i| is_finite_point(&coords[i]))
        .collect();
    if finite.is_empty() {
        return Vec::new();
    }
    if finite.len() < coords.len() {
        log::debug!(
            "euclidean clustering: skipping {} non-finite points",
            coords.len() - finite.len()
        );
    }

    let points: Vec<[f32; 3]> = finite.iter().map(|&i| coords[i]).collect();
    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(&points);
    let tolerance_sq = tolerance * tolerance;
    let uf = AtomicUnionFind::new(points.len());

    points.par_iter().enumerate().for_each(|(a, coord)| {
        for nn in tree.within::<SquaredEuclidean>(coord, tolerance_sq) {
            let b = nn.item as usize;
            if b > a {
                uf.union(a, b);
            }
        }
    });

    // Walking slots in order makes each component's first member its
    // smallest index, which fixes the cluster order.
    let mut root_to_cluster: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    for (slot, &index) in finite.iter().enumerate() {
        let root = uf.find(slot);
        let id = *root_to_cluster.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[id].push(index);
    }

    let total = components.len();
    let clusters: Vec<Vec<usize>> = components
        .into_iter()
        .filter(|c| c.len() >= min_size && c.len() <= max_size)
        .collect();

    log::debug!(
        "euclidean clustering: {} components, {} within size bounds [{}, {}]",
        total,
        clusters.len(),
        min_size,
        max_size
    );

    clusters
}

/// Cluster the objects cloud using the configured tolerance and size bounds.
pub fn extract_clusters(cloud: &PointCloud, config: &ClusteringConfig) -> Vec<Vec<usize>> {
    let coords = cloud.to_coords();
    euclidean_clusters(&coords, config.tolerance, config.min_size, config.max_size)
}

/// Per-point cluster labels: the cluster's position in `clusters`, or -1
/// for points that belong to no kept cluster.
pub fn cluster_labels(point_count: usize, clusters: &[Vec<usize>]) -> Vec<i32> {
    let mut labels = vec![-1i32; point_count];
    for (id, cluster) in clusters.iter().enumerate() {
        for &i in cluster {
            labels[i] = id as i32;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cube of `side^3` points with 1 cm spacing starting at `origin`.
    fn blob(origin: [f32; 3], side: usize) -> Vec<[f32; 3]> {
        let mut points = Vec::new();
        for i in 0..side {
            for j in 0..side {
                for k in 0..side {
                    points.push([
                        origin[0] + i as f32 * 0.01,
                        origin[1] + j as f32 * 0.01,
                        origin[2] + k as f32 * 0.01,
                    ]);
                }
            }
        }
        points
    }

    #[test]
    fn test_atomic_union_find_basic() {
        let uf = AtomicUnionFind::new(5);

        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);

        assert!(uf.union(0, 1));
        assert_eq!(uf.find(0), uf.find(1));

        assert!(uf.union(2, 3));
        assert_eq!(uf.find(2), uf.find(3));
        assert_ne!(uf.find(0), uf.find(2));

        assert!(uf.union(1, 2));
        assert_eq!(uf.find(0), uf.find(3));

        assert!(!uf.union(0, 3));
    }

    #[test]
    fn test_two_separated_blobs() {
        let mut coords = blob([0.0, 0.0, 0.8], 3);
        coords.extend(blob([0.5, 0.5, 0.8], 3));

        let clusters = euclidean_clusters(&coords, 0.015, 5, 100);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], (0..27).collect::<Vec<_>>());
        assert_eq!(clusters[1], (27..54).collect::<Vec<_>>());
    }

    #[test]
    fn test_interleaved_input_keeps_ascending_order() {
        let a = blob([0.0, 0.0, 0.0], 2);
        let b = blob([1.0, 0.0, 0.0], 2);
        let coords: Vec<[f32; 3]> = a.iter().zip(b.iter()).flat_map(|(p, q)| [*p, *q]).collect();

        let clusters = euclidean_clusters(&coords, 0.015, 1, 100);

        assert_eq!(clusters, vec![vec![0, 2, 4, 6, 8, 10, 12, 14], vec![1, 3, 5, 7, 9, 11, 13, 15]]);
    }

    #[test]
    fn test_size_bounds_are_inclusive() {
        let mut coords = blob([0.0, 0.0, 0.0], 2); // 8 points
        coords.extend(blob([1.0, 0.0, 0.0], 3)); // 27 points
        coords.push([5.0, 5.0, 5.0]); // singleton

        let exact = euclidean_clusters(&coords, 0.015, 8, 27);
        assert_eq!(exact.len(), 2);

        let too_small = euclidean_clusters(&coords, 0.015, 9, 27);
        assert_eq!(too_small.len(), 1);
        assert_eq!(too_small[0].len(), 27);

        let too_large = euclidean_clusters(&coords, 0.015, 1, 26);
        assert_eq!(too_large.len(), 2);
        assert_eq!(too_large[0].len(), 8);
        assert_eq!(too_large[1], vec![35]);
    }

    #[test]
    fn test_chain_connects_through_hops() {
        let coords: Vec<[f32; 3]> = (0..10).map(|i| [i as f32 * 0.01, 0.0, 0.0]).collect();

        let clusters = euclidean_clusters(&coords, 0.011, 1, 100);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 10);
    }

    #[test]
    fn test_empty_input() {
        let clusters = euclidean_clusters(&[], 0.01, 1, 10);
        assert!(clusters.is_empty());
        assert!(extract_clusters(&PointCloud::new(), &ClusteringConfig::default()).is_empty());
    }

    #[test]
    fn test_non_positive_tolerance_forms_no_clusters() {
        let coords = blob([0.0, 0.0, 0.0], 3);

        assert!(euclidean_clusters(&coords, 0.0, 1, 100).is_empty());
        assert!(euclidean_clusters(&coords, -0.02, 1, 100).is_empty());
        assert!(euclidean_clusters(&coords, f32::NAN, 1, 100).is_empty());

        let config = ClusteringConfig {
            tolerance: -1.0,
            min_size: 1,
            max_size: 100,
        };
        assert!(extract_clusters(&PointCloud::from_coords(&coords), &config).is_empty());
    }

    #[test]
    fn test_non_finite_points_join_no_cluster() {
        let mut coords = vec![[f32::NAN, 0.0, 0.0]];
        coords.extend(blob([0.0, 0.0, 0.0], 2));
        coords.push([0.0, f32::INFINITY, 0.0]);

        let clusters = euclidean_clusters(&coords, 0.015, 1, 100);

        assert_eq!(clusters, vec![(1..9).collect::<Vec<_>>()]);
        let labels = cluster_labels(coords.len(), &clusters);
        assert_eq!(labels[0], -1);
        assert_eq!(labels[9], -1);
    }

    #[test]
    fn test_axis_aligned_face_is_one_cluster() {
        // 100 points sharing x, more than one tree bucket of equal values.
        let mut cloud = PointCloud::new();
        for j in 0..10 {
            for k in 0..10 {
                cloud.push(0.3, j as f32 * 0.01, 0.75 + k as f32 * 0.01);
            }
        }
        for _ in 0..40 {
            cloud.push(0.3, 0.0, 0.75);
        }
        let config = ClusteringConfig {
            tolerance: 0.015,
            min_size: 10,
            max_size: 500,
        };

        let clusters = extract_clusters(&cloud, &config);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], (0..140).collect::<Vec<_>>());
    }

    #[test]
    fn test_cluster_labels() {
        let labels = cluster_labels(5, &[vec![0, 2], vec![4]]);
        assert_eq!(labels, vec![0, -1, 0, -1, 1]);
    }
}
