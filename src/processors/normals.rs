//! Surface normal estimation.
//!
//! Normals come from outside the pipeline through [`NormalEstimator`]; the
//! pipeline only consumes them. [`KnnNormalEstimator`] is a local PCA
//! estimator for running without an external service.

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use thiserror::Error;

use crate::core::loaders::PointCloud;
use crate::core::transforms::is_finite_point;

const UP: [f32; 3] = [0.0, 0.0, 1.0];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalsError {
    #[error("normal estimation unavailable: {0}")]
    Unavailable(String),

    #[error("normal estimation interrupted")]
    Interrupted,

    #[error("estimator returned {normals} normals for {points} points")]
    CountMismatch { points: usize, normals: usize },
}

/// Source of one unit normal per cluster point.
pub trait NormalEstimator: Send + Sync {
    fn estimate_normals(&self, cluster: &PointCloud) -> Result<Vec<[f32; 3]>, NormalsError>;
}

/// PCA normals over the `k` nearest neighbours of each point, oriented
/// toward +z.
#[derive(Debug, Clone, Copy)]
pub struct KnnNormalEstimator {
    pub k: usize,
}

impl KnnNormalEstimator {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl NormalEstimator for KnnNormalEstimator {
    /// Points with a non-finite coordinate get the +z fallback normal and
    /// are never used as neighbours.
    fn estimate_normals(&self, cluster: &PointCloud) -> Result<Vec<[f32; 3]>, NormalsError> {
        let n = cluster.len();
        let coords = cluster.to_coords();
        let finite: Vec<[f32; 3]> = coords.iter().copied().filter(is_finite_point).collect();
        if finite.len() < 3 {
            return Ok(vec![UP; n]);
        }

        let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(&finite);
        let k = NonZeroUsize::MIN.saturating_add(self.k.clamp(3, finite.len()) - 1);

        let normals = coords
            .par_iter()
            .map(|p| {
                if !is_finite_point(p) {
                    return UP;
                }
                let neighbours: Vec<Vector3<f64>> = tree
                    .nearest_n::<SquaredEuclidean>(p, k)
                    .iter()
                    .map(|nn| {
                        let q = finite[nn.item as usize];
                        Vector3::new(q[0] as f64, q[1] as f64, q[2] as f64)
                    })
                    .collect();
                pca_normal(&neighbours)
            })
            .collect();

        Ok(normals)
    }
}

/// Normal of a neighbourhood: eigenvector of the smallest covariance
/// eigenvalue, flipped so that its z component is non-negative.
fn pca_normal(points: &[Vector3<f64>]) -> [f32; 3] {
    let count = points.len() as f64;
    let mean = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / count;

    let mut covariance = Matrix3::<f64>::zeros();
    for p in points {
        let d = p - mean;
        covariance += d * d.transpose();
    }
    covariance /= count;

    let eigen = SymmetricEigen::new(covariance);
    let smallest = eigen.eigenvalues.imin();
    let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();

    let norm = normal.norm();
    if !(norm >= 1e-12) {
        return UP;
    }
    normal /= norm;
    if normal.z < 0.0 {
        normal = -normal;
    }

    [normal.x as f32, normal.y as f32, normal.z as f32]
}
