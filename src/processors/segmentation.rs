//! Support-surface segmentation with RANSAC plane fitting.
//!
//! The dominant plane of the preprocessed cloud is taken to be the table.
//! Its inliers form the table cloud and every other point goes to the
//! objects cloud, so the two outputs partition the input exactly.

use rand::rngs::StdRng;
use rand::{seq::index, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::SegmentationConfig;
use crate::core::loaders::PointCloud;
use crate::core::transforms::split_by_indices;

/// Twice the triangle area below which three samples count as collinear.
const DEGENERATE_CROSS_NORM: f64 = 1e-12;

/// Errors that abandon a frame before any object is found.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cloud is empty after filtering")]
    EmptyCloud,

    #[error("plane fitting needs at least 3 points, found {found}")]
    TooFewPoints { found: usize },

    #[error("no plane found: every sample was degenerate")]
    NoPlane,
}

/// Plane `normal . p + d = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneModel {
    pub normal: [f32; 3],
    pub d: f32,
}

impl PlaneModel {
    /// Plane through three points, `None` if they are (nearly) collinear.
    pub fn through(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Option<Self> {
        let u = [
            (b[0] - a[0]) as f64,
            (b[1] - a[1]) as f64,
            (b[2] - a[2]) as f64,
        ];
        let v = [
            (c[0] - a[0]) as f64,
            (c[1] - a[1]) as f64,
            (c[2] - a[2]) as f64,
        ];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if norm < DEGENERATE_CROSS_NORM {
            return None;
        }

        let normal = [n[0] / norm, n[1] / norm, n[2] / norm];
        let d = -(normal[0] * a[0] as f64 + normal[1] * a[1] as f64 + normal[2] * a[2] as f64);

        Some(Self {
            normal: [normal[0] as f32, normal[1] as f32, normal[2] as f32],
            d: d as f32,
        })
    }

    /// Unsigned distance from `p` to the plane.
    #[inline]
    pub fn distance(&self, p: &[f32; 3]) -> f32 {
        (self.normal[0] * p[0] + self.normal[1] * p[1] + self.normal[2] * p[2] + self.d).abs()
    }
}

/// Result of splitting a frame into table and objects.
#[derive(Debug, Clone)]
pub struct TableSegmentation {
    pub plane: PlaneModel,
    /// Indices of plane inliers in the segmented cloud.
    pub inliers: Vec<usize>,
    pub table: PointCloud,
    pub objects: PointCloud,
}

/// Fit the dominant plane with RANSAC.
///
/// Each iteration draws 3 distinct points, skips collinear draws, and counts
/// points within `distance_threshold` of the candidate plane. The candidate
/// with the most inliers wins; the first one found wins ties. A `seed` makes
/// the sampler reproducible.
///
/// # Returns
///
/// The winning plane and its inlier indices (ascending).
///
/// # Errors
///
/// [`GeometryError::TooFewPoints`] with fewer than 3 points,
/// [`GeometryError::NoPlane`] if no iteration produced a plane.
pub fn fit_plane_ransac(
    coords: &[[f32; 3]],
    distance_threshold: f32,
    max_iterations: usize,
    seed: Option<u64>,
) -> Result<(PlaneModel, Vec<usize>), GeometryError> {
    let n = coords.len();
    if n < 3 {
        return Err(GeometryError::TooFewPoints { found: n });
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut best: Option<(PlaneModel, usize)> = None;

    for _ in 0..max_iterations {
        let sample = index::sample(&mut rng, n, 3);
        let Some(plane) = PlaneModel::through(
            coords[sample.index(0)],
            coords[sample.index(1)],
            coords[sample.index(2)],
        ) else {
            continue;
        };

        let score = coords
            .par_iter()
            .filter(|p| plane.distance(p) <= distance_threshold)
            .count();

        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((plane, score));
            if score == n {
                break;
            }
        }
    }

    let (plane, _) = best.ok_or(GeometryError::NoPlane)?;

    let inliers: Vec<usize> = coords
        .iter()
        .enumerate()
        .filter(|(_, p)| plane.distance(p) <= distance_threshold)
        .map(|(i, _)| i)
        .collect();

    Ok((plane, inliers))
}

/// Split a cloud into the table (plane inliers) and the objects on it.
pub fn segment_table(
    cloud: &PointCloud,
    config: &SegmentationConfig,
) -> Result<TableSegmentation, GeometryError> {
    if cloud.is_empty() {
        return Err(GeometryError::EmptyCloud);
    }

    let coords = cloud.to_coords();
    let (plane, inliers) = fit_plane_ransac(
        &coords,
        config.distance_threshold,
        config.max_iterations,
        config.seed,
    )?;

    let (table, objects) = split_by_indices(cloud, &inliers);

    log::debug!(
        "table plane n=({:.3}, {:.3}, {:.3}) d={:.3}: {} table / {} object points",
        plane.normal[0],
        plane.normal[1],
        plane.normal[2],
        plane.d,
        table.len(),
        objects.len()
    );

    Ok(TableSegmentation {
        plane,
        inliers,
        table,
        objects,
    })
}
