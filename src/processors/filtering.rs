//! Frame preprocessing: statistical outlier removal, voxel downsampling and
//! the workspace range crop.
//!
//! Every filter is a pure transform that returns a new cloud no larger than
//! its input. An empty cloud passes through as an empty cloud. Points with a
//! NaN or infinite coordinate never survive `preprocess`.

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::{Axis, PreprocessConfig};
use crate::core::loaders::PointCloud;
use crate::core::transforms::{extract_indices, is_finite_point, remove_non_finite};

/// Above this many points the voxel key sort runs in parallel.
const PARALLEL_SORT_THRESHOLD: usize = 10_000;

/// Remove sparse noise by neighbour-distance statistics.
///
/// For every point the mean distance to its `mean_k` nearest neighbours is
/// computed (the point itself excluded). Points whose mean distance exceeds
/// `mu + std_dev_mul * sigma` over the whole cloud are dropped.
///
/// `mean_k == 0` disables the filter. Otherwise non-finite points are
/// dropped first. With fewer than `mean_k + 1` points the neighbourhood
/// shrinks to the rest of the cloud.
pub fn remove_statistical_outliers(
    cloud: &PointCloud,
    mean_k: usize,
    std_dev_mul: f32,
) -> PointCloud {
    if mean_k == 0 {
        return cloud.clone();
    }

    let cloud = &remove_non_finite(cloud);
    let n = cloud.len();
    if n < 2 {
        return cloud.clone();
    }

    let k = mean_k.min(n - 1);
    let query_len = NonZeroUsize::MIN.saturating_add(k);
    let coords = cloud.to_coords();
    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(&coords);

    // The query point comes back as its own neighbour at distance zero, so
    // asking for k + 1 and dividing by k gives the mean over the others.
    let mean_distances: Vec<f64> = coords
        .par_iter()
        .map(|p| {
            let neighbours = tree.nearest_n::<SquaredEuclidean>(p, query_len);
            let total: f64 = neighbours
                .iter()
                .map(|nn| (nn.distance as f64).sqrt())
                .sum();
            total / k as f64
        })
        .collect();

    let count = n as f64;
    let sum: f64 = mean_distances.iter().sum();
    let sq_sum: f64 = mean_distances.iter().map(|d| d * d).sum();
    let mean = sum / count;
    let variance = ((sq_sum - sum * sum / count) / (count - 1.0)).max(0.0);
    let threshold = mean + std_dev_mul as f64 * variance.sqrt();

    let kept: Vec<usize> = mean_distances
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect();

    log::debug!(
        "outlier filter: kept {} of {} points (threshold {:.5})",
        kept.len(),
        n,
        threshold
    );

    extract_indices(cloud, &kept)
}

/// Downsample a cloud on a regular voxel grid.
///
/// Each occupied cubic cell of edge `leaf_size` is replaced by the centroid
/// of its points; colors are averaged per channel. Output points are ordered
/// by cell key, so the result does not depend on input order beyond float
/// summation. Non-finite points fall in no cell and are dropped.
/// `leaf_size <= 0` returns a copy.
pub fn voxel_downsample(cloud: &PointCloud, leaf_size: f32) -> PointCloud {
    if leaf_size <= 0.0 || cloud.is_empty() {
        return cloud.clone();
    }

    let n = cloud.len();
    let inv_leaf = 1.0 / leaf_size as f64;
    let cell = |v: f32| (v as f64 * inv_leaf).floor() as i64;

    let mut keyed: Vec<((i64, i64, i64), usize)> = (0..n)
        .filter(|&i| is_finite_point(&cloud.point(i)))
        .map(|i| ((cell(cloud.x[i]), cell(cloud.y[i]), cell(cloud.z[i])), i))
        .collect();

    if n > PARALLEL_SORT_THRESHOLD {
        keyed.par_sort_unstable();
    } else {
        keyed.sort_unstable();
    }

    let mut out = PointCloud::with_capacity(n);
    let has_colors = cloud.colors.is_some();

    for group in keyed.chunk_by(|a, b| a.0 == b.0) {
        let count = group.len() as f64;
        let mut sum = [0.0f64; 3];
        let mut color_sum = [0u32; 3];

        for &(_, i) in group {
            let p = cloud.point(i);
            for axis in 0..3 {
                sum[axis] += p[axis] as f64;
            }
            if let Some(c) = cloud.color(i) {
                for ch in 0..3 {
                    color_sum[ch] += c[ch] as u32;
                }
            }
        }

        let x = (sum[0] / count) as f32;
        let y = (sum[1] / count) as f32;
        let z = (sum[2] / count) as f32;

        if has_colors {
            let avg = |ch: usize| (color_sum[ch] as f64 / count).round() as u8;
            out.push_with_color(x, y, z, [avg(0), avg(1), avg(2)]);
        } else {
            out.push(x, y, z);
        }
    }

    out
}

/// Keep only points whose coordinate along `axis` lies in `[min, max]`.
pub fn passthrough(cloud: &PointCloud, axis: Axis, min: f32, max: f32) -> PointCloud {
    let values = match axis {
        Axis::X => &cloud.x,
        Axis::Y => &cloud.y,
        Axis::Z => &cloud.z,
    };

    let kept: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v >= min && v <= max)
        .map(|(i, _)| i)
        .collect();

    extract_indices(cloud, &kept)
}

/// Run the full preprocessing chain: outlier removal, voxel grid, range crop.
///
/// Non-finite points are dropped before any filter runs.
pub fn preprocess(cloud: &PointCloud, config: &PreprocessConfig) -> PointCloud {
    let finite = remove_non_finite(cloud);
    let denoised = remove_statistical_outliers(&finite, config.mean_k, config.std_dev_mul);
    let downsampled = voxel_downsample(&denoised, config.leaf_size);
    let cropped = passthrough(&downsampled, config.axis, config.axis_min, config.axis_max);

    log::debug!(
        "preprocess: {} raw -> {} denoised -> {} voxels -> {} in workspace",
        cloud.len(),
        denoised.len(),
        downsampled.len(),
        cropped.len()
    );

    cropped
}
