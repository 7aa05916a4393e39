//! Point cloud index extraction and color helpers.
//!
//! Stages hand clouds to each other by value; the helpers here build new
//! clouds from index lists rather than filtering in place.

use rayon::prelude::*;

use super::loaders::PointCloud;

/// Color palette for the cluster mask cloud, cycled when there are more
/// clusters than entries.
const CLUSTER_COLORS: &[[u8; 3]] = &[
    [228, 26, 28],   // Red
    [55, 126, 184],  // Blue
    [77, 175, 74],   // Green
    [152, 78, 163],  // Purple
    [255, 127, 0],   // Orange
    [255, 255, 51],  // Yellow
    [166, 86, 40],   // Brown
    [247, 129, 191], // Pink
    [153, 153, 153], // Gray
    [0, 206, 209],   // Turquoise
    [138, 43, 226],  // Blue Violet
    [50, 205, 50],   // Lime Green
    [255, 20, 147],  // Deep Pink
    [0, 191, 255],   // Deep Sky Blue
    [255, 215, 0],   // Gold
];

/// Build a new cloud holding the points at `indices`, in that order.
///
/// Colors are carried over when the source cloud has them.
pub fn extract_indices(cloud: &PointCloud, indices: &[usize]) -> PointCloud {
    let x = indices.iter().map(|&i| cloud.x[i]).collect();
    let y = indices.iter().map(|&i| cloud.y[i]).collect();
    let z = indices.iter().map(|&i| cloud.z[i]).collect();
    let colors = cloud
        .colors
        .as_ref()
        .map(|c| indices.iter().map(|&i| c[i]).collect());

    PointCloud { x, y, z, colors }
}

/// Whether all three coordinates of `p` are finite.
pub fn is_finite_point(p: &[f32; 3]) -> bool {
    p.iter().all(|v| v.is_finite())
}

/// Indices of the points whose coordinates are all finite, ascending.
pub fn finite_indices(cloud: &PointCloud) -> Vec<usize> {
    (0..cloud.len())
        .filter(|&i| is_finite_point(&cloud.point(i)))
        .collect()
}

/// Drop points with a NaN or infinite coordinate, keeping source order.
pub fn remove_non_finite(cloud: &PointCloud) -> PointCloud {
    let kept = finite_indices(cloud);
    if kept.len() == cloud.len() {
        return cloud.clone();
    }
    log::debug!("dropped {} non-finite points", cloud.len() - kept.len());
    extract_indices(cloud, &kept)
}

/// Partition a cloud into the points at `indices` and everything else.
///
/// Every input point lands in exactly one of the two outputs. Duplicate
/// indices are only taken once; both outputs keep the source order.
pub fn split_by_indices(cloud: &PointCloud, indices: &[usize]) -> (PointCloud, PointCloud) {
    let mut selected = vec![false; cloud.len()];
    for &i in indices {
        selected[i] = true;
    }

    let (inside, outside): (Vec<usize>, Vec<usize>) =
        (0..cloud.len()).partition(|&i| selected[i]);

    (extract_indices(cloud, &inside), extract_indices(cloud, &outside))
}

/// Convert an RGB color to HSV, all channels on [0, 1].
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    [hue, saturation, max]
}

/// Deterministic palette with one color per cluster.
pub fn cluster_palette(count: usize) -> Vec<[u8; 3]> {
    (0..count)
        .map(|i| CLUSTER_COLORS[i % CLUSTER_COLORS.len()])
        .collect()
}

/// Build the cluster mask cloud: the points of every cluster, each cluster
/// painted with its own palette color.
pub fn colorize_clusters(cloud: &PointCloud, clusters: &[Vec<usize>]) -> PointCloud {
    let palette = cluster_palette(clusters.len());
    let total: usize = clusters.iter().map(Vec::len).sum();

    let painted: Vec<([f32; 3], [u8; 3])> = clusters
        .par_iter()
        .zip(palette.par_iter())
        .flat_map_iter(|(indices, &color)| indices.iter().map(move |&i| (cloud.point(i), color)))
        .collect();

    let mut mask = PointCloud::with_capacity(total);
    for (p, color) in painted {
        mask.push_with_color(p[0], p[1], p[2], color);
    }
    mask
}
