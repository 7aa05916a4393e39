//! Per-cluster feature vectors: color histogram followed by normal histogram.

use crate::config::{ColorSpace, FeatureConfig};
use crate::core::loaders::PointCloud;
use crate::core::transforms::rgb_to_hsv;
use crate::core::writers::DEFAULT_COLOR;

/// Length of every feature vector produced with `config`.
pub fn feature_len(config: &FeatureConfig) -> usize {
    6 * config.bins
}

/// Histogram of `values` over `[min, max]` with `bins` equal bins, normalized
/// to sum 1. Values outside the range land in the edge bins. No values gives
/// an all-zero histogram.
fn normalized_histogram(values: impl Iterator<Item = f32>, bins: usize, min: f32, max: f32) -> Vec<f32> {
    if bins == 0 {
        return Vec::new();
    }
    let mut counts = vec![0u32; bins];

    let width = (max - min) / bins as f32;
    let mut total = 0u32;
    for v in values {
        let bin = ((v - min) / width).floor();
        let bin = if bin.is_nan() { 0 } else { (bin.max(0.0) as usize).min(bins - 1) };
        counts[bin] += 1;
        total += 1;
    }

    if total == 0 {
        return vec![0.0; bins];
    }
    counts.iter().map(|&c| c as f32 / total as f32).collect()
}

/// Per-channel color histogram, channels concatenated (`3 * bins` values).
///
/// RGB channels are binned on [0, 256). HSV channels are scaled from [0, 1]
/// onto the same range first.
pub fn color_histogram(colors: &[[u8; 3]], bins: usize, color_space: ColorSpace) -> Vec<f32> {
    let channels: Vec<[f32; 3]> = match color_space {
        ColorSpace::Rgb => colors
            .iter()
            .map(|c| [c[0] as f32, c[1] as f32, c[2] as f32])
            .collect(),
        ColorSpace::Hsv => colors
            .iter()
            .map(|&c| {
                let hsv = rgb_to_hsv(c);
                [hsv[0] * 255.0, hsv[1] * 255.0, hsv[2] * 255.0]
            })
            .collect(),
    };

    (0..3)
        .flat_map(|ch| normalized_histogram(channels.iter().map(|c| c[ch]), bins, 0.0, 256.0))
        .collect()
}

/// Per-component histogram of unit normals over [-1, 1] (`3 * bins` values).
pub fn normal_histogram(normals: &[[f32; 3]], bins: usize) -> Vec<f32> {
    (0..3)
        .flat_map(|axis| normalized_histogram(normals.iter().map(|n| n[axis]), bins, -1.0, 1.0))
        .collect()
}

/// Feature vector of one cluster. Points without color count as the default
/// gray.
pub fn feature_vector(cluster: &PointCloud, normals: &[[f32; 3]], config: &FeatureConfig) -> Vec<f32> {
    let colors: Vec<[u8; 3]> = (0..cluster.len())
        .map(|i| cluster.color(i).unwrap_or(DEFAULT_COLOR))
        .collect();

    let mut features = color_histogram(&colors, config.bins, config.color_space);
    features.extend(normal_histogram(normals, config.bins));
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(v: &[f32]) -> f32 {
        v.iter().sum()
    }

    #[test]
    fn test_color_histogram_rgb() {
        let colors = vec![[0, 128, 255], [255, 128, 0]];
        let hist = color_histogram(&colors, 4, ColorSpace::Rgb);

        assert_eq!(hist.len(), 12);
        // red: one in bin 0, one in bin 3
        assert_eq!(&hist[0..4], &[0.5, 0.0, 0.0, 0.5]);
        // green: both in bin 2
        assert_eq!(&hist[4..8], &[0.0, 0.0, 1.0, 0.0]);
        for ch in hist.chunks(4) {
            assert!((sum(ch) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_color_histogram_hsv() {
        let hist = color_histogram(&[[0, 255, 0]], 3, ColorSpace::Hsv);

        // hue 1/3 -> 85 -> bin 0 of [0, 85.33); full saturation and value -> last bin
        assert_eq!(&hist[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&hist[3..6], &[0.0, 0.0, 1.0]);
        assert_eq!(&hist[6..9], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_normal_histogram_clamps_edges() {
        let normals = vec![[0.0, 0.0, 1.0], [-1.0, 0.5, 1.0]];
        let hist = normal_histogram(&normals, 4);

        assert_eq!(&hist[0..4], &[0.5, 0.0, 0.5, 0.0]);
        assert_eq!(&hist[4..8], &[0.0, 0.0, 0.5, 0.5]);
        assert_eq!(&hist[8..12], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_empty_channels_are_zero() {
        let hist = normal_histogram(&[], 5);
        assert_eq!(hist, vec![0.0; 15]);
        assert!(hist.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_feature_vector_length_and_default_color() {
        let config = FeatureConfig {
            bins: 8,
            color_space: ColorSpace::Rgb,
        };
        let cloud = PointCloud::from_coords(&[[0.0, 0.0, 0.0], [0.1, 0.0, 0.0]]);
        let normals = vec![[0.0, 0.0, 1.0]; 2];

        let features = feature_vector(&cloud, &normals, &config);

        assert_eq!(features.len(), feature_len(&config));
        // gray 180 falls in bin 5 of 8 (width 32)
        assert_eq!(features[5], 1.0);
        assert_eq!(features[8 + 5], 1.0);
    }
}
