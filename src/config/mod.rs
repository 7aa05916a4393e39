//! Configuration types for the perception pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coordinate axis used by the range crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Color representation binned by the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Rgb,
    Hsv,
}

/// Configuration for noise removal, downsampling and the workspace crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Neighbours considered by the statistical outlier filter (0 disables it)
    #[serde(default = "default_mean_k")]
    pub mean_k: usize,

    /// Standard deviation multiplier for the outlier threshold
    #[serde(default = "default_std_dev_mul")]
    pub std_dev_mul: f32,

    /// Voxel edge length
    #[serde(default = "default_leaf_size")]
    pub leaf_size: f32,

    /// Axis used by the range crop
    #[serde(default = "default_axis")]
    pub axis: Axis,

    /// Lower bound of the range crop (inclusive)
    #[serde(default = "default_axis_min")]
    pub axis_min: f32,

    /// Upper bound of the range crop (inclusive)
    #[serde(default = "default_axis_max")]
    pub axis_max: f32,
}

fn default_mean_k() -> usize {
    50
}

fn default_std_dev_mul() -> f32 {
    1.0
}

fn default_leaf_size() -> f32 {
    0.01
}

fn default_axis() -> Axis {
    Axis::Z
}

fn default_axis_min() -> f32 {
    0.6
}

fn default_axis_max() -> f32 {
    1.1
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mean_k: default_mean_k(),
            std_dev_mul: default_std_dev_mul(),
            leaf_size: default_leaf_size(),
            axis: default_axis(),
            axis_min: default_axis_min(),
            axis_max: default_axis_max(),
        }
    }
}

/// Configuration for RANSAC table segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Maximum point-to-plane distance for an inlier
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// RANSAC iteration budget
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Sampler seed; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_distance_threshold() -> f32 {
    0.01
}

fn default_max_iterations() -> usize {
    100
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            max_iterations: default_max_iterations(),
            seed: None,
        }
    }
}

/// Configuration for Euclidean cluster extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighbourhood radius used to grow clusters
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Smallest cluster kept
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Largest cluster kept
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_tolerance() -> f32 {
    0.001
}

fn default_min_size() -> usize {
    10
}

fn default_max_size() -> usize {
    250
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

/// Configuration for histogram features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Bins per channel
    #[serde(default = "default_bins")]
    pub bins: usize,

    /// Color representation for the color histogram
    #[serde(default = "default_color_space")]
    pub color_space: ColorSpace,
}

fn default_bins() -> usize {
    32
}

fn default_color_space() -> ColorSpace {
    ColorSpace::Rgb
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            color_space: default_color_space(),
        }
    }
}

/// Configuration for the built-in k-NN normal estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalsConfig {
    #[serde(default = "default_normals_k")]
    pub k: usize,
}

fn default_normals_k() -> usize {
    15
}

impl Default for NormalsConfig {
    fn default() -> Self {
        Self {
            k: default_normals_k(),
        }
    }
}

/// Configuration for task planning and command dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Scene identifier stamped on every command
    #[serde(default = "default_scene_id")]
    pub scene_id: u32,

    /// How long to wait for the executor to become ready, in seconds
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: f64,

    /// Readiness poll interval, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_scene_id() -> u32 {
    1
}

fn default_ready_timeout_secs() -> f64 {
    30.0
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            scene_id: default_scene_id(),
            ready_timeout_secs: default_ready_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub normals: NormalsConfig,

    #[serde(default)]
    pub planner: PlannerConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preprocess_config() {
        let config = PreprocessConfig::default();
        assert_eq!(config.mean_k, 50);
        assert_eq!(config.std_dev_mul, 1.0);
        assert_eq!(config.leaf_size, 0.01);
        assert_eq!(config.axis, Axis::Z);
        assert_eq!((config.axis_min, config.axis_max), (0.6, 1.1));
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.segmentation.distance_threshold, 0.01);
        assert_eq!(config.clustering.min_size, 10);
        assert_eq!(config.clustering.max_size, 250);
        assert_eq!(config.features.bins, 32);
        assert_eq!(config.planner.scene_id, 1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "clustering:\n  tolerance: 0.02\nfeatures:\n  color_space: hsv\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.clustering.tolerance, 0.02);
        assert_eq!(config.clustering.min_size, 10);
        assert_eq!(config.features.color_space, ColorSpace::Hsv);
        assert_eq!(config.preprocess.axis, Axis::Z);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.segmentation.seed = Some(7);
        config.planner.scene_id = 3;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.segmentation.seed, Some(7));
        assert_eq!(loaded.planner.scene_id, 3);
    }
}
