//! Tabletop object perception and pick-and-place planning.
//!
//! This crate provides tools for:
//! - Loading PLY and CSV point cloud frames
//! - Statistical outlier removal, voxel downsampling and workspace cropping
//! - RANSAC table segmentation and Euclidean clustering (parallelized)
//! - Color and normal histogram features with a pre-trained classifier
//! - Planning pick-and-place commands for a dual-arm robot and writing them as YAML
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tabletop_perception::{
//!     core::loaders::load_frame, pipeline::{run_frame, PerceptionContext},
//!     processors::KnnNormalEstimator, PipelineConfig,
//! };
//!
//! let config = PipelineConfig::default();
//! let estimator = KnnNormalEstimator::new(config.normals.k);
//! let ctx = PerceptionContext::load(config, Path::new("model.yaml"), Path::new("pick_list_1.yaml")).unwrap();
//! let cloud = load_frame("frame.ply").unwrap();
//! let report = run_frame(&ctx, &cloud, &estimator, None, Path::new(".")).unwrap();
//! println!("{} commands", report.plan.commands.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod planning;
pub mod processors;

pub use config::{
    ClusteringConfig, FeatureConfig, NormalsConfig, PipelineConfig, PlannerConfig,
    PreprocessConfig, SegmentationConfig,
};
pub use core::loaders::PointCloud;
pub use pipeline::{perceive, run_frame, PerceptionContext, PipelineError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
