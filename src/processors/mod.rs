//! Perception stages, in pipeline order.

pub mod filtering;
pub mod segmentation;
pub mod clustering;
pub mod normals;
pub mod features;
pub mod classifier;
pub mod registry;

// Re-export key types for convenience
pub use classifier::{Classifier, ModelArtifact, ModelError};
pub use clustering::{cluster_labels, euclidean_clusters, extract_clusters};
pub use features::{feature_len, feature_vector};
pub use filtering::{passthrough, preprocess, remove_statistical_outliers, voxel_downsample};
pub use normals::{KnnNormalEstimator, NormalEstimator, NormalsError};
pub use registry::{centroid, register_objects, DetectedObject};
pub use segmentation::{segment_table, GeometryError, PlaneModel, TableSegmentation};
