//! Labeled, localized objects of one frame.

use crate::core::loaders::PointCloud;
use crate::core::transforms::extract_indices;

/// Height above the centroid where a text label for the object goes.
const LABEL_OFFSET_Z: f32 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub cloud: PointCloud,
    pub centroid: [f32; 3],
}

impl DetectedObject {
    pub fn label_anchor(&self) -> [f32; 3] {
        [
            self.centroid[0],
            self.centroid[1],
            self.centroid[2] + LABEL_OFFSET_Z,
        ]
    }
}

/// Arithmetic mean of the cloud's points, `None` for an empty cloud.
pub fn centroid(cloud: &PointCloud) -> Option<[f32; 3]> {
    if cloud.is_empty() {
        return None;
    }
    let n = cloud.len() as f64;
    let mean = |values: &[f32]| (values.iter().map(|&v| v as f64).sum::<f64>() / n) as f32;
    Some([mean(&cloud.x), mean(&cloud.y), mean(&cloud.z)])
}

/// Pair each cluster of `objects` with its label, keeping cluster order.
///
/// `clusters` and `labels` are zipped, so a cluster without a label (for
/// example one skipped during normal estimation) must be left out of both.
pub fn register_objects(
    objects: &PointCloud,
    clusters: &[Vec<usize>],
    labels: &[String],
) -> Vec<DetectedObject> {
    clusters
        .iter()
        .zip(labels)
        .filter_map(|(indices, label)| {
            let cloud = extract_indices(objects, indices);
            let centroid = centroid(&cloud)?;
            Some(DetectedObject {
                label: label.clone(),
                cloud,
                centroid,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_of_triangle() {
        let cloud = PointCloud::from_coords(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 2.0, 0.0]]);
        let c = centroid(&cloud).unwrap();

        assert!((c[0] - 1.0).abs() < 1e-6);
        assert!((c[1] - 0.667).abs() < 1e-3);
        assert!(c[2].abs() < 1e-6);
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&PointCloud::new()), None);
    }

    #[test]
    fn test_register_objects_in_cluster_order() {
        let objects = PointCloud::from_coords(&[
            [0.0, 0.0, 0.8],
            [1.0, 0.0, 0.8],
            [0.0, 0.2, 0.8],
            [1.0, 0.2, 0.8],
        ]);
        let clusters = vec![vec![0, 2], vec![1, 3]];
        let labels = vec!["soap".to_string(), "glue".to_string()];

        let detected = register_objects(&objects, &clusters, &labels);

        assert_eq!(detected.len(), 2);
        assert_eq!(detected[0].label, "soap");
        assert_eq!(detected[1].label, "glue");
        assert!((detected[0].centroid[1] - 0.1).abs() < 1e-6);
        assert!((detected[1].centroid[0] - 1.0).abs() < 1e-6);
        assert_eq!(detected[0].cloud.len(), 2);

        let anchor = detected[0].label_anchor();
        assert!((anchor[2] - 1.2).abs() < 1e-6);
    }
}
