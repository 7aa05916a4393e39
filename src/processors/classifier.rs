//! Cluster classification with a pre-trained model artifact.
//!
//! The artifact bundles a standard scaler, a linear or nearest-centroid model
//! and the ordered label table. It is validated once when loaded; after that
//! every prediction is a pure function of the feature vector.
//!
//! ```yaml
//! scaler:
//!   mean: [0.1, 0.2]
//!   scale: [1.0, 0.5]
//! classifier:
//!   kind: linear
//!   weights: [[1.0, -1.0], [-1.0, 1.0]]
//!   intercepts: [0.0, 0.0]
//! classes: [soap, biscuits]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML model artifact: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON model artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model label table is empty")]
    EmptyLabelSet,

    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("model predicts {outputs} classes but the label table has {labels}")]
    ClassCountMismatch { outputs: usize, labels: usize },

    #[error("feature vector has length {found}, model expects {expected}")]
    FeatureLength { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Per-feature standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    /// Zero scale is treated as 1 so constant features pass through centred.
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&mean, &scale))| {
                let scale = if scale == 0.0 { 1.0 } else { scale };
                (x - mean) / scale
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    /// One weight row and intercept per class; a single row is a binary
    /// model whose positive score selects class 1.
    Linear {
        weights: Vec<Vec<f32>>,
        intercepts: Vec<f32>,
    },
    NearestCentroid { centroids: Vec<Vec<f32>> },
}

impl ClassifierModel {
    fn rows(&self) -> &[Vec<f32>] {
        match self {
            Self::Linear { weights, .. } => weights,
            Self::NearestCentroid { centroids } => centroids,
        }
    }

    fn output_count(&self) -> usize {
        match self {
            Self::Linear { weights, .. } if weights.len() == 1 => 2,
            _ => self.rows().len(),
        }
    }

    fn predict(&self, x: &[f32]) -> usize {
        match self {
            Self::Linear {
                weights,
                intercepts,
            } => {
                let scores: Vec<f32> = weights
                    .iter()
                    .zip(intercepts)
                    .map(|(w, b)| dot(w, x) + b)
                    .collect();
                if scores.len() == 1 {
                    usize::from(scores[0] > 0.0)
                } else {
                    first_extreme(&scores, |a, b| a > b)
                }
            }
            Self::NearestCentroid { centroids } => {
                let distances: Vec<f32> = centroids
                    .iter()
                    .map(|c| c.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum::<f32>())
                    .collect();
                first_extreme(&distances, |a, b| a < b)
            }
        }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Index of the best value under `better`; the first index wins ties.
fn first_extreme(values: &[f32], better: impl Fn(f32, f32) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = i;
        }
    }
    best
}

/// Serialized model as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub scaler: StandardScaler,
    pub classifier: ClassifierModel,
    pub classes: Vec<String>,
}

/// Read a model artifact; `.json` files are parsed as JSON, anything else
/// as YAML.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<ModelArtifact> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let artifact = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(artifact)
}

/// Validated classifier with an immutable label table.
#[derive(Debug, Clone)]
pub struct Classifier {
    scaler: StandardScaler,
    model: ClassifierModel,
    classes: Vec<String>,
}

impl Classifier {
    /// Check that the scaler, model and label table agree with each other.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        let ModelArtifact {
            scaler,
            classifier,
            classes,
        } = artifact;

        if classes.is_empty() {
            return Err(ModelError::EmptyLabelSet);
        }

        let dim = scaler.mean.len();
        if scaler.scale.len() != dim {
            return Err(ModelError::DimensionMismatch {
                what: "scaler scale",
                expected: dim,
                found: scaler.scale.len(),
            });
        }

        for row in classifier.rows() {
            if row.len() != dim {
                return Err(ModelError::DimensionMismatch {
                    what: "model row",
                    expected: dim,
                    found: row.len(),
                });
            }
        }

        if let ClassifierModel::Linear {
            weights,
            intercepts,
        } = &classifier
        {
            if intercepts.len() != weights.len() {
                return Err(ModelError::DimensionMismatch {
                    what: "intercepts",
                    expected: weights.len(),
                    found: intercepts.len(),
                });
            }
        }

        let outputs = classifier.output_count();
        if classifier.rows().is_empty() || outputs != classes.len() {
            return Err(ModelError::ClassCountMismatch {
                outputs,
                labels: classes.len(),
            });
        }

        Ok(Self {
            scaler,
            model: classifier,
            classes,
        })
    }

    /// Load and validate an artifact from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_artifact(load_model(path)?)
    }

    /// Feature vector length the model expects.
    pub fn dimension(&self) -> usize {
        self.scaler.mean.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Label of the predicted class for one feature vector.
    pub fn classify(&self, features: &[f32]) -> Result<&str> {
        if features.len() != self.dimension() {
            return Err(ModelError::FeatureLength {
                expected: self.dimension(),
                found: features.len(),
            });
        }

        let scaled = self.scaler.transform(features);
        let index = self.model.predict(&scaled);
        Ok(&self.classes[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn linear_artifact() -> ModelArtifact {
        ModelArtifact {
            scaler: StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            classifier: ClassifierModel::Linear {
                weights: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, -1.0]],
                intercepts: vec![0.0, 0.0, 0.0],
            },
            classes: vec!["soap".into(), "biscuits".into(), "glue".into()],
        }
    }

    #[test]
    fn test_linear_argmax() {
        let clf = Classifier::from_artifact(linear_artifact()).unwrap();

        assert_eq!(clf.classify(&[2.0, 1.0]).unwrap(), "soap");
        assert_eq!(clf.classify(&[0.0, 3.0]).unwrap(), "biscuits");
        assert_eq!(clf.classify(&[-1.0, -1.0]).unwrap(), "glue");
        // tie between the first two rows
        assert_eq!(clf.classify(&[1.0, 1.0]).unwrap(), "soap");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let clf = Classifier::from_artifact(linear_artifact()).unwrap();
        let features = [0.3, 0.7];
        let first = clf.classify(&features).unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(clf.classify(&features).unwrap(), first);
        }
    }

    #[test]
    fn test_scaler_applies_before_prediction() {
        let mut artifact = linear_artifact();
        artifact.scaler = StandardScaler {
            mean: vec![10.0, 0.0],
            scale: vec![0.0, 2.0],
        };
        let clf = Classifier::from_artifact(artifact).unwrap();

        // x0 - 10 = -2 with zero scale treated as 1, x1 / 2 = 1
        assert_eq!(clf.classify(&[8.0, 2.0]).unwrap(), "biscuits");
    }

    #[test]
    fn test_binary_linear_model() {
        let artifact = ModelArtifact {
            scaler: StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            },
            classifier: ClassifierModel::Linear {
                weights: vec![vec![1.0]],
                intercepts: vec![-0.5],
            },
            classes: vec!["red".into(), "green".into()],
        };
        let clf = Classifier::from_artifact(artifact).unwrap();

        assert_eq!(clf.classify(&[0.0]).unwrap(), "red");
        assert_eq!(clf.classify(&[1.0]).unwrap(), "green");
    }

    #[test]
    fn test_nearest_centroid() {
        let artifact = ModelArtifact {
            scaler: StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            classifier: ClassifierModel::NearestCentroid {
                centroids: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
            },
            classes: vec!["book".into(), "eraser".into()],
        };
        let clf = Classifier::from_artifact(artifact).unwrap();

        assert_eq!(clf.classify(&[0.1, 0.2]).unwrap(), "book");
        assert_eq!(clf.classify(&[0.9, 0.8]).unwrap(), "eraser");
        assert_eq!(clf.classify(&[0.5, 0.5]).unwrap(), "book");
    }

    #[test]
    fn test_validation_failures() {
        let mut empty = linear_artifact();
        empty.classes.clear();
        assert!(matches!(
            Classifier::from_artifact(empty),
            Err(ModelError::EmptyLabelSet)
        ));

        let mut short = linear_artifact();
        short.classes.pop();
        assert!(matches!(
            Classifier::from_artifact(short),
            Err(ModelError::ClassCountMismatch { outputs: 3, labels: 2 })
        ));

        let mut bad_scale = linear_artifact();
        bad_scale.scaler.scale.push(1.0);
        assert!(matches!(
            Classifier::from_artifact(bad_scale),
            Err(ModelError::DimensionMismatch { what: "scaler scale", .. })
        ));

        let mut bad_row = linear_artifact();
        if let ClassifierModel::Linear { weights, .. } = &mut bad_row.classifier {
            weights[1].push(0.0);
        }
        assert!(matches!(
            Classifier::from_artifact(bad_row),
            Err(ModelError::DimensionMismatch { what: "model row", .. })
        ));
    }

    #[test]
    fn test_wrong_feature_length() {
        let clf = Classifier::from_artifact(linear_artifact()).unwrap();
        assert!(matches!(
            clf.classify(&[1.0, 2.0, 3.0]),
            Err(ModelError::FeatureLength { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_load_yaml_and_json() {
        let yaml = r#"
scaler:
  mean: [0.0, 0.0]
  scale: [1.0, 1.0]
classifier:
  kind: nearest_centroid
  centroids: [[0.0, 0.0], [1.0, 1.0]]
classes: [biscuits, soap]
"#;
        let mut yaml_file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        yaml_file.write_all(yaml.as_bytes()).unwrap();
        let clf = Classifier::load(yaml_file.path()).unwrap();
        assert_eq!(clf.classes(), &["biscuits".to_string(), "soap".to_string()]);
        assert_eq!(clf.dimension(), 2);

        let json = serde_json::to_string(&linear_artifact()).unwrap();
        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json_file.write_all(json.as_bytes()).unwrap();
        assert_eq!(load_model(json_file.path()).unwrap(), linear_artifact());

        let mut broken = NamedTempFile::new().unwrap();
        broken.write_all(b"classes: [a").unwrap();
        assert!(matches!(load_model(broken.path()), Err(ModelError::Yaml(_))));
    }
}
