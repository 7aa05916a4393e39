//! Per-frame orchestration of the perception stages and task planning.
//!
//! A [`PerceptionContext`] is built once at startup and shared by reference
//! with every frame. Frames carry no state between calls: everything a frame
//! accumulates lives in the values returned from [`perceive`] and
//! [`run_frame`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::PointCloud;
use crate::core::transforms::extract_indices;
use crate::core::writers::{scene_output_path, write_pick_place_yaml, WriteError};
use crate::planning::{
    dispatch_commands, plan_pick_place, DispatchReport, PickPlaceExecutor, PlanOutcome,
    PlanningConfig,
};
use crate::processors::classifier::{Classifier, ModelError};
use crate::processors::clustering::extract_clusters;
use crate::processors::features::{feature_len, feature_vector};
use crate::processors::filtering::preprocess;
use crate::processors::normals::{NormalEstimator, NormalsError};
use crate::processors::registry::{register_objects, DetectedObject};
use crate::processors::segmentation::{segment_table, GeometryError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame abandoned: {0}")]
    Geometry(#[from] GeometryError),

    #[error("frame interrupted")]
    Interrupted,

    #[error("classification failed: {0}")]
    Model(#[from] ModelError),

    #[error("failed to write scene output: {0}")]
    Output(#[from] WriteError),
}

/// Everything a frame needs that does not change between frames.
#[derive(Debug, Clone)]
pub struct PerceptionContext {
    pub config: PipelineConfig,
    pub classifier: Classifier,
    pub planning: PlanningConfig,
}

impl PerceptionContext {
    /// Assemble a context, checking that the model consumes the feature
    /// vectors this configuration produces.
    pub fn new(
        config: PipelineConfig,
        classifier: Classifier,
        planning: PlanningConfig,
    ) -> Result<Self, ModelError> {
        let expected = feature_len(&config.features);
        if classifier.dimension() != expected {
            return Err(ModelError::DimensionMismatch {
                what: "feature vector",
                expected,
                found: classifier.dimension(),
            });
        }

        Ok(Self {
            config,
            classifier,
            planning,
        })
    }

    /// Load the model artifact and planning tables from disk.
    pub fn load(config: PipelineConfig, model_path: &Path, planning_path: &Path) -> anyhow::Result<Self> {
        let classifier = Classifier::load(model_path)
            .with_context(|| format!("failed to load model from {}", model_path.display()))?;
        log::info!(
            "Loaded model with {} classes: {:?}",
            classifier.classes().len(),
            classifier.classes()
        );

        let planning = PlanningConfig::from_yaml(planning_path).map_err(|e| {
            anyhow!(
                "failed to load planning tables from {}: {}",
                planning_path.display(),
                e
            )
        })?;

        Self::new(config, classifier, planning)
            .context("model does not match the feature configuration")
    }
}

/// Intermediate clouds of one frame.
#[derive(Debug, Clone)]
pub struct FrameClouds {
    pub filtered: PointCloud,
    pub table: PointCloud,
    pub objects: PointCloud,
}

/// Result of the perception stages for one frame.
#[derive(Debug, Clone)]
pub struct Perception {
    pub clouds: FrameClouds,
    /// Every cluster within the size bounds, as indices into `clouds.objects`.
    pub clusters: Vec<Vec<usize>>,
    pub detections: Vec<DetectedObject>,
}

impl Perception {
    pub fn labels(&self) -> Vec<&str> {
        self.detections.iter().map(|d| d.label.as_str()).collect()
    }
}

/// Run preprocessing, segmentation, clustering, classification and
/// registration on one frame.
///
/// Clusters whose normals cannot be estimated are skipped with a warning.
///
/// # Errors
///
/// [`PipelineError::Geometry`] when no table can be found and
/// [`PipelineError::Interrupted`] when normal estimation is interrupted.
pub fn perceive(
    ctx: &PerceptionContext,
    cloud: &PointCloud,
    estimator: &dyn NormalEstimator,
) -> Result<Perception, PipelineError> {
    let config = &ctx.config;

    let filtered = preprocess(cloud, &config.preprocess);
    let segmentation = segment_table(&filtered, &config.segmentation)?;
    let objects = segmentation.objects;
    let clusters = extract_clusters(&objects, &config.clustering);

    let mut classified = Vec::with_capacity(clusters.len());
    let mut labels = Vec::with_capacity(clusters.len());

    for (index, cluster) in clusters.iter().enumerate() {
        let cluster_cloud = extract_indices(&objects, cluster);

        let normals = match estimator.estimate_normals(&cluster_cloud) {
            Ok(normals) if normals.len() == cluster_cloud.len() => normals,
            Ok(normals) => {
                let e = NormalsError::CountMismatch {
                    points: cluster_cloud.len(),
                    normals: normals.len(),
                };
                log::warn!("cluster {}: {}; skipping", index, e);
                continue;
            }
            Err(NormalsError::Interrupted) => return Err(PipelineError::Interrupted),
            Err(e) => {
                log::warn!("cluster {}: {}; skipping", index, e);
                continue;
            }
        };

        let features = feature_vector(&cluster_cloud, &normals, &config.features);
        let label = ctx.classifier.classify(&features)?;

        classified.push(cluster.clone());
        labels.push(label.to_string());
    }

    let detections = register_objects(&objects, &classified, &labels);
    log::info!("Detected {} objects: {:?}", detections.len(), labels);

    Ok(Perception {
        clouds: FrameClouds {
            filtered,
            table: segmentation.table,
            objects,
        },
        clusters,
        detections,
    })
}

/// Summary of a fully processed frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub perception: Perception,
    pub plan: PlanOutcome,
    /// `None` when no executor was given.
    pub dispatch: Option<DispatchReport>,
    pub output_path: PathBuf,
}

/// Perceive a frame, plan pick-and-place commands, optionally dispatch them
/// and write the scene output to `output_dir`.
///
/// # Errors
///
/// Besides the [`perceive`] errors, [`PipelineError::Interrupted`] when the
/// executor is interrupted (nothing is written) and [`PipelineError::Output`]
/// when the scene file cannot be written.
pub fn run_frame(
    ctx: &PerceptionContext,
    cloud: &PointCloud,
    estimator: &dyn NormalEstimator,
    executor: Option<&dyn PickPlaceExecutor>,
    output_dir: &Path,
) -> Result<FrameReport, PipelineError> {
    let perception = perceive(ctx, cloud, estimator)?;
    let planner = &ctx.config.planner;

    let plan = plan_pick_place(
        &perception.detections,
        &ctx.planning.object_list,
        &ctx.planning.dropbox,
        planner.scene_id,
    );

    let dispatch = match executor {
        Some(executor) => {
            let timeout = Duration::try_from_secs_f64(planner.ready_timeout_secs).unwrap_or(Duration::ZERO);
            let poll = Duration::from_millis(planner.poll_interval_ms);
            // dispatch only returns an error on interruption
            let report = dispatch_commands(executor, &plan.commands, timeout, poll)
                .map_err(|_| PipelineError::Interrupted)?;
            Some(report)
        }
        None => None,
    };

    let output_path = scene_output_path(output_dir, planner.scene_id);
    write_pick_place_yaml(&output_path, &plan.commands)?;
    log::info!(
        "Wrote {} command(s) -> {}",
        plan.commands.len(),
        output_path.display()
    );

    Ok(FrameReport {
        perception,
        plan,
        dispatch,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorSpace, PreprocessConfig};
    use crate::processors::KnnNormalEstimator;
    use crate::core::writers::read_pick_place_yaml;
    use crate::planning::{Arm, DropBoxEntry, ExecutorError, PickListEntry, PickPlaceCommand, PlanningIssue};
    use crate::processors::classifier::{ClassifierModel, ModelArtifact, StandardScaler};
    use tempfile::TempDir;

    const BINS: usize = 4;
    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];

    /// Returns straight-up normals for every point.
    struct UpNormals;

    impl NormalEstimator for UpNormals {
        fn estimate_normals(&self, cluster: &PointCloud) -> Result<Vec<[f32; 3]>, NormalsError> {
            Ok(vec![[0.0, 0.0, 1.0]; cluster.len()])
        }
    }

    struct FailingNormals(NormalsError);

    impl NormalEstimator for FailingNormals {
        fn estimate_normals(&self, _cluster: &PointCloud) -> Result<Vec<[f32; 3]>, NormalsError> {
            Err(self.0.clone())
        }
    }

    struct InterruptingExecutor;

    impl PickPlaceExecutor for InterruptingExecutor {
        fn is_ready(&self) -> bool {
            true
        }

        fn execute(&self, _command: &PickPlaceCommand) -> Result<bool, ExecutorError> {
            Err(ExecutorError::Interrupted)
        }
    }

    /// 30 x 30 gray table at z = 0.70 with a red and a green 4 x 4 x 4 block
    /// on it. Grid points sit at voxel centres so downsampling keeps them.
    fn scene() -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..30 {
            for j in 0..30 {
                let x = 0.005 + i as f32 * 0.01;
                let y = 0.005 + j as f32 * 0.01;
                cloud.push_with_color(x, y, 0.70, [128, 128, 128]);
            }
        }
        for (origin, color) in [(0.055f32, RED), (0.205f32, GREEN)] {
            for i in 0..4 {
                for j in 0..4 {
                    for k in 0..4 {
                        cloud.push_with_color(
                            origin + i as f32 * 0.01,
                            origin + j as f32 * 0.01,
                            0.755 + k as f32 * 0.01,
                            color,
                        );
                    }
                }
            }
        }
        cloud
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.preprocess.mean_k = 0;
        config.segmentation.seed = Some(7);
        config.clustering.tolerance = 0.015;
        config.features.bins = BINS;
        config.features.color_space = ColorSpace::Rgb;
        config
    }

    /// Scores the last red bin for soap and the last green bin for biscuits.
    fn classifier() -> Classifier {
        let dim = 6 * BINS;
        let mut soap = vec![0.0; dim];
        soap[BINS - 1] = 1.0;
        let mut biscuits = vec![0.0; dim];
        biscuits[2 * BINS - 1] = 1.0;

        Classifier::from_artifact(ModelArtifact {
            scaler: StandardScaler {
                mean: vec![0.0; dim],
                scale: vec![1.0; dim],
            },
            classifier: ClassifierModel::Linear {
                weights: vec![soap, biscuits],
                intercepts: vec![0.0, 0.0],
            },
            classes: vec!["soap".into(), "biscuits".into()],
        })
        .unwrap()
    }

    fn planning() -> PlanningConfig {
        let entry = |name: &str, group: &str| PickListEntry {
            name: name.into(),
            group: group.into(),
        };
        PlanningConfig {
            object_list: vec![entry("soap", "green"), entry("biscuits", "red"), entry("glue", "green")],
            dropbox: vec![
                DropBoxEntry {
                    name: Some("right".into()),
                    group: "green".into(),
                    position: [0.0, 0.7, 0.6],
                },
                DropBoxEntry {
                    name: Some("left".into()),
                    group: "red".into(),
                    position: [0.0, -0.7, 0.6],
                },
            ],
        }
    }

    fn context() -> PerceptionContext {
        PerceptionContext::new(config(), classifier(), planning()).unwrap()
    }

    #[test]
    fn test_perceive_synthetic_scene() {
        let ctx = context();
        let perception = perceive(&ctx, &scene(), &UpNormals).unwrap();

        assert_eq!(perception.clouds.table.len(), 900);
        assert_eq!(perception.clouds.objects.len(), 128);
        assert_eq!(perception.clusters.len(), 2);
        assert_eq!(perception.labels(), vec!["soap", "biscuits"]);

        let soap = &perception.detections[0];
        assert!((soap.centroid[0] - 0.07).abs() < 1e-4);
        assert!((soap.centroid[1] - 0.07).abs() < 1e-4);
        assert!((soap.centroid[2] - 0.77).abs() < 1e-4);
    }

    #[test]
    fn test_run_frame_writes_scene_output() {
        let ctx = context();
        let dir = TempDir::new().unwrap();

        let report = run_frame(&ctx, &scene(), &UpNormals, None, dir.path()).unwrap();

        assert_eq!(report.output_path, dir.path().join("output_1.yaml"));
        assert_eq!(report.plan.commands.len(), 2);
        assert_eq!(report.plan.commands[0].object_name, "soap");
        assert_eq!(report.plan.commands[0].arm_name, Arm::Right);
        assert_eq!(report.plan.commands[0].place_pose.position.y, 0.7);
        assert_eq!(report.plan.commands[1].object_name, "biscuits");
        assert_eq!(report.plan.commands[1].arm_name, Arm::Left);
        assert_eq!(
            report.plan.skipped,
            vec![PlanningIssue::UnmatchedPickEntry {
                name: "glue".into()
            }]
        );
        assert!(report.dispatch.is_none());

        let written = read_pick_place_yaml(&report.output_path).unwrap();
        assert_eq!(written, report.plan.commands);
    }

    #[test]
    fn test_default_preprocessing_with_nan_points() {
        let mut config = config();
        config.preprocess = PreprocessConfig::default();
        let ctx = PerceptionContext::new(config, classifier(), planning()).unwrap();
        let estimator = KnnNormalEstimator::new(ctx.config.normals.k);
        let dir = TempDir::new().unwrap();

        let mut cloud = scene();
        cloud.push_with_color(f32::NAN, 0.1, 0.7, RED);
        cloud.push_with_color(0.1, 0.1, f32::NAN, GREEN);

        let report = run_frame(&ctx, &cloud, &estimator, None, dir.path()).unwrap();
        let perception = &report.perception;

        let filtered = &perception.clouds.filtered;
        assert!(filtered.len() <= 1028);
        assert!(filtered.x.iter().chain(&filtered.y).chain(&filtered.z).all(|v| v.is_finite()));
        assert!(!perception.clouds.table.is_empty());
        assert!(perception.clouds.objects.len() <= 128);
        assert_eq!(perception.labels(), vec!["soap", "biscuits"]);

        assert_eq!(report.plan.commands.len(), 2);
        assert_eq!(report.plan.commands[0].arm_name, Arm::Right);
        assert_eq!(report.plan.commands[1].place_pose.position.y, -0.7);
        assert_eq!(read_pick_place_yaml(&report.output_path).unwrap(), report.plan.commands);
    }

    #[test]
    fn test_unavailable_normals_skip_clusters() {
        let ctx = context();
        let estimator = FailingNormals(NormalsError::Unavailable("service down".into()));

        let perception = perceive(&ctx, &scene(), &estimator).unwrap();

        assert_eq!(perception.clusters.len(), 2);
        assert!(perception.detections.is_empty());
    }

    #[test]
    fn test_interruption_writes_nothing() {
        let ctx = context();
        let dir = TempDir::new().unwrap();

        let err = run_frame(&ctx, &scene(), &FailingNormals(NormalsError::Interrupted), None, dir.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted));

        let executor: &dyn PickPlaceExecutor = &InterruptingExecutor;
        let err = run_frame(&ctx, &scene(), &UpNormals, Some(executor), dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted));

        assert!(!dir.path().join("output_1.yaml").exists());
    }

    #[test]
    fn test_empty_workspace_is_geometry_error() {
        let ctx = context();
        let far = PointCloud::from_coords(&[[0.0, 0.0, 5.0], [0.1, 0.0, 5.0], [0.0, 0.1, 5.0]]);

        let err = perceive(&ctx, &far, &UpNormals).unwrap_err();
        assert!(matches!(err, PipelineError::Geometry(GeometryError::EmptyCloud)));
    }

    #[test]
    fn test_context_rejects_dimension_mismatch() {
        let mut config = config();
        config.features.bins = 8;

        let err = PerceptionContext::new(config, classifier(), planning()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch {
                expected: 48,
                found: 24,
                ..
            }
        ));
    }
}
