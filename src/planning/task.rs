//! Pick-and-place planning from a frame's detections.
//!
//! The planning tables (`object_list` and `dropbox`) use the layout of the
//! robot's parameter server:
//!
//! ```yaml
//! object_list:
//!   - name: soap
//!     group: green
//! dropbox:
//!   - name: right
//!     group: green
//!     position: [0.0, -0.71, 0.605]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::processors::registry::DetectedObject;

/// Manipulator arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    /// Arm serving a drop-box group: green is on the right, red on the left.
    pub fn for_group(group: &str) -> Option<Self> {
        match group {
            "green" => Some(Self::Right),
            "red" => Some(Self::Left),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl std::fmt::Display for Arm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Position plus orientation. Orientation stays all-zero; the executor
/// chooses grasp orientation itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn at(position: [f64; 3]) -> Self {
        Self {
            position: Point {
                x: position[0],
                y: position[1],
                z: position[2],
            },
            orientation: Quaternion::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickListEntry {
    pub name: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropBoxEntry {
    /// Arm name in the parameter layout; informational only.
    #[serde(default)]
    pub name: Option<String>,
    pub group: String,
    pub position: [f64; 3],
}

/// Pick list and drop boxes for a scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanningConfig {
    #[serde(default)]
    pub object_list: Vec<PickListEntry>,

    #[serde(default)]
    pub dropbox: Vec<DropBoxEntry>,
}

impl PlanningConfig {
    /// Load planning tables from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: PlanningConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// One pick-and-place request, serialized as a record of the scene output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickPlaceCommand {
    pub test_scene_num: u32,
    pub arm_name: Arm,
    pub object_name: String,
    pub pick_pose: Pose,
    pub place_pose: Pose,
}

/// Reason a pick-list entry produced no command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningIssue {
    UnmatchedPickEntry { name: String },
    UnrecognizedGroup { name: String, group: String },
    MissingDropBox { name: String, group: String },
}

impl std::fmt::Display for PlanningIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmatchedPickEntry { name } => {
                write!(f, "no detected object matches pick-list entry '{}'", name)
            }
            Self::UnrecognizedGroup { name, group } => {
                write!(f, "pick-list entry '{}' has unrecognized group '{}'", name, group)
            }
            Self::MissingDropBox { name, group } => {
                write!(f, "no drop box for group '{}' (entry '{}')", group, name)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    pub commands: Vec<PickPlaceCommand>,
    pub skipped: Vec<PlanningIssue>,
}

/// Turn the pick list into commands for the objects detected in this frame.
///
/// Entries are handled in pick-list order. Each detection serves at most one
/// entry, so two entries with the same name need two detections. An entry
/// that cannot be planned is recorded in [`PlanOutcome::skipped`] and the
/// rest of the list is still processed.
pub fn plan_pick_place(
    detections: &[DetectedObject],
    pick_list: &[PickListEntry],
    dropbox: &[DropBoxEntry],
    scene_id: u32,
) -> PlanOutcome {
    let mut used = vec![false; detections.len()];
    let mut outcome = PlanOutcome::default();

    for entry in pick_list {
        let matched = detections
            .iter()
            .enumerate()
            .find(|(i, d)| !used[*i] && d.label == entry.name);

        let Some((index, detection)) = matched else {
            let issue = PlanningIssue::UnmatchedPickEntry {
                name: entry.name.clone(),
            };
            log::warn!("{}", issue);
            outcome.skipped.push(issue);
            continue;
        };

        let Some(arm) = Arm::for_group(&entry.group) else {
            let issue = PlanningIssue::UnrecognizedGroup {
                name: entry.name.clone(),
                group: entry.group.clone(),
            };
            log::warn!("{}", issue);
            outcome.skipped.push(issue);
            continue;
        };

        let Some(target) = dropbox.iter().find(|b| b.group == entry.group) else {
            let issue = PlanningIssue::MissingDropBox {
                name: entry.name.clone(),
                group: entry.group.clone(),
            };
            log::warn!("{}", issue);
            outcome.skipped.push(issue);
            continue;
        };

        used[index] = true;
        let c = detection.centroid;

        outcome.commands.push(PickPlaceCommand {
            test_scene_num: scene_id,
            arm_name: arm,
            object_name: entry.name.clone(),
            pick_pose: Pose::at([c[0] as f64, c[1] as f64, c[2] as f64]),
            place_pose: Pose::at(target.position),
        });
    }

    outcome
}
