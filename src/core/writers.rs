//! Data writers for clouds, cluster labels and scene command lists.
//!
//! This module provides:
//! - PLY (ASCII, with RGB colors) for intermediate clouds
//! - CSV with per-point cluster labels
//! - YAML scene output (`object_list` of pick-and-place requests)

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loaders::PointCloud;
use crate::planning::PickPlaceCommand;

/// Default color for points when no colors are specified (light gray).
pub const DEFAULT_COLOR: [u8; 3] = [180, 180, 180];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open a previously written file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// YAML encoding or decoding error.
    #[error("YAML error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: coords has {coords_len} elements, labels has {labels_len} elements")]
    LengthMismatch { coords_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// On-disk layout of a scene's command list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOutput {
    pub object_list: Vec<PickPlaceCommand>,
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Path of the output file for a scene: `dir/output_<scene_id>.yaml`.
pub fn scene_output_path(dir: &Path, scene_id: u32) -> PathBuf {
    dir.join(format!("output_{}.yaml", scene_id))
}

/// Write a scene's pick-and-place command list as YAML.
///
/// The document has a single `object_list` key holding one record per
/// command, in the order given. Parent directories are created if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created, encoded or flushed. The
/// caller decides what a failed scene output means; nothing is retried here.
pub fn write_pick_place_yaml(path: &Path, commands: &[PickPlaceCommand]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    let document = SceneOutput {
        object_list: commands.to_vec(),
    };

    serde_yaml::to_writer(&mut writer, &document).map_err(|e| WriteError::YamlError {
        path: path_str.clone(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Read back a command list written by [`write_pick_place_yaml`].
pub fn read_pick_place_yaml(path: &Path) -> Result<Vec<PickPlaceCommand>> {
    let path_str = path.display().to_string();
    let file = File::open(path).map_err(|e| WriteError::ReadFile {
        path: path_str.clone(),
        source: e,
    })?;

    let document: SceneOutput =
        serde_yaml::from_reader(BufReader::new(file)).map_err(|e| WriteError::YamlError {
            path: path_str,
            source: e,
        })?;

    Ok(document.object_list)
}

/// Write point cloud to ASCII PLY file with RGB colors.
///
/// If the point cloud has no colors, a default light gray (180, 180, 180) is used.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    let path_str = path.display().to_string();
    let write_err = |e: std::io::Error| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    let header = [
        "ply".to_string(),
        "format ascii 1.0".to_string(),
        format!("element vertex {}", cloud.len()),
        "property float x".to_string(),
        "property float y".to_string(),
        "property float z".to_string(),
        "property uchar red".to_string(),
        "property uchar green".to_string(),
        "property uchar blue".to_string(),
        "end_header".to_string(),
    ];
    for line in &header {
        writeln!(writer, "{}", line).map_err(write_err)?;
    }

    for i in 0..cloud.len() {
        let [x, y, z] = cloud.point(i);
        let [r, g, b] = cloud.color(i).unwrap_or(DEFAULT_COLOR);

        writeln!(writer, "{:.6} {:.6} {:.6} {} {} {}", x, y, z, r, g, b).map_err(write_err)?;
    }

    writer.flush().map_err(write_err)?;

    Ok(())
}

/// Write labeled coordinates to CSV.
///
/// Creates a CSV file with headers "x,y,z,label", one row per point, where
/// the label is the point's cluster id (-1 for points in no kept cluster).
///
/// # Errors
///
/// Returns an error if:
/// - `coords` and `labels` have different lengths
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_labels_csv(path: &Path, coords: &[[f32; 3]], labels: &[i32]) -> Result<()> {
    if coords.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            coords_len: coords.len(),
            labels_len: labels.len(),
        });
    }

    ensure_parent_dirs(path)?;

    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();

    csv_writer
        .write_record(["x", "y", "z", "label"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (coord, label) in coords.iter().zip(labels.iter()) {
        csv_writer
            .write_record(&[
                format!("{:.6}", coord[0]),
                format!("{:.6}", coord[1]),
                format!("{:.6}", coord[2]),
                label.to_string(),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
