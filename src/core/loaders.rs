//! Point cloud container and frame loaders.
//!
//! This module provides:
//! - [`PointCloud`], the struct-of-arrays cloud every pipeline stage consumes and produces
//! - Cartesian CSV frames (`x,y,z` with optional `r,g,b` columns)
//! - ASCII PLY frames (with optional RGB colors)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during frame loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported frame format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Container for 3D point cloud data.
///
/// Clouds are never modified once a stage has produced them; filters and
/// extractors build new clouds instead.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Optional RGB colors for each point.
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            colors: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        Self {
            x,
            y,
            z,
            colors: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors with colors.
    pub fn from_xyz_colors(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, colors: Vec<[u8; 3]>) -> Self {
        Self {
            x,
            y,
            z,
            colors: Some(colors),
        }
    }

    /// Creates an uncolored point cloud from `[x, y, z]` triples.
    pub fn from_coords(coords: &[[f32; 3]]) -> Self {
        let mut cloud = Self::with_capacity(coords.len());
        for p in coords {
            cloud.push(p[0], p[1], p[2]);
        }
        cloud
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            colors: None,
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Coordinates of point `i`.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Color of point `i`, if the cloud carries colors.
    #[inline]
    pub fn color(&self, i: usize) -> Option<[u8; 3]> {
        self.colors.as_ref().map(|c| c[i])
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Adds a point with color to the cloud.
    pub fn push_with_color(&mut self, x: f32, y: f32, z: f32, color: [u8; 3]) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);

        if self.colors.is_none() {
            self.colors = Some(Vec::with_capacity(self.x.capacity()));
        }
        if let Some(ref mut colors) = self.colors {
            colors.push(color);
        }
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a frame from a PLY or CSV file, chosen by extension.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("ply") => load_ply(path),
        Some("csv") => load_cartesian_csv(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load a Cartesian point cloud from a CSV file.
///
/// The CSV must have a header row. Columns named `x`, `y`, `z`
/// (case-insensitive) are required; when `r`, `g`, `b` (or `red`, `green`,
/// `blue`) columns are present they become point colors.
///
/// Rows whose coordinates cannot be parsed are rejected with a
/// [`LoaderError::ParseError`] rather than silently zeroed.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let find = |names: &[&str]| names.iter().find_map(|n| col_map.get(*n).copied());

    let x_idx = find(&["x"]).ok_or_else(|| LoaderError::MissingColumns("x".to_string()))?;
    let y_idx = find(&["y"]).ok_or_else(|| LoaderError::MissingColumns("y".to_string()))?;
    let z_idx = find(&["z"]).ok_or_else(|| LoaderError::MissingColumns("z".to_string()))?;

    let color_idx = match (
        find(&["r", "red"]),
        find(&["g", "green"]),
        find(&["b", "blue"]),
    ) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    let mut cloud = PointCloud::with_capacity(10_000);
    if color_idx.is_some() {
        cloud.colors = Some(Vec::with_capacity(10_000));
    }

    for result in reader.records() {
        let record = result?;

        let parse = |idx: usize, name: &str| -> Result<f32> {
            let raw = record.get(idx).unwrap_or_default();
            raw.parse()
                .map_err(|_| LoaderError::ParseError(format!("Invalid {} value: {}", name, raw)))
        };

        let x = parse(x_idx, "x")?;
        let y = parse(y_idx, "y")?;
        let z = parse(z_idx, "z")?;

        match color_idx {
            Some([r, g, b]) => {
                let channel = |idx: usize| record.get(idx).and_then(|s| s.parse().ok()).unwrap_or(180);
                cloud.push_with_color(x, y, z, [channel(r), channel(g), channel(b)]);
            }
            None => cloud.push(x, y, z),
        }
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing:
/// - Required: x, y, z properties
/// - Optional: red, green, blue color properties
///
/// # Errors
///
/// Returns an error if the file is not a valid PLY or lacks required properties.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    // Check PLY magic number
    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ASCII PLY is supported, found '{}'",
                stripped
            )));
        } else if stripped.starts_with("element vertex") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            if let Some(count_str) = parts.last() {
                num_vertices = count_str.parse().ok();
            }
        } else if stripped.starts_with("property") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            if let Some(name) = parts.last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let required = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = required("x")?;
    let y_idx = required("y")?;
    let z_idx = required("z")?;

    let color_idx = match (
        prop_idx.get("red"),
        prop_idx.get("green"),
        prop_idx.get("blue"),
    ) {
        (Some(&r), Some(&g), Some(&b)) => Some([r, g, b]),
        _ => None,
    };

    let mut cloud = PointCloud::with_capacity(num_vertices);
    if color_idx.is_some() {
        cloud.colors = Some(Vec::with_capacity(num_vertices));
    }

    let mut vertex_count = 0;
    for line in lines {
        if vertex_count >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let coord = |idx: usize, name: &str| -> Result<f32> {
            values[idx]
                .parse()
                .map_err(|_| LoaderError::ParseError(format!("Invalid {} value: {}", name, values[idx])))
        };
        let x = coord(x_idx, "x")?;
        let y = coord(y_idx, "y")?;
        let z = coord(z_idx, "z")?;

        match color_idx {
            Some([r, g, b]) => {
                let channel = |idx: usize| values[idx].parse().unwrap_or(180u8);
                cloud.push_with_color(x, y, z, [channel(r), channel(g), channel(b)]);
            }
            None => cloud.push(x, y, z),
        }

        vertex_count += 1;
    }

    if vertex_count < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices, vertex_count
        )));
    }

    Ok(cloud)
}
