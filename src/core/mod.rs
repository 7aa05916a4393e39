//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{load_frame, LoaderError, PointCloud};
pub use writers::{
    read_pick_place_yaml, scene_output_path, write_labels_csv, write_pick_place_yaml, write_ply,
    WriteError,
};
