use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CcdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("FITS library error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("Keyword {keyword} missing from header of {}", path.display())]
    MissingKey { keyword: String, path: PathBuf },

    #[error("Saturated or non-linear: strip {strip} mean {mean} outside ({min}, {max})")]
    SaturationRejection {
        strip: usize,
        mean: f64,
        min: f64,
        max: f64,
    },

    #[error("No usable frames left to combine for group {group}")]
    EmptyCombination { group: String },

    #[error("Shape mismatch in {source_name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
        source_name: String,
    },

    #[error("Master {master} has shape {master_shape:?} but {source_name} has shape {frame_shape:?}")]
    MasterShapeMismatch {
        master: &'static str,
        master_shape: (usize, usize),
        frame_shape: (usize, usize),
        source_name: String,
    },

    #[error("Cannot normalize {source_name}: mean is zero or not finite")]
    ZeroMean { source_name: String },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Unknown combine method: {0}")]
    UnknownMethod(String),

    #[error("Output path {} would be written by more than one group", .0.display())]
    OutputCollision(PathBuf),

    #[error("Group processing cancelled")]
    Cancelled,

    #[error("Group processing exceeded its deadline")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CcdError>;
