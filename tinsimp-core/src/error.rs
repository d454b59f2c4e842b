//! Error types for tinsimp

use crate::cell::CellId;
use thiserror::Error;

/// Main error type for tinsimp operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Triangulation error: {0}")]
    Triangulation(String),

    /// Interpolation or location outside the current convex hull
    #[error("Query at ({x}, {y}) is outside the triangulation")]
    OutOfDomain { x: f64, y: f64 },

    #[error("Point ({x}, {y}) lies outside the bounding box")]
    OutOfBounds { x: f64, y: f64 },

    #[error("Cell {cell} is outside the {dimension}x{dimension} grid")]
    CellOutOfRange { cell: CellId, dimension: usize },

    #[error("Grid is not configured: missing {0}")]
    GridNotConfigured(&'static str),

    #[error("Cell {cell} was finalized twice")]
    DuplicateFinalize { cell: CellId },

    #[error("Point received for already finalized cell {cell}")]
    PointAfterFinalize { cell: CellId },

    #[error("Worker for cell {cell} failed: {message}")]
    WorkerFailed { cell: CellId, message: String },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Result type alias for tinsimp operations
pub type Result<T> = std::result::Result<T, Error>;
