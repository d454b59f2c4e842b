//! Core data structures and traits for tinsimp
//!
//! This crate provides the fundamental types shared by the refinement and
//! decimation engines: terrain points, the spatial grid that partitions an
//! input stream into cells, the per-cell job/result types exchanged with the
//! scheduler, and the error type.

pub mod point;
pub mod grid;
pub mod cell;
pub mod traits;
pub mod error;

pub use point::*;
pub use grid::*;
pub use cell::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::Point3;
