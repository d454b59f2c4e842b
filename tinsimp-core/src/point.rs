//! Point types and the session bounding box

use crate::error::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A terrain sample: planar position (x, y) and elevation z
pub type TerrainPoint = Point3d;

/// Axis-aligned planar bounding box of a stream session.
///
/// The box is closed: points on any of its four edges are inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting empty or non-finite extents
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x >= max_x || min_y >= max_y {
            return Err(Error::InvalidData(format!(
                "Degenerate bounding box ({}, {}, {}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self { min_x, min_y, max_x, max_y })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Inclusive containment test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}
