//! Per-cell work units exchanged between the grid, the scheduler and the
//! refinement workers

use crate::point::TerrainPoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid coordinates of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub x: usize,
    pub y: usize,
}

impl CellId {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

/// World-space square covered by one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub size: f64,
}

impl CellExtent {
    pub fn max_x(&self) -> f64 {
        self.min_x + self.size
    }

    pub fn max_y(&self) -> f64 {
        self.min_y + self.size
    }

    /// Distance from (x, y) to the nearest cell edge (zero on an edge,
    /// negative outside the cell)
    pub fn edge_distance(&self, x: f64, y: f64) -> f64 {
        let dx = (x - self.min_x).min(self.max_x() - x);
        let dy = (y - self.min_y).min(self.max_y() - y);
        dx.min(dy)
    }
}

/// A finalized cell handed to a worker. The point list is owned.
#[derive(Debug, Clone)]
pub struct CellJob {
    pub cell: CellId,
    pub extent: CellExtent,
    pub points: Vec<TerrainPoint>,
    /// The cell-end input line, echoed after the cell's vertices
    pub end_line: String,
}

/// Output of one finalized cell
#[derive(Debug, Clone)]
pub struct CellResult {
    pub cell: CellId,
    pub vertices: Vec<TerrainPoint>,
    pub end_line: String,
}

impl CellResult {
    /// Render the full output batch: one `v x y z` line per vertex followed
    /// by the echoed cell-end line. The batch is written to the sink in one
    /// piece.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.vertices.len() * 32 + self.end_line.len() + 1);
        for vertex in &self.vertices {
            out.push_str(&format!("v {} {} {}\n", vertex.x, vertex.y, vertex.z));
        }
        out.push_str(self.end_line.trim_end_matches(['\r', '\n']));
        out.push('\n');
        out
    }
}
