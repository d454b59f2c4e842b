//! Spatial grid partitioning a point stream into square cells

use crate::cell::{CellExtent, CellId};
use crate::error::{Error, Result};
use crate::point::{BoundingBox, TerrainPoint};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An N x N grid of square cells anchored at the bounding box minimum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub bbox: BoundingBox,
    pub dimension: usize,
    pub cell_size: f64,
}

impl Grid {
    pub fn new(bbox: BoundingBox, dimension: usize, cell_size: f64) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidData("Grid dimension must be positive".to_string()));
        }
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(Error::InvalidData(format!("Invalid cell size {}", cell_size)));
        }
        Ok(Self { bbox, dimension, cell_size })
    }

    /// Cell owning (x, y).
    ///
    /// Floor semantics: a point on an interior cell boundary belongs to the
    /// cell whose minimum edge it lies on. A point on the maximum edge of the
    /// bounding box belongs to the last cell. The caller must reject points
    /// outside the bounding box first.
    pub fn cell_of(&self, x: f64, y: f64) -> Result<CellId> {
        let gx = self.axis_index(x - self.bbox.min_x, x == self.bbox.max_x);
        let gy = self.axis_index(y - self.bbox.min_y, y == self.bbox.max_y);
        match (gx, gy) {
            (Some(gx), Some(gy)) => Ok(CellId::new(gx, gy)),
            _ => Err(Error::OutOfBounds { x, y }),
        }
    }

    fn axis_index(&self, offset: f64, on_max_edge: bool) -> Option<usize> {
        let index = (offset / self.cell_size).floor();
        if index < 0.0 || !index.is_finite() {
            return None;
        }
        let index = index as usize;
        if index < self.dimension {
            Some(index)
        } else if on_max_edge && index == self.dimension {
            Some(self.dimension - 1)
        } else {
            None
        }
    }

    pub fn contains_cell(&self, cell: CellId) -> bool {
        cell.x < self.dimension && cell.y < self.dimension
    }

    pub fn cell_extent(&self, cell: CellId) -> CellExtent {
        CellExtent {
            min_x: self.bbox.min_x + self.cell_size * cell.x as f64,
            min_y: self.bbox.min_y + self.cell_size * cell.y as f64,
            size: self.cell_size,
        }
    }
}

/// Collects the grid header records (`c`, `s`, `b`), which may arrive in
/// any order, and builds the [`Grid`] once all three are known.
#[derive(Debug, Clone, Default)]
pub struct GridBuilder {
    dimension: Option<usize>,
    cell_size: Option<f64>,
    bbox: Option<BoundingBox>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&mut self, dimension: usize) -> &mut Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn cell_size(&mut self, cell_size: f64) -> &mut Self {
        self.cell_size = Some(cell_size);
        self
    }

    pub fn bbox(&mut self, bbox: BoundingBox) -> &mut Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.dimension.is_some() && self.cell_size.is_some() && self.bbox.is_some()
    }

    pub fn build(&self) -> Result<Grid> {
        let dimension = self.dimension.ok_or(Error::GridNotConfigured("grid dimension (c)"))?;
        let cell_size = self.cell_size.ok_or(Error::GridNotConfigured("cell size (s)"))?;
        let bbox = self.bbox.ok_or(Error::GridNotConfigured("bounding box (b)"))?;
        Grid::new(bbox, dimension, cell_size)
    }
}

/// Accumulates points per cell until each cell is finalized.
///
/// Each cell's point list is created on first use and handed out exactly
/// once by [`SpatialGrid::finalize`]; the cell is closed afterwards.
#[derive(Debug)]
pub struct SpatialGrid {
    grid: Grid,
    pending: HashMap<CellId, Vec<TerrainPoint>>,
    finalized: HashSet<CellId>,
}

impl SpatialGrid {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            pending: HashMap::new(),
            finalized: HashSet::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Append a point to its owning cell
    pub fn insert(&mut self, point: TerrainPoint) -> Result<CellId> {
        if !self.grid.bbox.contains(point.x, point.y) {
            return Err(Error::OutOfBounds { x: point.x, y: point.y });
        }
        let cell = self.grid.cell_of(point.x, point.y)?;
        if self.finalized.contains(&cell) {
            return Err(Error::PointAfterFinalize { cell });
        }
        self.pending.entry(cell).or_default().push(point);
        Ok(cell)
    }

    /// Close a cell and take ownership of its points (empty if the cell
    /// never received any)
    pub fn finalize(&mut self, cell: CellId) -> Result<Vec<TerrainPoint>> {
        if !self.grid.contains_cell(cell) {
            return Err(Error::CellOutOfRange {
                cell,
                dimension: self.grid.dimension,
            });
        }
        if !self.finalized.insert(cell) {
            return Err(Error::DuplicateFinalize { cell });
        }
        Ok(self.pending.remove(&cell).unwrap_or_default())
    }

    pub fn is_finalized(&self, cell: CellId) -> bool {
        self.finalized.contains(&cell)
    }

    /// Number of cells holding points that have not been finalized yet
    pub fn pending_cells(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_points(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}
