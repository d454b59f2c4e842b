//! Corner seeding of a cell triangulation
//!
//! A cell TIN starts from four synthetic vertices at the cell corners so that
//! every point of the cell is inside the initial convex hull. The elevation
//! of each corner is estimated from the nearest input points.

use crate::nearest_neighbor::RTreeIndex;
use serde::{Deserialize, Serialize};
use tinsimp_core::{CellExtent, Error, NearestNeighborSearch, Result, TerrainPoint};

/// Configuration for corner seeding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Number of nearest points averaged for a corner elevation
    pub neighbors: usize,
    /// Corners on the maximum edges are pulled inward by this much
    pub corner_inset: f64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            neighbors: 10,
            corner_inset: 1e-5,
        }
    }
}

impl SeedConfig {
    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_corner_inset(mut self, corner_inset: f64) -> Self {
        self.corner_inset = corner_inset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.neighbors == 0 {
            return Err(Error::InvalidConfig(
                "Corner seeding needs at least one neighbor".to_string(),
            ));
        }
        if !self.corner_inset.is_finite() || self.corner_inset < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "Corner inset must be a non-negative number, got {}",
                self.corner_inset
            )));
        }
        Ok(())
    }
}

/// Estimates the four corner vertices of a cell
#[derive(Debug, Clone, Default)]
pub struct CornerSeeder {
    config: SeedConfig,
}

impl CornerSeeder {
    pub fn new(config: SeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    /// Planar corner positions: (min,min), (max-e,min), (min,max-e), (max-e,max-e)
    pub fn corner_positions(&self, extent: &CellExtent) -> [[f64; 2]; 4] {
        let inset = self.config.corner_inset;
        let (x0, y0) = (extent.min_x, extent.min_y);
        let (x1, y1) = (extent.max_x() - inset, extent.max_y() - inset);
        [[x0, y0], [x1, y0], [x0, y1], [x1, y1]]
    }

    /// Seed corners from the cell's points using an R-tree index
    pub fn seed(&self, extent: &CellExtent, points: &[TerrainPoint]) -> Result<[TerrainPoint; 4]> {
        if points.is_empty() {
            return Err(Error::InvalidData(
                "Cannot seed corners of a cell without points".to_string(),
            ));
        }
        let index = RTreeIndex::new(points);
        self.seed_with(extent, points, &index)
    }

    /// Seed corners with a caller-provided index over `points`
    pub fn seed_with<S: NearestNeighborSearch>(
        &self,
        extent: &CellExtent,
        points: &[TerrainPoint],
        index: &S,
    ) -> Result<[TerrainPoint; 4]> {
        if points.is_empty() {
            return Err(Error::InvalidData(
                "Cannot seed corners of a cell without points".to_string(),
            ));
        }
        if extent.size <= self.config.corner_inset {
            return Err(Error::InvalidConfig(format!(
                "Corner inset {} does not fit a cell of size {}",
                self.config.corner_inset, extent.size
            )));
        }

        let k = self.config.neighbors.min(points.len());
        let corners = self.corner_positions(extent).map(|[x, y]| {
            let mut zs: Vec<f64> = index
                .find_k_nearest([x, y], k)
                .into_iter()
                .map(|(idx, _)| points[idx].z)
                .collect();
            // Summation order fixed by value
            zs.sort_by(|a, b| a.total_cmp(b));
            let z = zs.iter().sum::<f64>() / zs.len().max(1) as f64;
            TerrainPoint::new(x, y, z)
        });
        Ok(corners)
    }
}
