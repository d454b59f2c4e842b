//! Triangulated irregular network over terrain samples
//!
//! `Tin` wraps a spade Delaunay triangulation whose vertices carry the full
//! terrain point. Planar queries (location, interpolation, adjacency) are
//! answered in (x, y); z only enters through interpolation.
//!
//! Vertex handles stay valid while the TIN only grows. Removing a vertex
//! invalidates every handle, so the removal API is addressed by position.

use spade::handles::FixedVertexHandle;
use spade::{DelaunayTriangulation, HasPosition, Point2, PositionInTriangulation, Triangulation};
use tinsimp_core::{Error, Result, TerrainPoint};

/// Vertex payload stored in the triangulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TinVertex {
    pub point: TerrainPoint,
}

impl HasPosition for TinVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        Point2::new(self.point.x, self.point.y)
    }
}

/// Identity of a triangle: its three vertex handles compared as a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriangleKey([FixedVertexHandle; 3]);

impl TriangleKey {
    pub fn new(mut vertices: [FixedVertexHandle; 3]) -> Self {
        vertices.sort_by_key(|v| v.index());
        Self(vertices)
    }

    pub fn vertices(&self) -> [FixedVertexHandle; 3] {
        self.0
    }
}

/// Result of locating a planar position in the TIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The position coincides with an existing vertex
    Vertex(FixedVertexHandle),
    /// The position lies inside or on the boundary of this triangle
    Triangle(TriangleKey),
    /// The position lies outside the convex hull
    Outside,
    /// The TIN has no triangles yet
    Empty,
}

/// A Delaunay TIN over terrain points
#[derive(Clone)]
pub struct Tin {
    dt: DelaunayTriangulation<TinVertex>,
}

impl Default for Tin {
    fn default() -> Self {
        Self::new()
    }
}

impl Tin {
    pub fn new() -> Self {
        Self {
            dt: DelaunayTriangulation::new(),
        }
    }

    /// Build a TIN from points, inserted in order
    pub fn from_points(points: &[TerrainPoint]) -> Result<Self> {
        let mut tin = Self::new();
        for point in points {
            tin.insert(*point)?;
        }
        Ok(tin)
    }

    pub fn num_vertices(&self) -> usize {
        self.dt.num_vertices()
    }

    pub fn num_triangles(&self) -> usize {
        self.dt.num_inner_faces()
    }

    pub fn is_empty(&self) -> bool {
        self.dt.num_vertices() == 0
    }

    /// Insert a point. A point at the (x, y) of an existing vertex replaces
    /// that vertex's payload and returns its handle.
    pub fn insert(&mut self, point: TerrainPoint) -> Result<FixedVertexHandle> {
        self.dt.insert(TinVertex { point }).map_err(|e| {
            Error::Triangulation(format!(
                "Failed to insert ({}, {}) into TIN: {:?}",
                point.x, point.y, e
            ))
        })
    }

    /// Locate a planar position
    pub fn locate(&self, x: f64, y: f64) -> Location {
        match self.dt.locate(Point2::new(x, y)) {
            PositionInTriangulation::OnVertex(vertex) => Location::Vertex(vertex),
            PositionInTriangulation::OnFace(face) => {
                let vertices = self.dt.face(face).vertices().map(|v| v.fix());
                Location::Triangle(TriangleKey::new(vertices))
            }
            PositionInTriangulation::OnEdge(edge) => {
                // Either adjacent inner face interpolates the same on the edge
                let edge = self.dt.directed_edge(edge);
                match edge.face().as_inner().or_else(|| edge.rev().face().as_inner()) {
                    Some(face) => Location::Triangle(TriangleKey::new(face.vertices().map(|v| v.fix()))),
                    None => Location::Outside,
                }
            }
            PositionInTriangulation::OutsideOfConvexHull(_) => Location::Outside,
            PositionInTriangulation::NoTriangulation => Location::Empty,
        }
    }

    /// Interpolated elevation at (x, y) on the piecewise-linear surface.
    ///
    /// Fails with `Error::OutOfDomain` outside the convex hull.
    pub fn interpolate(&self, x: f64, y: f64) -> Result<f64> {
        match self.locate(x, y) {
            Location::Vertex(vertex) => Ok(self.dt.vertex(vertex).data().point.z),
            Location::Triangle(key) => Ok(plane_z(&self.triangle_points(&key), x, y)),
            Location::Outside | Location::Empty => Err(Error::OutOfDomain { x, y }),
        }
    }

    /// Vertical error of a point against the current surface
    pub fn error_at(&self, point: &TerrainPoint) -> Result<f64> {
        Ok((self.interpolate(point.x, point.y)? - point.z).abs())
    }

    pub fn point(&self, vertex: FixedVertexHandle) -> TerrainPoint {
        self.dt.vertex(vertex).data().point
    }

    /// Corner points of a live triangle
    pub fn triangle_points(&self, key: &TriangleKey) -> [TerrainPoint; 3] {
        key.0.map(|v| self.point(v))
    }

    /// Whether the three vertices of `key` currently form a triangle
    pub fn is_live(&self, key: &TriangleKey) -> bool {
        let [a, b, c] = key.0;
        match self.dt.get_edge_from_neighbors(a, b) {
            Some(edge) => [edge.face(), edge.rev().face()].iter().any(|face| {
                face.as_inner()
                    .map_or(false, |inner| inner.vertices().iter().any(|v| v.fix() == c))
            }),
            None => false,
        }
    }

    /// Vertices adjacent to `vertex`
    pub fn link(&self, vertex: FixedVertexHandle) -> Vec<FixedVertexHandle> {
        self.dt
            .vertex(vertex)
            .out_edges()
            .map(|edge| edge.to().fix())
            .collect()
    }

    /// Whether `vertex` lies on the convex hull
    pub fn is_hull_vertex(&self, vertex: FixedVertexHandle) -> bool {
        self.dt
            .vertex(vertex)
            .out_edges()
            .any(|edge| edge.face().is_outer() || edge.rev().face().is_outer())
    }

    /// Handle of the vertex at (x, y), if any
    pub fn vertex_at(&self, x: f64, y: f64) -> Option<FixedVertexHandle> {
        self.dt.locate_vertex(Point2::new(x, y)).map(|v| v.fix())
    }

    /// Points adjacent to the vertex at (x, y)
    pub fn neighbors(&self, x: f64, y: f64) -> Vec<TerrainPoint> {
        match self.vertex_at(x, y) {
            Some(vertex) => self.link(vertex).into_iter().map(|v| self.point(v)).collect(),
            None => Vec::new(),
        }
    }

    /// Vertical change at a vertex if it were removed: remove it, interpolate
    /// the remaining surface at its position, re-insert it.
    ///
    /// Returns `None` for hull vertices, unknown positions and positions that
    /// fall out of domain once the vertex is gone.
    pub fn removal_delta(&mut self, x: f64, y: f64) -> Result<Option<f64>> {
        let vertex = match self.vertex_at(x, y) {
            Some(vertex) => vertex,
            None => return Ok(None),
        };
        if self.is_hull_vertex(vertex) {
            return Ok(None);
        }

        let removed = self.dt.remove(vertex);
        let interpolated = self.interpolate(removed.point.x, removed.point.y);
        self.insert(removed.point)?;

        Ok(interpolated.ok().map(|z| (z - removed.point.z).abs()))
    }

    /// Remove the vertex at (x, y) permanently
    pub fn remove_at(&mut self, x: f64, y: f64) -> Option<TerrainPoint> {
        let vertex = self.vertex_at(x, y)?;
        Some(self.dt.remove(vertex).point)
    }

    pub fn contains_vertex(&self, point: &TerrainPoint) -> bool {
        self.vertex_at(point.x, point.y).is_some()
    }

    pub fn vertices(&self) -> impl Iterator<Item = TerrainPoint> + '_ {
        self.dt.vertices().map(|v| v.data().point)
    }

    pub fn vertices_with_handles(&self) -> impl Iterator<Item = (FixedVertexHandle, TerrainPoint)> + '_ {
        self.dt.vertices().map(|v| (v.fix(), v.data().point))
    }

    /// Triangles as counter-clockwise corner triples
    pub fn triangles(&self) -> impl Iterator<Item = [TerrainPoint; 3]> + '_ {
        self.dt
            .inner_faces()
            .map(|face| face.vertices().map(|v| v.data().point))
    }
}

/// Elevation at (x, y) on the plane through a triangle's corners
pub fn plane_z(triangle: &[TerrainPoint; 3], x: f64, y: f64) -> f64 {
    let [a, b, c] = triangle;
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det == 0.0 {
        return (a.z + b.z + c.z) / 3.0;
    }
    let wa = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / det;
    let wb = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / det;
    let wc = 1.0 - wa - wb;
    wa * a.z + wb * b.z + wc * c.z
}
