//! Greedy refinement of a cell TIN
//!
//! Starting from four seeded corners, the point with the largest vertical
//! error against the current surface is inserted until every remaining
//! point is approximated within the threshold.
//!
//! Two queue disciplines are available:
//! - `TriangleScan` buckets points by the triangle containing them and keeps
//!   one exact entry (the bucket's worst point) per triangle.
//! - `LazyRecheck` keeps one possibly stale entry per point, recomputes on
//!   pop, and refreshes the whole queue on a growing schedule.

use crate::priority::ErrorKey;
use crate::seeding::{CornerSeeder, SeedConfig};
use crate::tin::{plane_z, Location, Tin, TriangleKey};
use itertools::Itertools;
use log::{debug, warn};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use spade::handles::FixedVertexHandle;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tinsimp_core::{CellExtent, Error, Result, TerrainPoint};

/// Queue discipline of the refinement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefinementStrategy {
    #[default]
    TriangleScan,
    LazyRecheck,
}

impl fmt::Display for RefinementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefinementStrategy::TriangleScan => write!(f, "triangle-scan"),
            RefinementStrategy::LazyRecheck => write!(f, "lazy-recheck"),
        }
    }
}

impl FromStr for RefinementStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "triangle-scan" => Ok(RefinementStrategy::TriangleScan),
            "lazy-recheck" => Ok(RefinementStrategy::LazyRecheck),
            other => Err(Error::InvalidConfig(format!(
                "Unknown refinement strategy '{}'",
                other
            ))),
        }
    }
}

/// Growing interval between full queue refreshes (LazyRecheck only)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshSchedule {
    /// Insertions before the first refresh
    pub initial_interval: f64,
    /// Added to the interval after every refresh
    pub growth: f64,
    pub max_interval: f64,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            initial_interval: 5.0,
            growth: 0.5,
            max_interval: 25.0,
        }
    }
}

impl RefreshSchedule {
    pub fn validate(&self) -> Result<()> {
        let finite = self.initial_interval.is_finite()
            && self.growth.is_finite()
            && self.max_interval.is_finite();
        if !finite || self.initial_interval < 1.0 || self.growth < 0.0 || self.max_interval < self.initial_interval {
            return Err(Error::InvalidConfig(format!(
                "Invalid refresh schedule {:?}",
                self
            )));
        }
        Ok(())
    }
}

struct RefreshTimer {
    schedule: RefreshSchedule,
    interval: f64,
    since: usize,
}

impl RefreshTimer {
    fn new(schedule: RefreshSchedule) -> Self {
        Self {
            schedule,
            interval: schedule.initial_interval,
            since: 0,
        }
    }

    /// Count one insertion; true when a refresh is due
    fn tick(&mut self) -> bool {
        self.since += 1;
        if (self.since as f64) < self.interval {
            return false;
        }
        self.since = 0;
        self.interval = (self.interval + self.schedule.growth).min(self.schedule.max_interval);
        true
    }
}

/// Treatment of points on the boundary between adjacent cells
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum SeamPolicy {
    /// Edge points compete on error like any other point
    #[default]
    ErrorDriven,
    /// Points within `tolerance` of a cell edge are always kept
    PinCellEdges { tolerance: f64 },
}

impl SeamPolicy {
    pub fn pins(&self, extent: &CellExtent, point: &TerrainPoint) -> bool {
        match self {
            SeamPolicy::ErrorDriven => false,
            SeamPolicy::PinCellEdges { tolerance } => {
                extent.edge_distance(point.x, point.y) <= *tolerance
            }
        }
    }
}

/// Configuration for greedy refinement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Maximum tolerated vertical error
    pub threshold: f64,
    pub strategy: RefinementStrategy,
    pub seeding: SeedConfig,
    pub refresh: RefreshSchedule,
    pub seam: SeamPolicy,
    /// Drop the four seeded corners from the output once real vertices exist
    pub strip_corners: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            strategy: RefinementStrategy::default(),
            seeding: SeedConfig::default(),
            refresh: RefreshSchedule::default(),
            seam: SeamPolicy::default(),
            strip_corners: false,
        }
    }
}

impl RefinementConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_strategy(mut self, strategy: RefinementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seeding(mut self, seeding: SeedConfig) -> Self {
        self.seeding = seeding;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshSchedule) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_seam(mut self, seam: SeamPolicy) -> Self {
        self.seam = seam;
        self
    }

    pub fn with_strip_corners(mut self, strip_corners: bool) -> Self {
        self.strip_corners = strip_corners;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "Refinement threshold must be positive, got {}",
                self.threshold
            )));
        }
        if let SeamPolicy::PinCellEdges { tolerance } = self.seam {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "Seam tolerance must be non-negative, got {}",
                    tolerance
                )));
            }
        }
        self.seeding.validate()?;
        self.refresh.validate()
    }
}

/// Result of refining one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefinementOutcome {
    /// Retained vertices, in insertion order
    pub vertices: Vec<TerrainPoint>,
    /// Points inserted by the greedy loop
    pub insertions: usize,
    /// Points inserted unconditionally (outside the hull or pinned)
    pub forced: usize,
    /// Duplicates and points the triangulation rejected
    pub skipped: usize,
    /// Full queue refreshes (LazyRecheck)
    pub refreshes: usize,
    /// Worst error among points left out, 0 if none
    pub max_error: f64,
}

/// A refined TIN together with the handles of its seeded corners
pub struct RefinedTin {
    pub tin: Tin,
    pub corners: [FixedVertexHandle; 4],
}

/// Greedy insertion-based TIN refinement of a single cell
#[derive(Debug, Clone)]
pub struct GreedyRefiner {
    config: RefinementConfig,
    seeder: CornerSeeder,
}

impl GreedyRefiner {
    pub fn new(config: RefinementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            seeder: CornerSeeder::new(config.seeding),
        })
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Refine one cell and return its retained vertices
    pub fn refine_cell(&self, extent: &CellExtent, points: &[TerrainPoint]) -> Result<RefinementOutcome> {
        self.refine_tin(extent, points).map(|(_, outcome)| outcome)
    }

    /// Refine one cell, keeping the TIN. Empty input yields no TIN.
    pub fn refine_tin(
        &self,
        extent: &CellExtent,
        points: &[TerrainPoint],
    ) -> Result<(Option<RefinedTin>, RefinementOutcome)> {
        let mut outcome = RefinementOutcome::default();
        if points.is_empty() {
            return Ok((None, outcome));
        }

        let mut tin = Tin::new();
        let seeded = self.seeder.seed(extent, points)?;
        let mut corners = Vec::with_capacity(4);
        for corner in seeded {
            corners.push(tin.insert(corner)?);
        }
        let corners: [FixedVertexHandle; 4] = [corners[0], corners[1], corners[2], corners[3]];

        let candidates = self.forced_pass(&mut tin, extent, points, &mut outcome);
        match self.config.strategy {
            RefinementStrategy::TriangleScan => self.triangle_scan(&mut tin, candidates, &mut outcome),
            RefinementStrategy::LazyRecheck => self.lazy_recheck(&mut tin, candidates, &mut outcome),
        }

        let strip = self.config.strip_corners && tin.num_vertices() > 4;
        outcome.vertices = tin
            .vertices_with_handles()
            .filter(|(handle, _)| !(strip && corners.contains(handle)))
            .map(|(_, point)| point)
            .collect();

        debug!(
            "Refined {} points to {} vertices ({} inserted, {} forced, {} skipped, max error {:.4})",
            points.len(),
            outcome.vertices.len(),
            outcome.insertions,
            outcome.forced,
            outcome.skipped,
            outcome.max_error
        );

        Ok((Some(RefinedTin { tin, corners }), outcome))
    }

    /// Insert points outside the hull and pinned points; return the rest
    fn forced_pass(
        &self,
        tin: &mut Tin,
        extent: &CellExtent,
        points: &[TerrainPoint],
        outcome: &mut RefinementOutcome,
    ) -> Vec<TerrainPoint> {
        let mut candidates = Vec::with_capacity(points.len());
        for point in points {
            let pinned = self.config.seam.pins(extent, point);
            match tin.locate(point.x, point.y) {
                Location::Vertex(_) => outcome.skipped += 1,
                Location::Triangle(_) if !pinned => candidates.push(*point),
                _ => match tin.insert(*point) {
                    Ok(_) => outcome.forced += 1,
                    Err(e) => {
                        warn!("Skipping point: {}", e);
                        outcome.skipped += 1;
                    }
                },
            }
        }
        candidates
    }

    fn triangle_scan(&self, tin: &mut Tin, candidates: Vec<TerrainPoint>, outcome: &mut RefinementOutcome) {
        let threshold = self.config.threshold;
        let mut buckets: HashMap<TriangleKey, Bucket> = HashMap::new();
        for point in candidates {
            assign(tin, &mut buckets, point, outcome);
        }

        let mut queue: PriorityQueue<TriangleKey, ErrorKey> = PriorityQueue::with_capacity(buckets.len());
        for (key, bucket) in buckets.iter_mut() {
            bucket.rescan(tin, key);
            if let Some((_, error)) = bucket.worst {
                queue.push(*key, ErrorKey(error));
            }
        }

        while let Some((key, ErrorKey(error))) = queue.pop() {
            if error < threshold {
                outcome.max_error = error;
                return;
            }
            let mut bucket = match buckets.remove(&key) {
                Some(bucket) => bucket,
                None => continue,
            };
            let worst = match bucket.worst {
                Some((idx, _)) => idx,
                None => continue,
            };
            let point = bucket.points.swap_remove(worst);

            let vertex = match tin.insert(point) {
                Ok(vertex) => vertex,
                Err(e) => {
                    warn!("Skipping point: {}", e);
                    outcome.skipped += 1;
                    bucket.rescan(tin, &key);
                    if let Some((_, error)) = bucket.worst {
                        queue.push(key, ErrorKey(error));
                    }
                    buckets.insert(key, bucket);
                    continue;
                }
            };
            outcome.insertions += 1;

            // Every destroyed triangle has its corners on the new vertex's link
            let mut orphans = bucket.points;
            for (a, b, c) in tin.link(vertex).into_iter().tuple_combinations() {
                let destroyed = TriangleKey::new([a, b, c]);
                if buckets.contains_key(&destroyed) && !tin.is_live(&destroyed) {
                    if let Some(bucket) = buckets.remove(&destroyed) {
                        queue.remove(&destroyed);
                        orphans.extend(bucket.points);
                    }
                }
            }

            let mut touched = HashSet::new();
            for point in orphans {
                if let Some(key) = assign(tin, &mut buckets, point, outcome) {
                    touched.insert(key);
                }
            }
            for key in touched {
                if let Some(bucket) = buckets.get_mut(&key) {
                    bucket.rescan(tin, &key);
                    if let Some((_, error)) = bucket.worst {
                        queue.push(key, ErrorKey(error));
                    }
                }
            }
        }
        outcome.max_error = 0.0;
    }

    fn lazy_recheck(&self, tin: &mut Tin, candidates: Vec<TerrainPoint>, outcome: &mut RefinementOutcome) {
        let threshold = self.config.threshold;
        let mut timer = RefreshTimer::new(self.config.refresh);
        let mut queue: PriorityQueue<usize, ErrorKey> = PriorityQueue::with_capacity(candidates.len());
        for (idx, point) in candidates.iter().enumerate() {
            match candidate_error(tin, point) {
                Some(error) => {
                    queue.push(idx, ErrorKey(error));
                }
                None => outcome.skipped += 1,
            }
        }

        loop {
            while let Some((idx, ErrorKey(cached))) = queue.pop() {
                let point = candidates[idx];
                let current = match candidate_error(tin, &point) {
                    Some(error) => error,
                    None => {
                        outcome.skipped += 1;
                        continue;
                    }
                };
                if current < cached {
                    queue.push(idx, ErrorKey(current));
                    continue;
                }
                if current < threshold {
                    queue.push(idx, ErrorKey(current));
                    break;
                }

                match tin.insert(point) {
                    Ok(_) => outcome.insertions += 1,
                    Err(e) => {
                        warn!("Skipping point: {}", e);
                        outcome.skipped += 1;
                        continue;
                    }
                }

                if timer.tick() {
                    refresh_queue(tin, &candidates, &mut queue, outcome);
                    outcome.refreshes += 1;
                    debug!(
                        "Refreshed {} queued points after {} insertions",
                        queue.len(),
                        outcome.insertions
                    );
                }
            }

            // Verification: exact errors for everything left out
            refresh_queue(tin, &candidates, &mut queue, outcome);
            match queue.peek() {
                Some((_, ErrorKey(error))) if *error >= threshold => {
                    debug!("Verification found error {:.4}, resuming", error);
                }
                Some((_, ErrorKey(error))) => {
                    outcome.max_error = *error;
                    return;
                }
                None => {
                    outcome.max_error = 0.0;
                    return;
                }
            }
        }
    }
}

/// Candidate points sharing one triangle
struct Bucket {
    points: Vec<TerrainPoint>,
    /// Index and error of the worst point
    worst: Option<(usize, f64)>,
}

impl Bucket {
    fn rescan(&mut self, tin: &Tin, key: &TriangleKey) {
        let triangle = tin.triangle_points(key);
        self.worst = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, p)| (idx, (plane_z(&triangle, p.x, p.y) - p.z).abs()))
            .max_by(|a, b| a.1.total_cmp(&b.1));
    }
}

/// Put a point in the bucket of its containing triangle
fn assign(
    tin: &Tin,
    buckets: &mut HashMap<TriangleKey, Bucket>,
    point: TerrainPoint,
    outcome: &mut RefinementOutcome,
) -> Option<TriangleKey> {
    match tin.locate(point.x, point.y) {
        Location::Triangle(key) => {
            buckets
                .entry(key)
                .or_insert_with(|| Bucket {
                    points: Vec::new(),
                    worst: None,
                })
                .points
                .push(point);
            Some(key)
        }
        Location::Vertex(_) => {
            outcome.skipped += 1;
            None
        }
        Location::Outside | Location::Empty => {
            warn!("Point ({}, {}) left the triangulated domain", point.x, point.y);
            outcome.skipped += 1;
            None
        }
    }
}

/// Error of a point not yet in the TIN; `None` once its position is taken
fn candidate_error(tin: &Tin, point: &TerrainPoint) -> Option<f64> {
    match tin.locate(point.x, point.y) {
        Location::Triangle(key) => {
            Some((plane_z(&tin.triangle_points(&key), point.x, point.y) - point.z).abs())
        }
        _ => None,
    }
}

fn refresh_queue(
    tin: &Tin,
    candidates: &[TerrainPoint],
    queue: &mut PriorityQueue<usize, ErrorKey>,
    outcome: &mut RefinementOutcome,
) {
    let queued: Vec<usize> = queue.iter().map(|(idx, _)| *idx).collect();
    for idx in queued {
        match candidate_error(tin, &candidates[idx]) {
            Some(error) => {
                queue.change_priority(&idx, ErrorKey(error));
            }
            None => {
                queue.remove(&idx);
                outcome.skipped += 1;
            }
        }
    }
}
