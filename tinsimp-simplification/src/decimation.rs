//! Greedy decimation of a dense TIN
//!
//! The inverse of refinement: repeatedly remove the vertex whose removal
//! changes the surface least, until every remaining removal would move the
//! surface by at least the threshold. Hull vertices are never removed.

use crate::priority::{ErrorKey, PositionKey};
use crate::tin::Tin;
use log::{debug, info};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tinsimp_core::{Error, Result, TerrainPoint};
use tinsimp_io::{format_face, format_vertex};

/// Configuration for greedy decimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimationConfig {
    /// Vertices whose removal changes z by less than this are removed
    pub threshold: f64,
    /// Removals between full recomputations of the queue
    pub refresh_interval: usize,
    /// Recompute each popped delta before acting on it
    pub recheck_on_pop: bool,
    /// Recompute everything when the queue runs dry and resume if needed
    pub verify: bool,
    /// Streaming: vertices received between decimation rounds
    pub batch_size: usize,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            refresh_interval: 100,
            recheck_on_pop: false,
            verify: true,
            batch_size: 100_000,
        }
    }
}

impl DecimationConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: usize) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_recheck_on_pop(mut self, recheck_on_pop: bool) -> Self {
        self.recheck_on_pop = recheck_on_pop;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "Decimation threshold must be positive, got {}",
                self.threshold
            )));
        }
        if self.refresh_interval == 0 {
            return Err(Error::InvalidConfig(
                "Refresh interval must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("Batch size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Result of one decimation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecimationOutcome {
    pub removed: usize,
    pub remaining: usize,
    pub refreshes: usize,
    /// Smallest removal delta left among eligible vertices
    pub min_delta: Option<f64>,
}

type DeltaQueue = PriorityQueue<PositionKey, Reverse<ErrorKey>>;

/// Greedy removal-based TIN decimation
#[derive(Debug, Clone)]
pub struct GreedyDecimator {
    config: DecimationConfig,
}

impl GreedyDecimator {
    pub fn new(config: DecimationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DecimationConfig {
        &self.config
    }

    /// Decimate over every vertex of the TIN
    pub fn decimate(&self, tin: &mut Tin) -> Result<DecimationOutcome> {
        self.decimate_where(tin, |_| true)
    }

    /// Decimate, considering only vertices for which `eligible` holds
    pub fn decimate_where<F>(&self, tin: &mut Tin, eligible: F) -> Result<DecimationOutcome>
    where
        F: Fn(&TerrainPoint) -> bool,
    {
        let threshold = self.config.threshold;
        let mut outcome = DecimationOutcome::default();
        let mut positions: HashMap<PositionKey, TerrainPoint> = HashMap::new();
        let mut queue = DeltaQueue::new();
        fill_queue(tin, &eligible, &mut queue, &mut positions)?;

        let mut since_refresh = 0;
        loop {
            while let Some((key, Reverse(ErrorKey(cached)))) = queue.pop() {
                let point = match positions.get(&key) {
                    Some(point) => *point,
                    None => continue,
                };

                let delta = if self.config.recheck_on_pop {
                    match tin.removal_delta(point.x, point.y)? {
                        Some(delta) if delta > cached => {
                            queue.push(key, Reverse(ErrorKey(delta)));
                            continue;
                        }
                        Some(delta) => delta,
                        None => {
                            positions.remove(&key);
                            continue;
                        }
                    }
                } else {
                    cached
                };

                if delta >= threshold {
                    queue.push(key, Reverse(ErrorKey(delta)));
                    break;
                }

                let neighbors = tin.neighbors(point.x, point.y);
                if tin.remove_at(point.x, point.y).is_none() {
                    positions.remove(&key);
                    continue;
                }
                positions.remove(&key);
                outcome.removed += 1;

                // A removal only changes the deltas of its former neighbors
                for neighbor in neighbors {
                    let neighbor_key = PositionKey::new(neighbor.x, neighbor.y);
                    if queue.get(&neighbor_key).is_none() {
                        continue;
                    }
                    match tin.removal_delta(neighbor.x, neighbor.y)? {
                        Some(delta) => {
                            queue.change_priority(&neighbor_key, Reverse(ErrorKey(delta)));
                        }
                        None => {
                            queue.remove(&neighbor_key);
                        }
                    }
                }

                since_refresh += 1;
                if since_refresh >= self.config.refresh_interval {
                    refresh_queue(tin, &mut queue, &positions)?;
                    outcome.refreshes += 1;
                    since_refresh = 0;
                }
            }

            if !self.config.verify {
                break;
            }
            queue.clear();
            positions.clear();
            fill_queue(tin, &eligible, &mut queue, &mut positions)?;
            match queue.peek() {
                Some((_, Reverse(ErrorKey(delta)))) if *delta < threshold => {
                    debug!("Verification found delta {:.4}, resuming", delta);
                }
                _ => break,
            }
        }

        outcome.remaining = tin.num_vertices();
        outcome.min_delta = queue.peek().map(|(_, Reverse(ErrorKey(delta)))| *delta);
        Ok(outcome)
    }
}

fn fill_queue<F>(
    tin: &mut Tin,
    eligible: &F,
    queue: &mut DeltaQueue,
    positions: &mut HashMap<PositionKey, TerrainPoint>,
) -> Result<()>
where
    F: Fn(&TerrainPoint) -> bool,
{
    let candidates: Vec<TerrainPoint> = tin.vertices().filter(|p| eligible(p)).collect();
    for point in candidates {
        if let Some(delta) = tin.removal_delta(point.x, point.y)? {
            let key = PositionKey::new(point.x, point.y);
            positions.insert(key, point);
            queue.push(key, Reverse(ErrorKey(delta)));
        }
    }
    Ok(())
}

fn refresh_queue(
    tin: &mut Tin,
    queue: &mut DeltaQueue,
    positions: &HashMap<PositionKey, TerrainPoint>,
) -> Result<()> {
    let queued: Vec<PositionKey> = queue.iter().map(|(key, _)| *key).collect();
    for key in queued {
        let point = match positions.get(&key) {
            Some(point) => *point,
            None => {
                queue.remove(&key);
                continue;
            }
        };
        match tin.removal_delta(point.x, point.y)? {
            Some(delta) => {
                queue.change_priority(&key, Reverse(ErrorKey(delta)));
            }
            None => {
                queue.remove(&key);
            }
        }
    }
    Ok(())
}

/// Counters of a streaming decimation session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingStats {
    pub received: usize,
    pub removed: usize,
    pub written_vertices: usize,
    pub written_faces: usize,
    pub rounds: usize,
}

/// Decimates a streamed triangulation and writes the result incrementally.
///
/// Vertices are added as they arrive; `finalize` marks a vertex whose star is
/// complete. Every `batch_size` received vertices a decimation round runs
/// over finalized, not yet written vertices, after which the surviving
/// finalized vertices are written as `v` lines and every triangle whose
/// three corners are written as an `f` line (1-based output indices,
/// counter-clockwise). Written vertices are frozen.
pub struct StreamingDecimator<W: Write> {
    decimator: GreedyDecimator,
    tin: Tin,
    out: W,
    arrivals: Vec<TerrainPoint>,
    finalized: HashSet<PositionKey>,
    written: HashMap<PositionKey, usize>,
    written_faces: HashSet<[usize; 3]>,
    since_round: usize,
    stats: StreamingStats,
}

impl<W: Write> StreamingDecimator<W> {
    pub fn new(decimator: GreedyDecimator, out: W) -> Self {
        Self {
            decimator,
            tin: Tin::new(),
            out,
            arrivals: Vec::new(),
            finalized: HashSet::new(),
            written: HashMap::new(),
            written_faces: HashSet::new(),
            since_round: 0,
            stats: StreamingStats::default(),
        }
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    pub fn tin(&self) -> &Tin {
        &self.tin
    }

    pub fn add_vertex(&mut self, point: TerrainPoint) -> Result<()> {
        self.tin.insert(point)?;
        self.arrivals.push(point);
        self.stats.received += 1;
        self.since_round += 1;
        if self.since_round >= self.decimator.config().batch_size {
            self.round()?;
        }
        Ok(())
    }

    /// Mark the vertex with 1-based arrival id `id` as finalized
    pub fn finalize(&mut self, id: usize) -> Result<()> {
        let point = id
            .checked_sub(1)
            .and_then(|idx| self.arrivals.get(idx))
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "Finalized vertex {} was never received ({} vertices so far)",
                    id,
                    self.arrivals.len()
                ))
            })?;
        self.finalized.insert(PositionKey::new(point.x, point.y));
        Ok(())
    }

    /// Decimate the finalized, unwritten vertices and flush what is done
    pub fn round(&mut self) -> Result<()> {
        self.since_round = 0;
        let finalized = &self.finalized;
        let written = &self.written;
        let outcome = self.decimator.decimate_where(&mut self.tin, |p| {
            let key = PositionKey::new(p.x, p.y);
            finalized.contains(&key) && !written.contains_key(&key)
        })?;
        self.stats.removed += outcome.removed;
        self.stats.rounds += 1;
        debug!(
            "Decimation round {}: removed {}, {} vertices in TIN",
            self.stats.rounds, outcome.removed, outcome.remaining
        );
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        let ready: Vec<TerrainPoint> = self
            .tin
            .vertices()
            .filter(|p| {
                let key = PositionKey::new(p.x, p.y);
                self.finalized.contains(&key) && !self.written.contains_key(&key)
            })
            .collect();
        for point in ready {
            writeln!(self.out, "{}", format_vertex(&point))?;
            let index = self.written.len() + 1;
            self.written.insert(PositionKey::new(point.x, point.y), index);
            self.stats.written_vertices += 1;
        }

        let mut faces = Vec::new();
        for triangle in self.tin.triangles() {
            let ids = triangle.map(|p| self.written.get(&PositionKey::new(p.x, p.y)).copied());
            if let [Some(a), Some(b), Some(c)] = ids {
                let mut sorted = [a, b, c];
                sorted.sort_unstable();
                if self.written_faces.insert(sorted) {
                    faces.push([a, b, c]);
                }
            }
        }
        for face in faces {
            writeln!(self.out, "{}", format_face(face))?;
            self.stats.written_faces += 1;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Treat every vertex as finalized, run a last round and return the sink
    pub fn finish(mut self) -> Result<(W, StreamingStats)> {
        for point in &self.arrivals {
            self.finalized.insert(PositionKey::new(point.x, point.y));
        }
        self.round()?;
        info!(
            "Decimation finished: {} received, {} removed, {} vertices and {} faces written",
            self.stats.received,
            self.stats.removed,
            self.stats.written_vertices,
            self.stats.written_faces
        );
        Ok((self.out, self.stats))
    }
}
