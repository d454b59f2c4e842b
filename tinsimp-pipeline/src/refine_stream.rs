//! Refinement of a cell stream
//!
//! Reads the cell stream line by line, buckets points into the spatial grid
//! and hands every finalized, non-empty cell to the scheduler. Header lines
//! are echoed; each cell's vertices are followed by its echoed cell-end line.

use crate::scheduler::{CellScheduler, SchedulerConfig, SchedulerStats};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tinsimp_core::{CellId, CellJob, Error, GridBuilder, Result, SpatialGrid};
use tinsimp_io::Record;
use tinsimp_simplification::{GreedyRefiner, RefinementConfig};

/// Configuration of the refinement pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub refinement: RefinementConfig,
    pub scheduler: SchedulerConfig,
    /// The stream opens with sprinkle points that are passed through
    /// unchanged until `# endsprinkle`
    pub expect_sprinkle: bool,
}

impl ProcessorConfig {
    pub fn with_refinement(mut self, refinement: RefinementConfig) -> Self {
        self.refinement = refinement;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_expect_sprinkle(mut self, expect_sprinkle: bool) -> Self {
        self.expect_sprinkle = expect_sprinkle;
        self
    }
}

/// Counters of one refinement session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub lines: usize,
    /// Point count announced by the `n` header
    pub announced_points: Option<u64>,
    pub points: usize,
    pub cells_finalized: usize,
    pub empty_cells: usize,
    pub sprinkle_lines: usize,
    pub unknown_records: usize,
    pub scheduler: SchedulerStats,
}

/// Drives refinement from a cell stream into a sink
pub struct RefinementProcessor<W: Write + Send + 'static> {
    builder: GridBuilder,
    grid: Option<SpatialGrid>,
    scheduler: CellScheduler<W>,
    sprinkling: bool,
    summary: ProcessingSummary,
}

impl<W: Write + Send + 'static> RefinementProcessor<W> {
    pub fn new(config: ProcessorConfig, sink: W) -> Result<Self> {
        let refiner = GreedyRefiner::new(config.refinement)?;
        let scheduler = CellScheduler::new(config.scheduler, sink, move |job: &CellJob| {
            refiner
                .refine_cell(&job.extent, &job.points)
                .map(|outcome| outcome.vertices)
        })?;
        Ok(Self {
            builder: GridBuilder::new(),
            grid: None,
            scheduler,
            sprinkling: config.expect_sprinkle,
            summary: ProcessingSummary::default(),
        })
    }

    /// Number of lines processed so far
    pub fn line_number(&self) -> usize {
        self.summary.lines
    }

    pub fn summary(&self) -> &ProcessingSummary {
        &self.summary
    }

    /// Process every line of a reader
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            self.process_line(&line?)?;
        }
        Ok(())
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        self.summary.lines += 1;
        let record = Record::parse(line).map_err(|e| e.at_line(self.summary.lines))?;

        if self.sprinkling {
            match record {
                Record::EndSprinkle => {
                    info!("Sprinkling done after {} lines", self.summary.sprinkle_lines);
                    self.sprinkling = false;
                    return Ok(());
                }
                Record::Vertex(_) | Record::CellEnd(_) => {
                    self.summary.sprinkle_lines += 1;
                    return self.scheduler.write_line(line);
                }
                _ => {}
            }
        }

        match record {
            Record::Count(count) => {
                self.summary.announced_points = Some(count);
                self.scheduler.write_line(line)
            }
            Record::GridDimension(dimension) => {
                self.configure(|builder| {
                    builder.dimension(dimension);
                })?;
                self.scheduler.write_line(line)
            }
            Record::CellSize(size) => {
                self.configure(|builder| {
                    builder.cell_size(size);
                })?;
                self.scheduler.write_line(line)
            }
            Record::BoundingBox(bbox) => {
                self.configure(|builder| {
                    builder.bbox(bbox);
                })?;
                self.scheduler.write_line(line)
            }
            Record::Vertex(point) => {
                self.grid_mut()?.insert(point)?;
                self.summary.points += 1;
                Ok(())
            }
            Record::CellEnd(cell) => self.finalize(cell, line),
            Record::EndSprinkle | Record::Comment | Record::Blank => Ok(()),
            Record::Unknown(tag) => {
                self.summary.unknown_records += 1;
                warn!("Ignoring unknown record '{}' on line {}", tag, self.summary.lines);
                Ok(())
            }
        }
    }

    /// Wait for all cells and return the summary together with the sink
    pub fn finish(mut self) -> Result<(ProcessingSummary, W)> {
        self.summary.scheduler = self.scheduler.finish()?;
        if let Some(grid) = &self.grid {
            if grid.pending_cells() > 0 {
                warn!(
                    "{} cells with {} points were never finalized",
                    grid.pending_cells(),
                    grid.pending_points()
                );
            }
        }
        if let Some(announced) = self.summary.announced_points {
            if announced != self.summary.points as u64 {
                warn!(
                    "Stream announced {} points but delivered {}",
                    announced, self.summary.points
                );
            }
        }
        info!(
            "Refinement finished: {} points in {} cells ({} empty), {} vertices written",
            self.summary.points,
            self.summary.cells_finalized,
            self.summary.empty_cells,
            self.summary.scheduler.vertices_written
        );
        let sink = self.scheduler.into_sink()?;
        Ok((self.summary, sink))
    }

    fn configure<F: FnOnce(&mut GridBuilder)>(&mut self, apply: F) -> Result<()> {
        if self.grid.is_some() {
            warn!(
                "Grid header on line {} after the grid was set up, ignored",
                self.summary.lines
            );
            return Ok(());
        }
        apply(&mut self.builder);
        if self.builder.is_complete() {
            let grid = self.builder.build()?;
            debug!(
                "Grid configured: {}x{} cells of size {}",
                grid.dimension, grid.dimension, grid.cell_size
            );
            self.grid = Some(SpatialGrid::new(grid));
        }
        Ok(())
    }

    fn grid_mut(&mut self) -> Result<&mut SpatialGrid> {
        match &mut self.grid {
            Some(grid) => Ok(grid),
            // Name the first missing header
            None => Err(self
                .builder
                .build()
                .err()
                .unwrap_or(Error::GridNotConfigured("grid"))),
        }
    }

    fn finalize(&mut self, cell: CellId, line: &str) -> Result<()> {
        let grid = self.grid_mut()?;
        let points = grid.finalize(cell)?;
        let extent = grid.grid().cell_extent(cell);
        self.summary.cells_finalized += 1;

        if points.is_empty() {
            self.summary.empty_cells += 1;
            return self.scheduler.write_line(line);
        }

        self.scheduler.submit(CellJob {
            cell,
            extent,
            points,
            end_line: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn processor() -> RefinementProcessor<Vec<u8>> {
        let config = ProcessorConfig::default().with_scheduler(
            SchedulerConfig::default()
                .with_max_workers(2)
                .with_poll_interval(Duration::from_millis(5)),
        );
        RefinementProcessor::new(config, Vec::new()).unwrap()
    }

    #[test]
    fn test_headers_echoed_and_grid_built() {
        let mut p = processor();
        for line in ["n 0", "c 2", "s 5", "b 0 0 10 10"] {
            p.process_line(line).unwrap();
        }
        assert!(p.grid.is_some());
        let (summary, out) = p.finish().unwrap();
        assert_eq!(summary.announced_points, Some(0));
        assert_eq!(String::from_utf8(out).unwrap(), "n 0\nc 2\ns 5\nb 0 0 10 10\n");
    }

    #[test]
    fn test_vertex_before_grid_fails() {
        let mut p = processor();
        p.process_line("c 2").unwrap();
        let err = p.process_line("v 1 1 1").unwrap_err();
        assert!(matches!(err, Error::GridNotConfigured(_)));
    }

    #[test]
    fn test_parse_error_carries_line() {
        let mut p = processor();
        p.process_line("# header").unwrap();
        let err = p.process_line("v 1 x 1").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_unknown_records_ignored() {
        let mut p = processor();
        p.process_line("q 1 2 3").unwrap();
        p.process_line("").unwrap();
        assert_eq!(p.summary().unknown_records, 1);
        let (_, out) = p.finish().unwrap();
        assert!(out.is_empty());
    }
}
