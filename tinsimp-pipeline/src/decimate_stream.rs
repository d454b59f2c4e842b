//! Decimation of a star stream

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tinsimp_core::{BoundingBox, Result};
use tinsimp_io::StarRecord;
use tinsimp_simplification::{DecimationConfig, GreedyDecimator, StreamingDecimator, StreamingStats};

/// Counters of one decimation session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecimationSummary {
    pub lines: usize,
    pub faces_ignored: usize,
    pub unknown_records: usize,
    /// Vertices received outside the announced bounding box
    pub outside_bbox: usize,
}

/// Drives a `StreamingDecimator` from a star stream
pub struct DecimationProcessor<W: Write> {
    stream: StreamingDecimator<W>,
    bbox: Option<BoundingBox>,
    summary: DecimationSummary,
}

impl<W: Write> DecimationProcessor<W> {
    pub fn new(config: DecimationConfig, sink: W) -> Result<Self> {
        let decimator = GreedyDecimator::new(config)?;
        Ok(Self {
            stream: StreamingDecimator::new(decimator, sink),
            bbox: None,
            summary: DecimationSummary::default(),
        })
    }

    pub fn line_number(&self) -> usize {
        self.summary.lines
    }

    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            self.process_line(&line?)?;
        }
        Ok(())
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        self.summary.lines += 1;
        match StarRecord::parse(line).map_err(|e| e.at_line(self.summary.lines))? {
            StarRecord::BoundingBox(bbox) => {
                debug!("Star stream bounding box {:?}", bbox);
                self.bbox = Some(bbox);
                Ok(())
            }
            StarRecord::Vertex(point) => {
                if let Some(bbox) = &self.bbox {
                    if !bbox.contains(point.x, point.y) {
                        if self.summary.outside_bbox == 0 {
                            warn!(
                                "Vertex ({}, {}) on line {} lies outside the bounding box",
                                point.x, point.y, self.summary.lines
                            );
                        }
                        self.summary.outside_bbox += 1;
                    }
                }
                self.stream.add_vertex(point)
            }
            StarRecord::Finalize(id) => self.stream.finalize(id),
            StarRecord::Face => {
                self.summary.faces_ignored += 1;
                Ok(())
            }
            StarRecord::Comment | StarRecord::Blank => Ok(()),
            StarRecord::Unknown(tag) => {
                self.summary.unknown_records += 1;
                warn!("Ignoring unknown record '{}' on line {}", tag, self.summary.lines);
                Ok(())
            }
        }
    }

    /// Run the final round and return the counters together with the sink
    pub fn finish(self) -> Result<(DecimationSummary, StreamingStats, W)> {
        let (sink, stats) = self.stream.finish()?;
        Ok((self.summary, stats, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_with_flat_center() {
        let input = "b 0 0 10 10\n\
                     v 0 0 0\n\
                     v 10 0 0\n\
                     v 0 10 0\n\
                     v 10 10 0\n\
                     v 5 4 0\n\
                     f 1 2 5\n\
                     x 5 [1, 2, 3, 4]\n";
        let mut processor = DecimationProcessor::new(DecimationConfig::default(), Vec::new()).unwrap();
        processor.run(input.as_bytes()).unwrap();
        let (summary, stats, out) = processor.finish().unwrap();
        assert_eq!(summary.faces_ignored, 1);
        assert_eq!(stats.received, 5);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.written_vertices, 4);
        assert_eq!(stats.written_faces, 2);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 4);
        assert!(!text.contains("v 5 4 0"));
    }

    #[test]
    fn test_bad_finalize_id() {
        let mut processor = DecimationProcessor::new(DecimationConfig::default(), Vec::new()).unwrap();
        processor.process_line("v 1 1 1").unwrap();
        assert!(processor.process_line("x 9").is_err());
        assert!(processor.process_line("x nope").is_err());
    }
}
