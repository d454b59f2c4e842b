//! Record decoding for the two line protocols.
//!
//! The cell stream (input of refinement) carries one record per line:
//!
//! | tag | fields | meaning |
//! |---|---|---|
//! | `n` | count | total number of points |
//! | `c` | dimension | grid is dimension x dimension cells |
//! | `s` | size | cell edge length |
//! | `b` | minx miny maxx maxy | bounding box |
//! | `v` | x y z | one point |
//! | `x` | gx gy | cell finalized |
//! | `#` | ... | comment; `# endsprinkle` ends the sprinkle phase |
//!
//! The star stream (input of decimation) shares `b`, `v` and `#`, but its
//! `x <id> [neighbours]` finalizes a single vertex, and `f` faces are ignored.

use crate::error::RecordError;
use tinsimp_core::{BoundingBox, CellId, TerrainPoint};

/// One decoded line of the cell stream
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Count(u64),
    GridDimension(usize),
    CellSize(f64),
    BoundingBox(BoundingBox),
    Vertex(TerrainPoint),
    CellEnd(CellId),
    EndSprinkle,
    Comment,
    Blank,
    Unknown(String),
}

impl Record {
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let mut tokens = line.split_whitespace();
        let tag = match tokens.next() {
            Some(tag) => tag,
            None => return Ok(Record::Blank),
        };
        let fields: Vec<&str> = tokens.collect();

        if tag.starts_with('#') {
            return Ok(parse_comment(tag, &fields));
        }

        match tag {
            "n" => Ok(Record::Count(parse_field('n', &fields, 1, 0)?)),
            "c" => {
                let dimension: usize = parse_field('c', &fields, 1, 0)?;
                if dimension == 0 {
                    return Err(RecordError::InvalidValue {
                        tag: 'c',
                        message: "grid dimension must be positive".to_string(),
                    });
                }
                Ok(Record::GridDimension(dimension))
            }
            "s" => {
                let size: f64 = parse_field('s', &fields, 1, 0)?;
                if !size.is_finite() || size <= 0.0 {
                    return Err(RecordError::InvalidValue {
                        tag: 's',
                        message: format!("cell size {} must be positive", size),
                    });
                }
                Ok(Record::CellSize(size))
            }
            "b" => Ok(Record::BoundingBox(parse_bbox(&fields)?)),
            "v" => Ok(Record::Vertex(parse_vertex(&fields)?)),
            "x" => {
                let gx = parse_field('x', &fields, 2, 0)?;
                let gy = parse_field('x', &fields, 2, 1)?;
                Ok(Record::CellEnd(CellId::new(gx, gy)))
            }
            other => Ok(Record::Unknown(other.to_string())),
        }
    }

    /// Header records are echoed verbatim to the output stream
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            Record::Count(_) | Record::GridDimension(_) | Record::CellSize(_) | Record::BoundingBox(_)
        )
    }
}

/// One decoded line of the star stream
#[derive(Debug, Clone, PartialEq)]
pub enum StarRecord {
    BoundingBox(BoundingBox),
    Vertex(TerrainPoint),
    /// The star of vertex `id` (1-based, in arrival order) is complete
    Finalize(usize),
    Face,
    Comment,
    Blank,
    Unknown(String),
}

impl StarRecord {
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let mut tokens = line.split_whitespace();
        let tag = match tokens.next() {
            Some(tag) => tag,
            None => return Ok(StarRecord::Blank),
        };
        let fields: Vec<&str> = tokens.collect();

        if tag.starts_with('#') {
            return Ok(StarRecord::Comment);
        }

        match tag {
            "b" => Ok(StarRecord::BoundingBox(parse_bbox(&fields)?)),
            "v" => Ok(StarRecord::Vertex(parse_vertex(&fields)?)),
            "x" => {
                let id: usize = parse_field('x', &fields, 1, 0)?;
                if id == 0 {
                    return Err(RecordError::InvalidValue {
                        tag: 'x',
                        message: "vertex ids start at 1".to_string(),
                    });
                }
                Ok(StarRecord::Finalize(id))
            }
            "f" => Ok(StarRecord::Face),
            other => Ok(StarRecord::Unknown(other.to_string())),
        }
    }
}

fn parse_comment(tag: &str, fields: &[&str]) -> Record {
    let keyword = match tag.strip_prefix('#') {
        Some("") => fields.first().copied().unwrap_or(""),
        Some(rest) => rest,
        None => "",
    };
    if keyword == "endsprinkle" {
        Record::EndSprinkle
    } else {
        Record::Comment
    }
}

fn parse_field<T: std::str::FromStr>(
    tag: char,
    fields: &[&str],
    expected: usize,
    index: usize,
) -> Result<T, RecordError> {
    let token = fields.get(index).ok_or(RecordError::MissingField {
        tag,
        expected,
        found: fields.len(),
    })?;
    token.parse::<T>().map_err(|_| RecordError::InvalidNumber {
        tag,
        token: token.to_string(),
    })
}

fn parse_vertex(fields: &[&str]) -> Result<TerrainPoint, RecordError> {
    let x: f64 = parse_field('v', fields, 3, 0)?;
    let y: f64 = parse_field('v', fields, 3, 1)?;
    let z: f64 = parse_field('v', fields, 3, 2)?;
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return Err(RecordError::InvalidValue {
            tag: 'v',
            message: "coordinates must be finite".to_string(),
        });
    }
    Ok(TerrainPoint::new(x, y, z))
}

fn parse_bbox(fields: &[&str]) -> Result<BoundingBox, RecordError> {
    let min_x = parse_field('b', fields, 4, 0)?;
    let min_y = parse_field('b', fields, 4, 1)?;
    let max_x = parse_field('b', fields, 4, 2)?;
    let max_y = parse_field('b', fields, 4, 3)?;
    BoundingBox::new(min_x, min_y, max_x, max_y).map_err(|e| RecordError::InvalidValue {
        tag: 'b',
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        assert_eq!(Record::parse("n 1500\n").unwrap(), Record::Count(1500));
        assert_eq!(Record::parse("c 4").unwrap(), Record::GridDimension(4));
        assert_eq!(Record::parse("s 250").unwrap(), Record::CellSize(250.0));
        let bbox = Record::parse("b 10 20 1010 1020").unwrap();
        assert_eq!(
            bbox,
            Record::BoundingBox(BoundingBox::new(10.0, 20.0, 1010.0, 1020.0).unwrap())
        );
        assert!(bbox.is_header());
    }

    #[test]
    fn test_parse_vertex_and_cell_end() {
        assert_eq!(
            Record::parse("v 84722.5 446807.25 -3.1").unwrap(),
            Record::Vertex(TerrainPoint::new(84722.5, 446807.25, -3.1))
        );
        let end = Record::parse("x 3 1").unwrap();
        assert_eq!(end, Record::CellEnd(CellId::new(3, 1)));
        assert!(!end.is_header());
    }

    #[test]
    fn test_parse_comments() {
        assert_eq!(Record::parse("# hello").unwrap(), Record::Comment);
        assert_eq!(Record::parse("#").unwrap(), Record::Comment);
        assert_eq!(Record::parse("# endsprinkle").unwrap(), Record::EndSprinkle);
        assert_eq!(Record::parse("#endsprinkle").unwrap(), Record::EndSprinkle);
        assert_eq!(Record::parse("   \n").unwrap(), Record::Blank);
        assert_eq!(Record::parse("").unwrap(), Record::Blank);
    }

    #[test]
    fn test_parse_unknown_tag() {
        assert_eq!(Record::parse("q 1 2").unwrap(), Record::Unknown("q".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Record::parse("v 1 2"),
            Err(RecordError::MissingField { tag: 'v', expected: 3, found: 2 })
        ));
        assert!(matches!(
            Record::parse("x a 1"),
            Err(RecordError::InvalidNumber { tag: 'x', .. })
        ));
        assert!(Record::parse("c 0").is_err());
        assert!(Record::parse("s -1").is_err());
        assert!(Record::parse("b 0 0 0 0").is_err());
        assert!(Record::parse("v 1 NaN 2").is_err());
    }

    #[test]
    fn test_parse_star_records() {
        assert_eq!(
            StarRecord::parse("v 1 2 3").unwrap(),
            StarRecord::Vertex(TerrainPoint::new(1.0, 2.0, 3.0))
        );
        assert_eq!(StarRecord::parse("x 17 [3, 5, 9]").unwrap(), StarRecord::Finalize(17));
        assert_eq!(StarRecord::parse("x 4").unwrap(), StarRecord::Finalize(4));
        assert_eq!(StarRecord::parse("f 1 2 3").unwrap(), StarRecord::Face);
        assert!(StarRecord::parse("x 0").is_err());
        assert_eq!(StarRecord::parse("# c").unwrap(), StarRecord::Comment);
    }

    #[test]
    fn test_record_error_line_number() {
        let err = Record::parse("v 1 2").unwrap_err().at_line(42);
        assert!(matches!(err, tinsimp_core::Error::Parse { line: 42, .. }));
    }
}
