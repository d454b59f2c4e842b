//! Stream I/O for tinsimp
//!
//! Decodes the line protocols consumed by the refinement and decimation
//! pipelines and formats their output lines.

pub mod error;
pub mod records;

pub use error::*;
pub use records::*;

use tinsimp_core::TerrainPoint;

/// Format one output vertex line (without the trailing newline)
pub fn format_vertex(point: &TerrainPoint) -> String {
    format!("v {} {} {}", point.x, point.y, point.z)
}

/// Format one output face line from 1-based vertex indices
pub fn format_face(face: [usize; 3]) -> String {
    format!("f {} {} {}", face[0], face[1], face[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_vertex() {
        assert_eq!(format_vertex(&TerrainPoint::new(0.5, 12.0, -1.25)), "v 0.5 12 -1.25");
    }

    #[test]
    fn test_format_vertex_parses_back() {
        let point = TerrainPoint::new(84722.123456789, 446807.000001, 3.3333333333333335);
        let parsed = Record::parse(&format_vertex(&point)).unwrap();
        assert_eq!(parsed, Record::Vertex(point));
    }

    #[test]
    fn test_format_face() {
        assert_eq!(format_face([1, 5, 3]), "f 1 5 3");
    }
}
