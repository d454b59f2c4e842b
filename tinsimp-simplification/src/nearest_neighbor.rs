//! Nearest neighbor search over planar point positions

use rstar::primitives::GeomWithData;
use rstar::RTree;
use tinsimp_core::{NearestNeighborSearch, TerrainPoint};

type IndexedPosition = GeomWithData<[f64; 2], usize>;

/// R*-tree index over the (x, y) of a point set
pub struct RTreeIndex {
    tree: RTree<IndexedPosition>,
    points: Vec<TerrainPoint>,
}

impl RTreeIndex {
    pub fn new(points: &[TerrainPoint]) -> Self {
        let items = points
            .iter()
            .enumerate()
            .map(|(idx, p)| GeomWithData::new([p.x, p.y], idx))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            points: points.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl NearestNeighborSearch for RTreeIndex {
    fn find_k_nearest(&self, query: [f64; 2], k: usize) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }

        // Keep pulling past k while the distance ties the k-th one
        let mut found: Vec<(usize, f64)> = Vec::with_capacity(k);
        for item in self.tree.nearest_neighbor_iter(&query) {
            let d2 = squared_distance(item.geom(), &query);
            if found.len() >= k && found.last().map_or(true, |&(_, last)| d2 > last) {
                break;
            }
            found.push((item.data, d2));
        }

        finish_selection(found, &self.points, k)
    }
}

/// Simple brute force nearest neighbor search for small datasets
pub struct BruteForceSearch {
    points: Vec<TerrainPoint>,
}

impl BruteForceSearch {
    pub fn new(points: &[TerrainPoint]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: [f64; 2], k: usize) -> Vec<(usize, f64)> {
        let distances: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, p)| (idx, squared_distance(&[p.x, p.y], &query)))
            .collect();

        finish_selection(distances, &self.points, k)
    }
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Sort candidates by distance then position, keep k, convert to distances
fn finish_selection(
    mut candidates: Vec<(usize, f64)>,
    points: &[TerrainPoint],
    k: usize,
) -> Vec<(usize, f64)> {
    candidates.sort_by(|a, b| {
        let (pa, pb) = (&points[a.0], &points[b.0]);
        a.1.total_cmp(&b.1)
            .then_with(|| pa.x.total_cmp(&pb.x))
            .then_with(|| pa.y.total_cmp(&pb.y))
            .then_with(|| pa.z.total_cmp(&pb.z))
    });
    candidates.truncate(k);
    candidates
        .into_iter()
        .map(|(idx, d2)| (idx, d2.sqrt()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<TerrainPoint> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                TerrainPoint::new(
                    rng.gen_range(0.0..100.0),
                    rng.gen_range(0.0..100.0),
                    rng.gen_range(-5.0..5.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_rtree_matches_brute_force() {
        let points = random_points(500, 7);
        let rtree = RTreeIndex::new(&points);
        let brute = BruteForceSearch::new(&points);
        for query in [[0.0, 0.0], [50.0, 50.0], [99.9, 0.1], [-20.0, 130.0]] {
            let a = rtree.find_k_nearest(query, 10);
            let b = brute.find_k_nearest(query, 10);
            assert_eq!(a.len(), 10);
            let ia: Vec<usize> = a.iter().map(|(i, _)| *i).collect();
            let ib: Vec<usize> = b.iter().map(|(i, _)| *i).collect();
            assert_eq!(ia, ib);
            for pair in a.windows(2) {
                assert!(pair[0].1 <= pair[1].1);
            }
        }
    }

    #[test]
    fn test_fewer_points_than_k() {
        let points = random_points(3, 1);
        let rtree = RTreeIndex::new(&points);
        assert_eq!(rtree.len(), 3);
        assert_eq!(rtree.find_k_nearest([1.0, 1.0], 10).len(), 3);
        assert!(rtree.find_k_nearest([1.0, 1.0], 0).is_empty());
    }

    #[test]
    fn test_ties_resolved_by_position() {
        // Four points at distance 1 from the origin
        let points = vec![
            TerrainPoint::new(0.0, 1.0, 1.0),
            TerrainPoint::new(1.0, 0.0, 2.0),
            TerrainPoint::new(-1.0, 0.0, 3.0),
            TerrainPoint::new(0.0, -1.0, 4.0),
        ];
        let mut reversed = points.clone();
        reversed.reverse();

        let pick = |pts: &[TerrainPoint]| -> Vec<f64> {
            let index = RTreeIndex::new(pts);
            index
                .find_k_nearest([0.0, 0.0], 2)
                .into_iter()
                .map(|(i, d)| {
                    assert_relative_eq!(d, 1.0);
                    pts[i].z
                })
                .collect()
        };
        assert_eq!(pick(&points), pick(&reversed));
        assert_eq!(pick(&points), vec![3.0, 4.0]);
    }
}
