//! Core traits for tinsimp

/// Trait for planar nearest neighbor search over indexed points
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query position, as
    /// `(index, distance)` pairs sorted by increasing distance. Returns fewer
    /// than `k` entries when the index holds fewer points. Points at equal
    /// distance are ordered by position, so the selection does not depend on
    /// the order the points were indexed in.
    fn find_k_nearest(&self, query: [f64; 2], k: usize) -> Vec<(usize, f64)>;
}
