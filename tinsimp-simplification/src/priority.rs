//! Priority keys for the refinement and decimation queues

use std::cmp::Ordering;

/// Vertical error used as a queue priority.
///
/// `f64` is not `Ord`; errors are compared with `total_cmp` so the queue
/// ordering is total even for pathological inputs.
#[derive(Debug, Clone, Copy)]
pub struct ErrorKey(pub f64);

impl ErrorKey {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ErrorKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for ErrorKey {}

impl PartialOrd for ErrorKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ErrorKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Planar position of a point as a hashable key (exact bit pattern)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey(u64, u64);

impl PositionKey {
    pub fn new(x: f64, y: f64) -> Self {
        // -0.0 and 0.0 are the same position
        Self((x + 0.0).to_bits(), (y + 0.0).to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use priority_queue::PriorityQueue;
    use std::cmp::Reverse;

    #[test]
    fn test_error_key_max_heap() {
        let mut queue = PriorityQueue::new();
        queue.push(1usize, ErrorKey(0.3));
        queue.push(2usize, ErrorKey(2.5));
        queue.push(3usize, ErrorKey(0.0));
        assert_eq!(queue.pop().map(|(k, _)| k), Some(2));
        assert_eq!(queue.pop().map(|(k, _)| k), Some(1));
    }

    #[test]
    fn test_error_key_min_heap() {
        let mut queue = PriorityQueue::new();
        queue.push(1usize, Reverse(ErrorKey(0.3)));
        queue.push(2usize, Reverse(ErrorKey(2.5)));
        queue.push(3usize, Reverse(ErrorKey(0.01)));
        assert_eq!(queue.pop().map(|(k, _)| k), Some(3));
    }

    #[test]
    fn test_position_key_signed_zero() {
        assert_eq!(PositionKey::new(0.0, 1.0), PositionKey::new(-0.0, 1.0));
        assert_ne!(PositionKey::new(0.0, 1.0), PositionKey::new(1.0, 0.0));
    }
}
