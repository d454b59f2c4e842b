//! Greedy error-driven TIN simplification
//!
//! This crate builds and thins triangulated irregular networks (TINs) from
//! terrain samples:
//! - Corner seeding of a cell triangulation
//! - Greedy refinement (insert the worst-approximated point until every
//!   point is within the error threshold)
//! - Greedy decimation (remove the least significant vertex until every
//!   removal would exceed the threshold), both in-memory and streamed

pub mod priority;
pub mod tin;
pub mod nearest_neighbor;
pub mod seeding;
pub mod refinement;
pub mod decimation;

pub use priority::*;
pub use tin::*;
pub use nearest_neighbor::*;
pub use seeding::*;
pub use refinement::*;
pub use decimation::*;
