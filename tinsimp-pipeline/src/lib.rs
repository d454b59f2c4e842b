//! Streaming pipelines for tinsimp
//!
//! This crate connects the line protocols to the simplification engines:
//! - A bounded worker pool that refines finalized cells concurrently and
//!   writes each cell's output as one atomic batch
//! - The refinement processor driving a cell stream
//! - The decimation processor driving a star stream

pub mod parallel;
pub mod scheduler;
pub mod refine_stream;
pub mod decimate_stream;

pub use parallel::*;
pub use scheduler::*;
pub use refine_stream::*;
pub use decimate_stream::*;
