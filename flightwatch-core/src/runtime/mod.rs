//! Runtime helpers shared by pipeline stages.

pub mod partitioner;

pub use partitioner::*;
