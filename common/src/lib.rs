//! Shared domain models and operational building blocks.
//!
//! Everything the pipeline stages pass between each other lives in [`model`];
//! configuration, retry policy and the pipeline counters are shared here so
//! the store and engine crates agree on them.

pub mod model;
pub mod policy;
pub mod stats;
