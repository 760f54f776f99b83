//! beaconflow: tails a web-server access log and aggregates client timing
//! beacons into Redis.
//!
//! The workspace crates are re-exported here so binaries and tests can depend
//! on this package alone.

pub mod prelude;

pub use ::cacheable;
pub use ::common;
pub use ::engine;
pub use ::errors;
pub use ::queue;
pub use ::utils;
