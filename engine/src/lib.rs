//! The beacon pipeline: tailer, classifier pool, aggregators and persistence
//! writer, wired together by [`Engine`].

pub mod aggregator;
pub mod classifier;
pub mod engine;
pub mod keepalive;
pub mod monitor;
pub mod tailer;
pub mod writer;

pub use engine::Engine;
