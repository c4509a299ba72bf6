// src/dag/mod.rs

//! Dependency graph and wave planning.
//!
//! - [`graph`] builds the execution-order graph of a batch and detects
//!   cycles among blocking edges.
//! - [`waves`] peels an acyclic graph into deterministic dispatch waves.

pub mod graph;
pub mod waves;

pub use graph::{CycleError, DependencyGraph, ItemDescriptor};
pub use waves::{compute_waves, Wave, WavePlan};
