// src/staging/mod.rs

//! Staging pipeline.
//!
//! Turns a container, an explicit item list or an existing staged convoy
//! into a validated dependency graph and a wave plan, then persists the
//! convoy as `staged:ready` or `staged:warnings`. Fatal findings abort with
//! no side effects.

pub mod findings;
pub mod input;
pub mod pipeline;

pub use findings::{StagingError, StagingWarning};
pub use input::StageInput;
pub use pipeline::{analyze, stage, Analysis, StageOptions, StageReport, StagedItem, StagedWave};
