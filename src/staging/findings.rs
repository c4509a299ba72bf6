// src/staging/findings.rs

//! Fatal errors and warnings produced while analysing a batch.

use std::fmt;

use serde::Serialize;

use crate::dag::CycleError;

/// A finding that aborts staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagingError {
    Cycle(CycleError),
    UnresolvableTarget { item: String },
    AlreadyTracked { item: String, convoy: String },
}

impl fmt::Display for StagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingError::Cycle(c) => write!(f, "{c}"),
            StagingError::UnresolvableTarget { item } => {
                write!(f, "{item} has no resolvable target environment")
            }
            StagingError::AlreadyTracked { item, convoy } => {
                write!(f, "{item} is already tracked by active convoy {convoy}")
            }
        }
    }
}

/// A finding that stages the convoy as `staged:warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagingWarning {
    /// No execution-relevant edges in either direction.
    Isolated { item: String },
    PausedTarget { item: String, target: String },
    CrossTarget {
        item: String,
        target: String,
        majority: String,
    },
    OversizedWave {
        wave: usize,
        size: usize,
        limit: usize,
    },
    MissingIntegrationPoint { container: String, children: usize },
}

impl fmt::Display for StagingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingWarning::Isolated { item } => {
                write!(f, "{item} has no blocking edges to the rest of the batch")
            }
            StagingWarning::PausedTarget { item, target } => {
                write!(f, "{item} targets paused environment {target}")
            }
            StagingWarning::CrossTarget {
                item,
                target,
                majority,
            } => write!(
                f,
                "{item} targets {target} while most of the batch targets {majority}"
            ),
            StagingWarning::OversizedWave { wave, size, limit } => {
                write!(f, "wave {wave} has {size} items (limit {limit})")
            }
            StagingWarning::MissingIntegrationPoint {
                container,
                children,
            } => write!(
                f,
                "{container} has {children} children but no integration point"
            ),
        }
    }
}
