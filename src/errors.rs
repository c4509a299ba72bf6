// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::staging::StagingError;
use crate::types::ConvoyStatus;

#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Work item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Staging rejected: {}", format_findings(.errors))]
    StagingRejected { errors: Vec<StagingError> },

    #[error("Convoy {convoy} cannot move from {from} to {to}")]
    InvalidTransition {
        convoy: String,
        from: ConvoyStatus,
        to: ConvoyStatus,
    },

    #[error("Item {item} is already tracked by active convoy {convoy}")]
    AlreadyTracked { item: String, convoy: String },

    #[error("Dispatch of {item} to {target} failed: {reason}")]
    Dispatch {
        item: String,
        target: String,
        reason: String,
    },

    #[error("Could not parse stranded convoy list (first line: {first_line:?}): {reason}")]
    StrandedParse { first_line: String, reason: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_findings(errors: &[StagingError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConvoyError>;
