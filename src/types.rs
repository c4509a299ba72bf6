// src/types.rs

//! Domain enums shared by the store, the staging pipeline and the feeders.
//!
//! All of them round-trip through the same string forms the work-item store
//! uses, so they can be parsed from CLI arguments, store records and event
//! payloads alike.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Work-item type.
///
/// Only the leaf types (`task`, `bug`, `feature`, `chore`) are ever
/// dispatched. An empty or missing type defaults to `task`. Unknown type
/// strings are kept verbatim as [`ItemType::Other`] and treated as non-leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    Task,
    Bug,
    Feature,
    Chore,
    Epic,
    SubEpic,
    Convoy,
    Decision,
    Message,
    Event,
    Other(String),
}

impl ItemType {
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Task => "task",
            ItemType::Bug => "bug",
            ItemType::Feature => "feature",
            ItemType::Chore => "chore",
            ItemType::Epic => "epic",
            ItemType::SubEpic => "sub-epic",
            ItemType::Convoy => "convoy",
            ItemType::Decision => "decision",
            ItemType::Message => "message",
            ItemType::Event => "event",
            ItemType::Other(s) => s.as_str(),
        }
    }

    /// Leaf-dispatchable types: the only ones a feeder may hand to an agent.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            ItemType::Task | ItemType::Bug | ItemType::Feature | ItemType::Chore
        )
    }

    /// Types whose `parent-child` children are walked when staging.
    pub fn is_container(&self) -> bool {
        matches!(self, ItemType::Epic | ItemType::SubEpic)
    }
}

impl Default for ItemType {
    fn default() -> Self {
        ItemType::Task
    }
}

impl From<&str> for ItemType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "task" => ItemType::Task,
            "bug" => ItemType::Bug,
            "feature" => ItemType::Feature,
            "chore" => ItemType::Chore,
            "epic" => ItemType::Epic,
            "sub-epic" | "sub_epic" | "subepic" => ItemType::SubEpic,
            "convoy" => ItemType::Convoy,
            "decision" => ItemType::Decision,
            "message" => ItemType::Message,
            "event" => ItemType::Event,
            other => ItemType::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemType {
    fn from(s: String) -> Self {
        ItemType::from(s.as_str())
    }
}

impl From<ItemType> for String {
    fn from(t: ItemType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status field of a work item.
///
/// Ordinary items move between `open`, `in_progress`, `hooked` and `closed`.
/// The two staged values only ever appear on convoys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "hooked")]
    Hooked,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "staged:ready")]
    StagedReady,
    #[serde(rename = "staged:warnings")]
    StagedWarnings,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Hooked => "hooked",
            ItemStatus::Closed => "closed",
            ItemStatus::StagedReady => "staged:ready",
            ItemStatus::StagedWarnings => "staged:warnings",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ItemStatus::Closed)
    }

    /// Work on this item has been handed to an agent and is not finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ItemStatus::InProgress | ItemStatus::Hooked)
    }
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Open
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(ItemStatus::Open),
            "in_progress" | "in-progress" => Ok(ItemStatus::InProgress),
            "hooked" => Ok(ItemStatus::Hooked),
            "closed" => Ok(ItemStatus::Closed),
            "staged:ready" => Ok(ItemStatus::StagedReady),
            "staged:warnings" => Ok(ItemStatus::StagedWarnings),
            other => Err(format!("invalid item status: {other}")),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed dependency edge kind.
///
/// An edge `(source, target, kind)` reads "source depends on target".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepType {
    Blocks,
    ConditionalBlocks,
    WaitsFor,
    Tracks,
    ParentChild,
    Related,
    DiscoveredFrom,
}

impl DepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepType::Blocks => "blocks",
            DepType::ConditionalBlocks => "conditional-blocks",
            DepType::WaitsFor => "waits-for",
            DepType::Tracks => "tracks",
            DepType::ParentChild => "parent-child",
            DepType::Related => "related",
            DepType::DiscoveredFrom => "discovered-from",
        }
    }

    /// Gates both wave assignment and runtime dispatch.
    ///
    /// `parent-child` is deliberately absent: a child task stays dispatchable
    /// while its parent epic is open.
    pub fn is_execution_relevant(&self) -> bool {
        matches!(
            self,
            DepType::Blocks | DepType::ConditionalBlocks | DepType::WaitsFor
        )
    }
}

impl FromStr for DepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "blocks" => Ok(DepType::Blocks),
            "conditional-blocks" => Ok(DepType::ConditionalBlocks),
            "waits-for" => Ok(DepType::WaitsFor),
            "tracks" => Ok(DepType::Tracks),
            "parent-child" => Ok(DepType::ParentChild),
            "related" => Ok(DepType::Related),
            "discovered-from" => Ok(DepType::DiscoveredFrom),
            other => Err(format!("invalid dependency type: {other}")),
        }
    }
}

impl fmt::Display for DepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a convoy.
///
/// ```text
/// staged:ready <-> staged:warnings
/// staged:*      -> open | closed
/// open         <-> closed
/// ```
///
/// Nothing ever moves back into a staged status once the convoy is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvoyStatus {
    #[serde(rename = "staged:ready")]
    StagedReady,
    #[serde(rename = "staged:warnings")]
    StagedWarnings,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
}

impl ConvoyStatus {
    pub fn is_staged(&self) -> bool {
        matches!(self, ConvoyStatus::StagedReady | ConvoyStatus::StagedWarnings)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ConvoyStatus::Closed)
    }

    pub fn can_transition_to(&self, next: ConvoyStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (from, to) if from.is_staged() => {
                to.is_staged() || matches!(to, ConvoyStatus::Open | ConvoyStatus::Closed)
            }
            (ConvoyStatus::Open, ConvoyStatus::Closed) => true,
            (ConvoyStatus::Closed, ConvoyStatus::Open) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        ItemStatus::from(*self).as_str()
    }
}

impl From<ConvoyStatus> for ItemStatus {
    fn from(s: ConvoyStatus) -> Self {
        match s {
            ConvoyStatus::StagedReady => ItemStatus::StagedReady,
            ConvoyStatus::StagedWarnings => ItemStatus::StagedWarnings,
            ConvoyStatus::Open => ItemStatus::Open,
            ConvoyStatus::Closed => ItemStatus::Closed,
        }
    }
}

impl TryFrom<ItemStatus> for ConvoyStatus {
    type Error = String;

    fn try_from(s: ItemStatus) -> Result<Self, Self::Error> {
        match s {
            ItemStatus::StagedReady => Ok(ConvoyStatus::StagedReady),
            ItemStatus::StagedWarnings => Ok(ConvoyStatus::StagedWarnings),
            ItemStatus::Open => Ok(ConvoyStatus::Open),
            ItemStatus::Closed => Ok(ConvoyStatus::Closed),
            other => Err(format!("status '{other}' is not a convoy status")),
        }
    }
}

impl fmt::Display for ConvoyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
