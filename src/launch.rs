// src/launch.rs

//! Launch controller: staged convoy → open, first wave dispatched.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::convoy::{self, load_convoy};
use crate::dag::{compute_waves, DependencyGraph};
use crate::errors::{ConvoyError, Result};
use crate::exec::Dispatcher;
use crate::routing::Routes;
use crate::staging::{self, input::collect, StageInput, StageOptions, StageReport, StagingError};
use crate::store::WorkStore;
use crate::types::ConvoyStatus;

/// What happened to one wave-1 item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Dispatched,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemLaunch {
    pub id: String,
    pub target: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    pub convoy_id: String,
    pub waves: usize,
    pub items: Vec<ItemLaunch>,
}

impl LaunchReport {
    pub fn dispatched(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == ItemOutcome::Dispatched)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .count()
    }
}

/// Launch a staged convoy.
///
/// The tracked set is re-read and the plan recomputed; a cycle introduced
/// since staging aborts before the convoy changes status. Per-item dispatch
/// problems are recorded and do not stop the rest of wave 1.
pub async fn launch(
    store: &dyn WorkStore,
    routes: &Routes,
    dispatcher: &dyn Dispatcher,
    convoy_id: &str,
    cancel: &CancellationToken,
) -> Result<LaunchReport> {
    let convoy = load_convoy(store, convoy_id).await?;
    if !convoy.status.is_staged() {
        return Err(ConvoyError::InvalidTransition {
            convoy: convoy.id,
            from: convoy.status,
            to: ConvoyStatus::Open,
        });
    }

    let collected = collect(store, &StageInput::Convoy(convoy.id.clone())).await?;
    let (graph, cycles) = DependencyGraph::build(&collected.descriptors);
    if !cycles.is_empty() {
        return Err(ConvoyError::StagingRejected {
            errors: cycles.into_iter().map(StagingError::Cycle).collect(),
        });
    }
    let plan = compute_waves(&graph);

    convoy::transition(store, &convoy.id, ConvoyStatus::Open).await?;

    let mut items = Vec::new();
    if let Some(first) = plan.first() {
        for id in &first.items {
            items.push(launch_item(store, routes, dispatcher, id, cancel).await);
        }
    }

    let report = LaunchReport {
        convoy_id: convoy.id,
        waves: plan.len(),
        items,
    };
    info!(
        convoy = %report.convoy_id,
        waves = report.waves,
        dispatched = report.dispatched(),
        failed = report.failed(),
        "convoy launched"
    );
    Ok(report)
}

async fn launch_item(
    store: &dyn WorkStore,
    routes: &Routes,
    dispatcher: &dyn Dispatcher,
    id: &str,
    cancel: &CancellationToken,
) -> ItemLaunch {
    let target = routes.target_for(id);
    let target_name = target.as_ref().map(|t| t.name.clone());
    let result = |outcome| ItemLaunch {
        id: id.to_string(),
        target: target_name.clone(),
        outcome,
    };

    match store.get(id).await {
        Ok(Some(item)) if item.status.is_closed() => {
            return result(ItemOutcome::Skipped {
                reason: "already closed".to_string(),
            });
        }
        Ok(_) => {}
        Err(e) => warn!(item = %id, error = %e, "could not re-read item before dispatch"),
    }

    let Some(target) = target else {
        return result(ItemOutcome::Failed {
            reason: "no resolvable target".to_string(),
        });
    };
    if target.paused {
        return result(ItemOutcome::Failed {
            reason: format!("target {} is paused", target.name),
        });
    }

    match dispatcher.dispatch(id, &target.name, cancel).await {
        Ok(()) => result(ItemOutcome::Dispatched),
        Err(e) => {
            warn!(item = %id, target = %target.name, error = %e, "wave 1 dispatch failed");
            result(ItemOutcome::Failed {
                reason: e.to_string(),
            })
        }
    }
}

/// Stage `input` and launch the resulting convoy right away.
pub async fn stage_and_launch(
    store: &dyn WorkStore,
    routes: &Routes,
    dispatcher: &dyn Dispatcher,
    input: &StageInput,
    options: &StageOptions,
    cancel: &CancellationToken,
) -> Result<(StageReport, LaunchReport)> {
    let staged = staging::stage(store, routes, input, options).await?;
    let launched = launch(store, routes, dispatcher, &staged.convoy_id, cancel).await?;
    Ok((staged, launched))
}
