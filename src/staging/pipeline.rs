// src/staging/pipeline.rs

//! Staging: input → graph → findings → status → persisted staged convoy.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::convoy::{self, ops::batch_title};
use crate::dag::{compute_waves, DependencyGraph, WavePlan};
use crate::errors::{ConvoyError, Result};
use crate::routing::Routes;
use crate::staging::input::{collect, Collected, StageInput};
use crate::staging::{StagingError, StagingWarning};
use crate::store::{NewItem, WorkStore};
use crate::types::{ConvoyStatus, ItemType};

/// Knobs for one staging run.
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Waves larger than this produce a warning. `0` disables the check.
    pub max_wave_size: usize,
    /// Overrides the default convoy title.
    pub title: Option<String>,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            max_wave_size: 10,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedItem {
    pub id: String,
    pub title: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedWave {
    pub number: usize,
    pub items: Vec<StagedItem>,
}

/// Result of a successful staging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub convoy_id: String,
    pub title: String,
    pub status: ConvoyStatus,
    /// True when an existing staged convoy was updated in place.
    pub restaged: bool,
    pub waves: Vec<StagedWave>,
    pub errors: Vec<StagingError>,
    pub warnings: Vec<StagingWarning>,
}

/// Graph, plan and findings for a collected batch. Nothing is written.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: DependencyGraph,
    pub plan: WavePlan,
    pub errors: Vec<StagingError>,
    pub warnings: Vec<StagingWarning>,
}

impl Analysis {
    pub fn status(&self) -> Option<ConvoyStatus> {
        if !self.errors.is_empty() {
            None
        } else if self.warnings.is_empty() {
            Some(ConvoyStatus::StagedReady)
        } else {
            Some(ConvoyStatus::StagedWarnings)
        }
    }
}

/// Run the pipeline and persist the staged convoy.
///
/// Fatal findings return [`ConvoyError::StagingRejected`] before anything is
/// written. Re-staging updates the existing convoy's status in place.
pub async fn stage(
    store: &dyn WorkStore,
    routes: &Routes,
    input: &StageInput,
    options: &StageOptions,
) -> Result<StageReport> {
    let collected = collect(store, input).await?;

    if let Some(existing) = &collected.convoy {
        if !existing.status.is_staged() {
            return Err(ConvoyError::InvalidTransition {
                convoy: existing.id.clone(),
                from: existing.status,
                to: ConvoyStatus::StagedReady,
            });
        }
    }

    let analysis = analyze(store, routes, input, &collected, options).await?;
    let Some(status) = analysis.status() else {
        warn!(errors = analysis.errors.len(), "staging rejected");
        return Err(ConvoyError::StagingRejected {
            errors: analysis.errors,
        });
    };

    let tracked: Vec<String> = analysis.graph.items().map(str::to_string).collect();
    if tracked.is_empty() {
        return Err(ConvoyError::InvalidInput(
            "batch contains no dispatchable work items".to_string(),
        ));
    }

    let (convoy_id, title, restaged) = match &collected.convoy {
        Some(existing) => {
            convoy::transition(store, &existing.id, status).await?;
            (existing.id.clone(), existing.title.clone(), true)
        }
        None => {
            let title = options
                .title
                .clone()
                .or_else(|| collected.root_title.clone())
                .unwrap_or_else(|| batch_title(&tracked));
            let created = store
                .create(NewItem::new(ItemType::Convoy, title.as_str()).with_status(status.into()))
                .await?;
            convoy::track(store, &created.id, &tracked).await?;
            (created.id, title, false)
        }
    };

    info!(
        convoy = %convoy_id,
        %status,
        items = tracked.len(),
        waves = analysis.plan.len(),
        warnings = analysis.warnings.len(),
        restaged,
        "convoy staged"
    );

    Ok(StageReport {
        convoy_id,
        title,
        status,
        restaged,
        waves: staged_waves(&analysis, routes),
        errors: analysis.errors,
        warnings: analysis.warnings,
    })
}

/// Build the graph and classify findings.
pub async fn analyze(
    store: &dyn WorkStore,
    routes: &Routes,
    input: &StageInput,
    collected: &Collected,
    options: &StageOptions,
) -> Result<Analysis> {
    let (graph, cycles) = DependencyGraph::build(&collected.descriptors);
    let mut errors: Vec<StagingError> = cycles.into_iter().map(StagingError::Cycle).collect();
    let mut warnings = Vec::new();

    // Target resolution.
    let mut targets: BTreeMap<&str, String> = BTreeMap::new();
    for id in graph.items() {
        match routes.target_for(id) {
            None => errors.push(StagingError::UnresolvableTarget {
                item: id.to_string(),
            }),
            Some(target) => {
                if target.paused {
                    warnings.push(StagingWarning::PausedTarget {
                        item: id.to_string(),
                        target: target.name.clone(),
                    });
                }
                targets.insert(id, target.name);
            }
        }
    }

    // Membership.
    let except = collected.convoy.as_ref().map(|c| c.id.as_str());
    let items: Vec<String> = graph.items().map(str::to_string).collect();
    if let Err(e) = convoy::ensure_untracked(store, &items, except).await {
        match e {
            ConvoyError::AlreadyTracked { item, convoy } => {
                errors.push(StagingError::AlreadyTracked { item, convoy })
            }
            other => return Err(other),
        }
    }

    if !errors.is_empty() {
        return Ok(Analysis {
            graph,
            plan: WavePlan::default(),
            errors,
            warnings,
        });
    }

    if matches!(input, StageInput::Container(_)) && graph.len() > 1 {
        for id in graph.items() {
            if graph.dependencies_of(id).is_empty() && graph.dependents_of(id).is_empty() {
                warnings.push(StagingWarning::Isolated {
                    item: id.to_string(),
                });
            }
        }
    }

    if let Some(majority) = majority_target(&targets) {
        for (id, target) in &targets {
            if *target != majority {
                warnings.push(StagingWarning::CrossTarget {
                    item: id.to_string(),
                    target: target.clone(),
                    majority: majority.clone(),
                });
            }
        }
    }

    let plan = compute_waves(&graph);
    if options.max_wave_size > 0 {
        for wave in plan.waves() {
            if wave.items.len() > options.max_wave_size {
                warnings.push(StagingWarning::OversizedWave {
                    wave: wave.number,
                    size: wave.items.len(),
                    limit: options.max_wave_size,
                });
            }
        }
    }

    for container in &collected.containers {
        if container.children > 0 && !container.has_integration_point {
            warnings.push(StagingWarning::MissingIntegrationPoint {
                container: container.id.clone(),
                children: container.children,
            });
        }
    }

    Ok(Analysis {
        graph,
        plan,
        errors,
        warnings,
    })
}

/// Most common target; ties go to the alphabetically first one.
fn majority_target(targets: &BTreeMap<&str, String>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in targets.values() {
        *counts.entry(t.as_str()).or_default() += 1;
    }
    if counts.len() < 2 {
        return None;
    }
    let mut best: Option<(&str, usize)> = None;
    for (name, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string())
}

fn staged_waves(analysis: &Analysis, routes: &Routes) -> Vec<StagedWave> {
    analysis
        .plan
        .waves()
        .iter()
        .map(|w| StagedWave {
            number: w.number,
            items: w
                .items
                .iter()
                .map(|id| StagedItem {
                    id: id.clone(),
                    title: analysis.graph.title_of(id).unwrap_or_default().to_string(),
                    target: routes.target_for(id).map(|t| t.name),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_prefers_count_then_name() {
        let mut t = BTreeMap::new();
        t.insert("a", "zeta".to_string());
        t.insert("b", "alpha".to_string());
        assert_eq!(majority_target(&t).as_deref(), Some("alpha"));

        t.insert("c", "zeta".to_string());
        assert_eq!(majority_target(&t).as_deref(), Some("zeta"));
    }

    #[test]
    fn single_target_has_no_majority_split() {
        let mut t = BTreeMap::new();
        t.insert("a", "gastown".to_string());
        t.insert("b", "gastown".to_string());
        assert_eq!(majority_target(&t), None);
    }
}
