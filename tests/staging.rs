// tests/staging.rs

use std::error::Error;
use std::sync::Arc;

use convoy::convoy::load_convoy;
use convoy::errors::ConvoyError;
use convoy::staging::{stage, StageInput, StageOptions, StagingError, StagingWarning};
use convoy::store::{ItemFilter, MemoryStore, StoreSet, WorkStore};
use convoy::types::{ConvoyStatus, ItemType};
use convoy_test_utils::{init_tracing, routes, store_set, StoreBuilder};

type TestResult = Result<(), Box<dyn Error>>;

/// `hq` holds convoys; `gt-` items go to gastown, `bd-` items to beads.
fn fleet(gt: StoreBuilder, bd: StoreBuilder, paused: &[&str]) -> (StoreSet, Arc<MemoryStore>) {
    let hq = StoreBuilder::new("hq-").build_arc();
    let gt = gt.build_arc();
    let bd = bd.build_arc();
    let routes = routes(
        "hq",
        &[("gt-", "gt", Some("gastown")), ("bd-", "bd", Some("beads"))],
        paused,
    );
    (store_set(&[("hq", &hq), ("gt", &gt), ("bd", &bd)], routes), hq)
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

async fn convoy_count(store: &dyn WorkStore) -> usize {
    store
        .list(ItemFilter::convoys(true))
        .await
        .map(|c| c.len())
        .unwrap_or_default()
}

#[tokio::test]
async fn epic_chain_stages_one_item_per_wave() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .integrated_epic("gt-epic", "Auth rewrite", "gt-merge")
        .task("gt-a")
        .task("gt-b")
        .task("gt-c")
        .child_of("gt-a", "gt-epic")
        .child_of("gt-b", "gt-epic")
        .child_of("gt-c", "gt-epic")
        .blocked_by("gt-b", "gt-a")
        .blocked_by("gt-c", "gt-b");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);

    let input = StageInput::resolve(&set, &ids(&["gt-epic"])).await?;
    assert_eq!(input, StageInput::Container("gt-epic".to_string()));

    let report = stage(&set, set.routes(), &input, &StageOptions::default()).await?;

    assert_eq!(report.status, ConvoyStatus::StagedReady);
    assert_eq!(report.title, "Auth rewrite");
    assert!(!report.restaged);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let waves: Vec<Vec<&str>> = report
        .waves
        .iter()
        .map(|w| w.items.iter().map(|i| i.id.as_str()).collect())
        .collect();
    assert_eq!(waves, vec![vec!["gt-a"], vec!["gt-b"], vec!["gt-c"]]);
    assert!(report.waves[0].items[0].target.as_deref() == Some("gastown"));

    let convoy = load_convoy(&set, &report.convoy_id).await?;
    assert!(convoy.id.starts_with("hq-cv-"));
    assert_eq!(convoy.status, ConvoyStatus::StagedReady);
    assert_eq!(convoy.tracked, ids(&["gt-a", "gt-b", "gt-c"]));

    Ok(())
}

#[tokio::test]
async fn nested_containers_contribute_only_leaves() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .integrated_epic("gt-epic", "Platform", "gt-merge")
        .item("gt-sub", ItemType::SubEpic, "Storage")
        .task("gt-a")
        .item("gt-d", ItemType::Decision, "pick a db")
        .task("gt-b")
        .child_of("gt-sub", "gt-epic")
        .child_of("gt-a", "gt-epic")
        .child_of("gt-d", "gt-sub")
        .child_of("gt-b", "gt-sub")
        .blocked_by("gt-b", "gt-a");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);

    let input = StageInput::Container("gt-epic".to_string());
    let report = stage(&set, set.routes(), &input, &StageOptions::default()).await?;

    let convoy = load_convoy(&set, &report.convoy_id).await?;
    assert_eq!(convoy.tracked, ids(&["gt-a", "gt-b"]));
    // gt-sub has children but no integration point.
    assert_eq!(report.status, ConvoyStatus::StagedWarnings);
    assert!(report.warnings.contains(&StagingWarning::MissingIntegrationPoint {
        container: "gt-sub".to_string(),
        children: 2,
    }));
    Ok(())
}

#[tokio::test]
async fn explicit_items_across_targets_stage_with_warnings() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .task("gt-a")
        .task("gt-b")
        .blocked_by("gt-b", "gt-a");
    let bd = StoreBuilder::new("bd-").task("bd-x");
    let (set, _hq) = fleet(gt, bd, &[]);

    let input = StageInput::resolve(&set, &ids(&["gt-b", "bd-x", "gt-a"])).await?;
    let report = stage(&set, set.routes(), &input, &StageOptions::default()).await?;

    assert_eq!(report.status, ConvoyStatus::StagedWarnings);
    assert_eq!(
        report.warnings,
        vec![StagingWarning::CrossTarget {
            item: "bd-x".to_string(),
            target: "beads".to_string(),
            majority: "gastown".to_string(),
        }]
    );
    assert_eq!(report.title, "Batch: bd-x, gt-a, gt-b");
    assert_eq!(report.waves.len(), 2);
    assert_eq!(report.waves[0].items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn cycle_is_rejected_without_writing_anything() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .task("gt-a")
        .task("gt-b")
        .task("gt-c")
        .blocked_by("gt-a", "gt-b")
        .blocked_by("gt-b", "gt-a");
    let (set, hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);
    let before = hq.last_ordinal();

    let input = StageInput::resolve(&set, &ids(&["gt-a", "gt-b", "gt-c"])).await?;
    let err = stage(&set, set.routes(), &input, &StageOptions::default())
        .await
        .expect_err("cycle must reject");

    match err {
        ConvoyError::StagingRejected { errors } => {
            assert_eq!(errors.len(), 1);
            let StagingError::Cycle(cycle) = &errors[0] else {
                panic!("expected a cycle, got {:?}", errors[0]);
            };
            let mut members = cycle.path.clone();
            members.sort();
            assert_eq!(members, ids(&["gt-a", "gt-b"]));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(convoy_count(&set).await, 0);
    assert_eq!(hq.last_ordinal(), before);
    Ok(())
}

#[tokio::test]
async fn unroutable_item_is_fatal() -> TestResult {
    init_tracing();
    let hq = StoreBuilder::new("hq-").task("hq-7").build_arc();
    let gt = StoreBuilder::new("gt-").task("gt-a").build_arc();
    let set = store_set(
        &[("hq", &hq), ("gt", &gt)],
        routes("hq", &[("gt-", "gt", Some("gastown"))], &[]),
    );

    let input = StageInput::resolve(&set, &ids(&["gt-a", "hq-7"])).await?;
    let err = stage(&set, set.routes(), &input, &StageOptions::default())
        .await
        .expect_err("unroutable item must reject");

    let ConvoyError::StagingRejected { errors } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        errors,
        vec![StagingError::UnresolvableTarget {
            item: "hq-7".to_string()
        }]
    );
    Ok(())
}

#[tokio::test]
async fn item_in_active_convoy_is_rejected() -> TestResult {
    init_tracing();
    let hq = StoreBuilder::new("hq-")
        .convoy("hq-cv-9", ConvoyStatus::Open, &["gt-a"])
        .build_arc();
    let gt = StoreBuilder::new("gt-").task("gt-a").task("gt-b").build_arc();
    let set = store_set(
        &[("hq", &hq), ("gt", &gt)],
        routes("hq", &[("gt-", "gt", Some("gastown"))], &[]),
    );

    let input = StageInput::Items(ids(&["gt-a", "gt-b"]));
    let err = stage(&set, set.routes(), &input, &StageOptions::default())
        .await
        .expect_err("already tracked");

    let ConvoyError::StagingRejected { errors } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        errors,
        vec![StagingError::AlreadyTracked {
            item: "gt-a".to_string(),
            convoy: "hq-cv-9".to_string(),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn closed_convoy_does_not_claim_its_items() -> TestResult {
    init_tracing();
    let hq = StoreBuilder::new("hq-")
        .convoy("hq-cv-9", ConvoyStatus::Closed, &["gt-a"])
        .build_arc();
    let gt = StoreBuilder::new("gt-").task("gt-a").build_arc();
    let set = store_set(
        &[("hq", &hq), ("gt", &gt)],
        routes("hq", &[("gt-", "gt", Some("gastown"))], &[]),
    );

    let report = stage(
        &set,
        set.routes(),
        &StageInput::Items(ids(&["gt-a"])),
        &StageOptions::default(),
    )
    .await?;
    assert_eq!(report.status, ConvoyStatus::StagedReady);
    Ok(())
}

#[tokio::test]
async fn restaging_updates_the_same_convoy() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-").task("gt-a").task("gt-b");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);

    let first = stage(
        &set,
        set.routes(),
        &StageInput::Items(ids(&["gt-a", "gt-b"])),
        &StageOptions::default(),
    )
    .await?;
    assert_eq!(first.waves.len(), 1);

    // A new dependency appears between the two runs.
    let gt = set.named("gt")?;
    gt.add_dependency(convoy::store::DepEdge::new(
        "gt-b",
        "gt-a",
        convoy::types::DepType::Blocks,
    ))
    .await?;

    let input = StageInput::resolve(&set, &ids(&[first.convoy_id.as_str()])).await?;
    assert_eq!(input, StageInput::Convoy(first.convoy_id.clone()));

    let second = stage(&set, set.routes(), &input, &StageOptions::default()).await?;
    assert!(second.restaged);
    assert_eq!(second.convoy_id, first.convoy_id);
    assert_eq!(second.waves.len(), 2);
    assert_eq!(convoy_count(&set).await, 1);
    Ok(())
}

#[tokio::test]
async fn live_convoy_cannot_be_restaged() -> TestResult {
    init_tracing();
    let hq = StoreBuilder::new("hq-")
        .convoy("hq-cv-1", ConvoyStatus::Open, &["gt-a"])
        .build_arc();
    let gt = StoreBuilder::new("gt-").task("gt-a").build_arc();
    let set = store_set(
        &[("hq", &hq), ("gt", &gt)],
        routes("hq", &[("gt-", "gt", Some("gastown"))], &[]),
    );

    let err = stage(
        &set,
        set.routes(),
        &StageInput::Convoy("hq-cv-1".to_string()),
        &StageOptions::default(),
    )
    .await
    .expect_err("open convoy");
    assert!(matches!(
        err,
        ConvoyError::InvalidTransition {
            from: ConvoyStatus::Open,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn paused_target_and_oversized_wave_are_warnings() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-").task("gt-a").task("gt-b").task("gt-c");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &["gastown"]);

    let options = StageOptions {
        max_wave_size: 2,
        title: Some("Sprint".to_string()),
    };
    let report = stage(
        &set,
        set.routes(),
        &StageInput::Items(ids(&["gt-a", "gt-b", "gt-c"])),
        &options,
    )
    .await?;

    assert_eq!(report.status, ConvoyStatus::StagedWarnings);
    assert_eq!(report.title, "Sprint");
    assert!(report.warnings.contains(&StagingWarning::PausedTarget {
        item: "gt-a".to_string(),
        target: "gastown".to_string(),
    }));
    assert!(report.warnings.contains(&StagingWarning::OversizedWave {
        wave: 1,
        size: 3,
        limit: 2,
    }));
    Ok(())
}

#[tokio::test]
async fn paused_blocker_target_still_stages_in_order() -> TestResult {
    init_tracing();
    // gt-x waits on bd-y; only beads is paused.
    let gt = StoreBuilder::new("gt-").task("gt-x").blocked_by("gt-x", "bd-y");
    let bd = StoreBuilder::new("bd-").task("bd-y");
    let (set, _hq) = fleet(gt, bd, &["beads"]);

    let report = stage(
        &set,
        set.routes(),
        &StageInput::Items(ids(&["gt-x", "bd-y"])),
        &StageOptions::default(),
    )
    .await?;

    assert_eq!(report.status, ConvoyStatus::StagedWarnings);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.warnings.contains(&StagingWarning::PausedTarget {
        item: "bd-y".to_string(),
        target: "beads".to_string(),
    }));
    assert!(!report.warnings.iter().any(|w| matches!(
        w,
        StagingWarning::PausedTarget { item, .. } if item == "gt-x"
    )));

    let waves: Vec<Vec<&str>> = report
        .waves
        .iter()
        .map(|w| w.items.iter().map(|i| i.id.as_str()).collect())
        .collect();
    assert_eq!(waves, vec![vec!["bd-y"], vec!["gt-x"]]);
    Ok(())
}

#[tokio::test]
async fn isolated_items_are_flagged_for_containers() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .integrated_epic("gt-epic", "Epic", "gt-merge")
        .task("gt-a")
        .task("gt-b")
        .task("gt-lonely")
        .child_of("gt-a", "gt-epic")
        .child_of("gt-b", "gt-epic")
        .child_of("gt-lonely", "gt-epic")
        .blocked_by("gt-b", "gt-a");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);

    let report = stage(
        &set,
        set.routes(),
        &StageInput::Container("gt-epic".to_string()),
        &StageOptions::default(),
    )
    .await?;
    assert_eq!(
        report.warnings,
        vec![StagingWarning::Isolated {
            item: "gt-lonely".to_string()
        }]
    );
    Ok(())
}

#[tokio::test]
async fn resolve_rejects_mixed_roots() -> TestResult {
    init_tracing();
    let gt = StoreBuilder::new("gt-")
        .epic("gt-epic", "Epic")
        .task("gt-a")
        .item("gt-d", ItemType::Decision, "decide");
    let (set, _hq) = fleet(gt, StoreBuilder::new("bd-"), &[]);

    for args in [
        vec!["gt-epic", "gt-a"],
        vec!["gt-d"],
        vec!["gt-missing"],
        vec![],
    ] {
        let err = StageInput::resolve(&set, &ids(&args)).await;
        assert!(err.is_err(), "{args:?} should not resolve");
    }
    Ok(())
}
