mod common;

use std::sync::Arc;

use kameo::actor::{ActorRef, Spawn};

use nicflash_api::{Condition, ConditionStatus, FirmwareNode, FlashReason, HssiSpec};
use nicflash_core::{
    GetLastOutcome, NodeReconcilerActor, NodeReconcilerArgs, Reconcile, ReconcileOutcome,
};
use nicflash_maintenance::memory::{InMemoryLeaseStore, InMemoryNodeApi};
use nicflash_maintenance::{CancelHandle, CancelSignal, Coordinator, ElectionConfig};

use common::*;

const NS: &str = "nicflash";
const NODE: &str = "worker-1";

struct Harness {
    actor: ActorRef<NodeReconcilerActor>,
    runner: Arc<ScriptedRunner>,
    nodes: Arc<InMemoryNodeApi>,
    sink: Arc<RecordingSink>,
    _dir: tempfile::TempDir,
}

fn harness(runner: ScriptedRunner) -> Harness {
    harness_with_shutdown(runner, CancelSignal::never())
}

fn harness_with_shutdown(runner: ScriptedRunner, shutdown: CancelSignal) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(runner);
    let artifacts = Arc::new(FixedArtifacts::new(PACKAGE));
    let nodes = Arc::new(InMemoryNodeApi::new());
    let sink = Arc::new(RecordingSink::default());

    let coordinator = Coordinator::new(
        Arc::new(InMemoryLeaseStore::new()),
        nodes.clone(),
        ElectionConfig::new(NS, NODE),
        NODE,
    )
    .with_shutdown(shutdown);

    let actor = NodeReconcilerActor::spawn(NodeReconcilerArgs {
        node_name: NODE.to_string(),
        namespace: NS.to_string(),
        engine: Arc::new(engine(&runner, &artifacts, dir.path())),
        coordinator: Arc::new(coordinator),
        inventory: Arc::new(StaticInventory),
        status: sink.clone(),
    });

    Harness {
        actor,
        runner,
        nodes,
        sink,
        _dir: dir,
    }
}

fn requested(macs: &[&str]) -> FirmwareNode {
    let mut node = FirmwareNode::for_node(NODE, NS);
    node.metadata.generation = Some(1);
    node.metadata.resource_version = Some("7".to_string());
    node.spec.hssi = Some(HssiSpec {
        firmware_url: "http://files.local/nvmupdate.tar.gz".to_string(),
        checksum: PACKAGE_MD5.to_string(),
        macs: macs.iter().map(|m| m.to_string()).collect(),
    });
    node
}

fn completed(outcome: ReconcileOutcome) -> Condition {
    match outcome {
        ReconcileOutcome::Completed(condition) => condition,
        other => panic!("expected a written condition, got {other:?}"),
    }
}

#[tokio::test]
async fn test_flash_succeeds_inside_window() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));

    let outcome = h
        .actor
        .ask(Reconcile {
            node: requested(&[MAC_A]),
        })
        .await
        .unwrap();

    let condition = completed(outcome);
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, FlashReason::Succeeded);
    assert_eq!(condition.message, "Flashed successfully");
    assert_eq!(condition.observed_generation, 1);

    assert_eq!(h.nodes.count_set_unschedulable(true), 1);
    assert_eq!(h.nodes.count_set_unschedulable(false), 1);
    assert!(!h.nodes.is_unschedulable(NODE));
    assert_eq!(h.runner.commands("rsu").len(), 1);

    let published = h.sink.published();
    assert_eq!(published.len(), 1);
    let status = published[0].status.as_ref().unwrap();
    assert_eq!(status.inventory.len(), 1);
    assert_eq!(status.inventory[0].nics.len(), 2);
    assert_eq!(
        published[0].flash_condition().map(|c| c.reason),
        Some(FlashReason::Succeeded)
    );
}

#[tokio::test]
async fn test_drain_skip_leaves_node_schedulable() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    let mut node = requested(&[MAC_A]);
    node.spec.drain_skip = true;

    let condition = completed(h.actor.ask(Reconcile { node }).await.unwrap());

    assert_eq!(condition.reason, FlashReason::Succeeded);
    assert!(h.nodes.calls().is_empty());
}

#[tokio::test]
async fn test_empty_url_fails_without_window() {
    let h = harness(ScriptedRunner::new(vec![]));
    let mut node = requested(&[MAC_A]);
    if let Some(hssi) = node.spec.hssi.as_mut() {
        hssi.firmware_url.clear();
    }

    let condition = completed(h.actor.ask(Reconcile { node }).await.unwrap());

    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, FlashReason::Failed);
    assert_eq!(condition.message, "empty firmware URL");
    assert!(h.nodes.calls().is_empty());
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_nothing_requested() {
    let h = harness(ScriptedRunner::new(vec![]));
    let mut node = FirmwareNode::for_node(NODE, NS);
    node.metadata.generation = Some(3);

    let condition = completed(h.actor.ask(Reconcile { node }).await.unwrap());

    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, FlashReason::NotRequested);
    assert_eq!(condition.observed_generation, 3);
    assert_eq!(
        h.sink.published()[0].status.as_ref().map(|s| s.inventory.len()),
        Some(1)
    );
}

#[tokio::test]
async fn test_empty_mac_list_fails() {
    let h = harness(ScriptedRunner::new(vec![]));

    let condition = completed(
        h.actor
            .ask(Reconcile {
                node: requested(&[]),
            })
            .await
            .unwrap(),
    );

    assert_eq!(condition.reason, FlashReason::Failed);
    assert_eq!(condition.message, "no MAC addresses requested");
}

#[tokio::test]
async fn test_ignores_other_nodes() {
    let h = harness(ScriptedRunner::new(vec![]));

    let other_name = FirmwareNode::for_node("worker-2", NS);
    let other_ns = FirmwareNode::for_node(NODE, "default");

    assert_eq!(
        h.actor.ask(Reconcile { node: other_name }).await.unwrap(),
        ReconcileOutcome::NotForThisNode
    );
    assert_eq!(
        h.actor.ask(Reconcile { node: other_ns }).await.unwrap(),
        ReconcileOutcome::NotForThisNode
    );
    assert!(h.sink.published().is_empty());
}

#[tokio::test]
async fn test_same_generation_is_up_to_date() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    let mut node = requested(&[MAC_A]);
    node.status_mut().conditions.push(Condition::flashed(
        ConditionStatus::True,
        FlashReason::Succeeded,
        "Flashed successfully",
        1,
    ));

    let outcome = h.actor.ask(Reconcile { node }).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_new_generation_reports_progress_first() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    let mut node = requested(&[MAC_A]);
    node.metadata.generation = Some(2);
    node.status_mut().conditions.push(Condition::flashed(
        ConditionStatus::True,
        FlashReason::Succeeded,
        "Flashed successfully",
        1,
    ));

    h.actor.ask(Reconcile { node }).await.unwrap();

    let published = h.sink.published();
    assert_eq!(published.len(), 2);
    let first = published[0].flash_condition().unwrap();
    assert_eq!(first.reason, FlashReason::InProgress);
    assert_eq!(first.message, "Flash started");
    assert_eq!(first.observed_generation, 2);
    assert_eq!(
        published[1].flash_condition().map(|c| c.reason),
        Some(FlashReason::Succeeded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_drain_failure_reports_unknown() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    h.nodes.set_fail_list_pods(true);

    let condition = completed(
        h.actor
            .ask(Reconcile {
                node: requested(&[MAC_A]),
            })
            .await
            .unwrap(),
    );

    assert_eq!(condition.status, ConditionStatus::Unknown);
    assert_eq!(condition.reason, FlashReason::Unknown);
    assert!(condition.message.contains("drain"), "{}", condition.message);
    // flash never ran, node was still uncordoned
    assert!(h.runner.commands("./nvmupdate64e").is_empty());
    assert!(!h.nodes.is_unschedulable(NODE));
}

#[tokio::test]
async fn test_pass_budget_is_noted() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 1)]));

    let condition = completed(
        h.actor
            .ask(Reconcile {
                node: requested(&[MAC_A]),
            })
            .await
            .unwrap(),
    );

    assert_eq!(condition.reason, FlashReason::Succeeded);
    assert_eq!(
        condition.message,
        "Flashed successfully (maximum update passes reached, further updates may be available)"
    );
}

#[tokio::test]
async fn test_module_failure_reports_failed() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Fail", 0)]));

    let condition = completed(
        h.actor
            .ask(Reconcile {
                node: requested(&[MAC_A]),
            })
            .await
            .unwrap(),
    );

    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, FlashReason::Failed);
    assert!(condition.message.starts_with("Invalid update result: Fail"));
    assert!(h.runner.commands("rsu").is_empty());
    assert!(!h.nodes.is_unschedulable(NODE));
}

#[tokio::test]
async fn test_last_outcome_is_kept() {
    let h = harness(ScriptedRunner::new(vec![]));

    assert_eq!(h.actor.ask(GetLastOutcome).await.unwrap(), None);

    let mut node = FirmwareNode::for_node(NODE, NS);
    node.metadata.generation = Some(1);
    let outcome = h.actor.ask(Reconcile { node }).await.unwrap();

    assert_eq!(h.actor.ask(GetLastOutcome).await.unwrap(), Some(outcome));
}

#[tokio::test]
async fn test_reflash_persists_final_condition() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    let mut node = requested(&[MAC_A]);
    node.metadata.generation = Some(2);
    node.status_mut().conditions.push(Condition::flashed(
        ConditionStatus::True,
        FlashReason::Succeeded,
        "Flashed successfully",
        1,
    ));

    let condition = completed(h.actor.ask(Reconcile { node }).await.unwrap());
    assert_eq!(condition.reason, FlashReason::Succeeded);

    // the final write went through on top of the InProgress one
    let stored = h.sink.stored().unwrap();
    let flashed = stored.flash_condition().unwrap();
    assert_eq!(flashed.status, ConditionStatus::True);
    assert_eq!(flashed.reason, FlashReason::Succeeded);
    assert_eq!(flashed.observed_generation, 2);
    assert_eq!(h.sink.published().len(), 2);
}

#[tokio::test]
async fn test_interrupted_progress_is_retried() {
    let h = harness(ScriptedRunner::new(vec![report_xml("Success", 0)]));
    let mut node = requested(&[MAC_A]);
    node.status_mut().conditions.push(Condition::flashed(
        ConditionStatus::False,
        FlashReason::InProgress,
        "Flash started",
        1,
    ));

    let condition = completed(h.actor.ask(Reconcile { node }).await.unwrap());

    assert_eq!(condition.reason, FlashReason::Succeeded);
    assert_eq!(h.runner.commands("rsu").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_window_writes_no_condition() {
    let shutdown = CancelHandle::new();
    shutdown.cancel();
    let h = harness_with_shutdown(
        ScriptedRunner::new(vec![report_xml("Success", 0)]),
        shutdown.signal(),
    );

    let outcome = h
        .actor
        .ask(Reconcile {
            node: requested(&[MAC_A]),
        })
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Interrupted);
    assert!(h.sink.published().is_empty());
    assert!(h.nodes.calls().is_empty());
    assert!(h.runner.commands("./nvmupdate64e").is_empty());
}
