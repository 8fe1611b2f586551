//! `NodeReconcilerActor`: Per-node firmware reconciliation
//!
//! Handles one `Reconcile` at a time. A flash runs inside the maintenance
//! window; its outcome is written back as the `Flashed` condition together
//! with a fresh inventory. Each status write starts from the object stored by
//! the previous one.

use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use nicflash_api::{
    Condition, ConditionStatus, FirmwareNode, FlashReason, ResourceExt, set_condition,
};
use nicflash_inventory::InventoryProvider;
use nicflash_maintenance::{CancelSignal, Coordinator, MaintenanceError};

use crate::engine::{ApplyOutcome, Convergence, FirmwareEngine, UpdateTarget};
use crate::error::CoreError;
use crate::message::{GetLastOutcome, Reconcile, ReconcileOutcome};
use crate::status::{StatusSink, inventory_status};

const FLASH_STARTED: &str = "Flash started";
const FLASH_SUCCEEDED: &str = "Flashed successfully";
const NOTHING_REQUESTED: &str = "Inventory up to date";

/// Arguments for spawning a `NodeReconcilerActor`
pub struct NodeReconcilerArgs {
    /// Node this daemon runs on
    pub node_name: String,
    /// Namespace holding the node's resource
    pub namespace: String,
    /// Update engine
    pub engine: Arc<FirmwareEngine>,
    /// Maintenance window coordinator
    pub coordinator: Arc<Coordinator>,
    /// Inventory reported in status
    pub inventory: Arc<dyn InventoryProvider>,
    /// Where status is written
    pub status: Arc<dyn StatusSink>,
}

/// Per-node actor reconciling `FirmwareNode` resources
pub struct NodeReconcilerActor {
    node_name: String,
    namespace: String,
    engine: Arc<FirmwareEngine>,
    coordinator: Arc<Coordinator>,
    inventory: Arc<dyn InventoryProvider>,
    status: Arc<dyn StatusSink>,
    last_outcome: Option<ReconcileOutcome>,
}

impl NodeReconcilerActor {
    /// Write the `Flashed` condition and current inventory
    ///
    /// On success `node` is replaced by the stored object.
    async fn publish(
        &self,
        node: &mut FirmwareNode,
        status: ConditionStatus,
        reason: FlashReason,
        message: impl Into<String>,
    ) -> Result<Condition, CoreError> {
        let condition = Condition::flashed(status, reason, message, node.generation());

        let mut next = node.clone();
        set_condition(&mut next.status_mut().conditions, condition.clone());
        match self.inventory.cards().await {
            Ok(cards) => next.status_mut().inventory = inventory_status(&cards),
            Err(e) => warn!(error = %e, "failed to refresh inventory, keeping previous"),
        }

        *node = self.status.publish_status(&next).await?;
        info!(
            status = ?condition.status,
            reason = ?condition.reason,
            message = %condition.message,
            "flash condition updated"
        );
        Ok(condition)
    }

    /// Like [`publish`](Self::publish) but a failed write is only logged
    async fn report(
        &self,
        node: &mut FirmwareNode,
        status: ConditionStatus,
        reason: FlashReason,
        message: impl Into<String>,
    ) -> ReconcileOutcome {
        let message = message.into();
        match self.publish(node, status, reason, message.clone()).await {
            Ok(condition) => ReconcileOutcome::Completed(condition),
            Err(e) => {
                error!(error = %e, "failed to update flash condition");
                ReconcileOutcome::Completed(Condition::flashed(
                    status,
                    reason,
                    message,
                    node.generation(),
                ))
            }
        }
    }

    fn is_for_this_node(&self, node: &FirmwareNode) -> bool {
        let namespace = node.namespace().unwrap_or_default();
        if namespace != self.namespace {
            debug!(namespace = %namespace, "unexpected namespace - ignoring");
            return false;
        }
        let name = node.name_any();
        if name != self.node_name {
            debug!(name = %name, "resource intended for another node - ignoring");
            return false;
        }
        true
    }

    /// Run the flash inside the maintenance window
    async fn flash(&self, node: &mut FirmwareNode, target: UpdateTarget) -> ReconcileOutcome {
        let (tx, rx) = oneshot::channel::<Result<ApplyOutcome, CoreError>>();
        let engine = Arc::clone(&self.engine);

        let work = move |cancel: CancelSignal| async move {
            let result = if cancel.is_cancelled() {
                Err(CoreError::LeadershipLost)
            } else {
                engine.flash(&target).await.map_err(CoreError::from)
            };
            if let Err(e) = &result {
                error!(error = %e, "unable to flash");
            }
            let finished = result.is_ok();
            let _ = tx.send(result);
            finished
        };

        match self.coordinator.run(work, !node.spec.drain_skip).await {
            Ok(()) => {}
            Err(MaintenanceError::Shutdown) => {
                info!("shutting down before the maintenance window opened");
                return ReconcileOutcome::Interrupted;
            }
            Err(e) => {
                return self
                    .report(node, ConditionStatus::Unknown, FlashReason::Unknown, e.to_string())
                    .await;
            }
        }

        match rx.await.unwrap_or(Err(CoreError::FlashAborted)) {
            Ok(outcome) => {
                let message = match outcome.convergence() {
                    Convergence::Converged => FLASH_SUCCEEDED.to_string(),
                    Convergence::StepBudgetExhausted => format!(
                        "{FLASH_SUCCEEDED} (maximum update passes reached, further updates may be available)"
                    ),
                };
                info!(
                    passes = outcome.passes(),
                    modules = outcome.results().count(),
                    convergence = ?outcome.convergence(),
                    "flash finished"
                );
                self.report(node, ConditionStatus::True, FlashReason::Succeeded, message)
                    .await
            }
            Err(e) => {
                self.report(node, ConditionStatus::False, FlashReason::Failed, e.to_string())
                    .await
            }
        }
    }
}

impl Actor for NodeReconcilerActor {
    type Args = NodeReconcilerArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            node = %args.node_name,
            namespace = %args.namespace,
            id = %actor_ref.id(),
            "NodeReconcilerActor starting"
        );

        Ok(Self {
            node_name: args.node_name,
            namespace: args.namespace,
            engine: args.engine,
            coordinator: args.coordinator,
            inventory: args.inventory,
            status: args.status,
            last_outcome: None,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(node = %self.node_name, reason = ?reason, "NodeReconcilerActor stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Reconcile> for NodeReconcilerActor {
    type Reply = Result<ReconcileOutcome, CoreError>;

    #[instrument(
        skip(self, msg, _ctx),
        fields(name = %msg.node.name_any(), generation = msg.node.generation())
    )]
    async fn handle(
        &mut self,
        msg: Reconcile,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut node = msg.node;

        if !self.is_for_this_node(&node) {
            return Ok(ReconcileOutcome::NotForThisNode);
        }

        // an InProgress condition of this generation was left by an interrupted run
        if node.flash_condition().is_some_and(|c| {
            c.observed_generation == node.generation() && c.reason != FlashReason::InProgress
        }) {
            debug!("generation already reconciled");
            return Ok(ReconcileOutcome::UpToDate);
        }

        let outcome = match node.spec.hssi.clone() {
            None => {
                debug!("nothing to do");
                self.report(
                    &mut node,
                    ConditionStatus::False,
                    FlashReason::NotRequested,
                    NOTHING_REQUESTED,
                )
                .await
            }
            Some(hssi) if hssi.macs.is_empty() => {
                error!("no MAC addresses requested");
                self.report(
                    &mut node,
                    ConditionStatus::False,
                    FlashReason::Failed,
                    "no MAC addresses requested",
                )
                .await
            }
            Some(hssi) => {
                if node.flash_condition().is_some() {
                    self.publish(
                        &mut node,
                        ConditionStatus::False,
                        FlashReason::InProgress,
                        FLASH_STARTED,
                    )
                    .await?;
                }

                let target = UpdateTarget::from_spec(&hssi, node.spec.dry_run);
                match self.engine.verify_preconditions(&target).await {
                    Ok(()) => self.flash(&mut node, target).await,
                    Err(e) => {
                        error!(error = %e, "preconditions not met");
                        self.report(
                            &mut node,
                            ConditionStatus::False,
                            FlashReason::Failed,
                            e.to_string(),
                        )
                        .await
                    }
                }
            }
        };

        info!("reconciled");
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }
}

impl Message<GetLastOutcome> for NodeReconcilerActor {
    type Reply = Result<Option<ReconcileOutcome>, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetLastOutcome,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.last_outcome.clone())
    }
}
