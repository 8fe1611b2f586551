//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use kameo_macros::Reply;
use nicflash_api::{Condition, FirmwareNode};

/// Reconcile the node's firmware against a resource snapshot
#[derive(Debug)]
pub struct Reconcile {
    /// Latest version of the resource
    pub node: FirmwareNode,
}

/// Last completed reconcile, if any
#[derive(Debug)]
pub struct GetLastOutcome;

/// What a reconcile did
#[derive(Debug, Clone, PartialEq, Eq, Reply)]
pub enum ReconcileOutcome {
    /// Resource belongs to another node or namespace
    NotForThisNode,
    /// This generation was already handled
    UpToDate,
    /// A `Flashed` condition was written
    Completed(Condition),
    /// Shutdown came before the maintenance window opened; retried on restart
    Interrupted,
}
