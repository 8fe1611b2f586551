//! Application state shared across HTTP handlers

use kameo::actor::ActorRef;
use nicflash_core::NodeReconcilerActor;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Reference to the reconciler actor
    pub reconciler: ActorRef<NodeReconcilerActor>,
}

impl AppState {
    /// Create new application state
    pub fn new(reconciler: ActorRef<NodeReconcilerActor>) -> Self {
        Self { reconciler }
    }
}
