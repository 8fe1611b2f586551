//! nicflash-core: Firmware update engine and node reconciler
//!
//! [`FirmwareEngine`] stages the vendor update package and drives the NVM
//! update tool until the adapters converge. [`NodeReconcilerActor`] maps a
//! `FirmwareNode` resource onto the engine, runs the flash inside a
//! maintenance window and reports the outcome as a `Flashed` condition.

pub mod actor;
pub mod engine;
pub mod error;
pub mod layout;
pub mod message;
pub mod report;
pub mod status;

pub use actor::reconciler::{NodeReconcilerActor, NodeReconcilerArgs};
pub use engine::{
    ApplyOutcome, Convergence, DeviceOutcome, FirmwareEngine, ModuleOutcome, UpdateStepResult,
    UpdateTarget,
};
pub use error::{CoreError, EngineError};
pub use layout::{StagingLayout, UpdateTools};
pub use message::{GetLastOutcome, Reconcile, ReconcileOutcome};
pub use report::{ModuleReport, UpdateReport, parse_report};
pub use status::{StatusSink, inventory_status};
