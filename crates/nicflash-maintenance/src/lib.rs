//! nicflash-maintenance: Cluster-wide maintenance windows
//!
//! A node may only mutate firmware while it holds the shared lease. The
//! [`Coordinator`] campaigns for that lease, cordons and drains the node,
//! runs the caller's work, uncordons and finally releases the lease.
//!
//! The Kubernetes API is reached through the [`LeaseApi`] and [`NodeApi`]
//! traits. With the `test-util` feature, `memory` provides in-process
//! implementations for tests.

pub mod backoff;
pub mod cancel;
pub mod coordinator;
pub mod drain;
pub mod error;
pub mod lease;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod node;

pub use backoff::{Backoff, Exhausted};
pub use cancel::{CancelHandle, CancelSignal};
pub use coordinator::{Coordinator, WindowState};
pub use drain::Drainer;
pub use error::{ApiError, DrainError, MaintenanceError};
pub use lease::{ElectionConfig, LeaderElector, LeaseApi, LeaseRecord};
pub use node::{NodeApi, PodInfo};
