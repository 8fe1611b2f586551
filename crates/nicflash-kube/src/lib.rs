//! nicflash-kube: Kubernetes API client
//!
//! Wraps a `kube::Client` and implements what the daemon needs from the
//! cluster: the maintenance lease, node scheduling and pod eviction, the
//! `FirmwareNode` resource and its status, and the split of a
//! `FirmwareCluster` into per-node resources.
//!
//! ```no_run
//! use nicflash_kube::KubeClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClient::infer(None).await?;
//! if let Some(node) = client.get_firmware_node("nicflash", "worker-1").await? {
//!     println!("generation {}", node.generation());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cluster;
pub mod error;
pub mod lease;
pub mod node;
pub mod resource;

pub use client::KubeClient;
pub use cluster::ClusterSync;
pub use error::{KubeError, Result};
