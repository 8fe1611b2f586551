//! Inventory provider trait

use async_trait::async_trait;

use crate::error::InventoryError;
use crate::types::CardInventory;

/// Source of the hardware currently attached to this node
///
/// Implementations must not cache: topology can change between reconcile
/// passes, so every call reflects the hardware as it is now.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Enumerate cards and their network devices
    async fn cards(&self) -> Result<Vec<CardInventory>, InventoryError>;
}
