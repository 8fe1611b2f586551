//! Publishing resource status

use async_trait::async_trait;
use nicflash_api::{FirmwareNode, HssiCardStatus, NicStatus};
use nicflash_inventory::CardInventory;

use crate::error::CoreError;

/// Writes a resource's status back to wherever resources live
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Replace the status of `node`, returning the stored object
    async fn publish_status(&self, node: &FirmwareNode) -> Result<FirmwareNode, CoreError>;
}

/// Inventory in the shape reported in resource status
#[must_use]
pub fn inventory_status(cards: &[CardInventory]) -> Vec<HssiCardStatus> {
    cards
        .iter()
        .map(|card| HssiCardStatus {
            pci_addr: card.pci_address.clone(),
            nics: card
                .devices
                .iter()
                .map(|d| NicStatus {
                    mac: d.mac.clone(),
                    name: d.name.clone(),
                    version: d.firmware_version.clone(),
                    interface: d.interface.clone(),
                })
                .collect(),
        })
        .collect()
}
