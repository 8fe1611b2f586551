//! nicflash-inventory: FPGA card and network adapter discovery
//!
//! Enumerates cards with `fpgainfo`, walks sysfs for the network interfaces
//! each card exposes and enriches them with `ethtool` and `lspci` output.

pub mod collector;
pub mod error;
pub mod parse;
pub mod traits;
pub mod types;

pub use collector::{DiagnosticInventory, DiagnosticTools};
pub use error::InventoryError;
pub use traits::InventoryProvider;
pub use types::{CardInventory, DeviceRecord, locate_device, normalize_mac};
