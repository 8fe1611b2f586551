//! Inventory type definitions

use serde::{Deserialize, Serialize};

/// A network device exposed by an FPGA card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// MAC address as reported by sysfs (lowercase, colon separated)
    pub mac: String,
    /// Kernel network interface name
    pub interface: String,
    /// PCI address of the parent card; devices sharing it are power cycled together
    pub card_pci: String,
    /// Firmware version from `ethtool -i`, empty when unknown
    pub firmware_version: String,
    /// Device name from `lspci`, empty when unknown
    pub name: String,
}

impl DeviceRecord {
    /// Check whether `selector` (a MAC address in any case) names this device
    #[must_use]
    pub fn matches(&self, selector: &str) -> bool {
        normalize_mac(&self.mac) == normalize_mac(selector)
    }
}

/// One FPGA card and the network devices behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInventory {
    /// PCI address of the card's BMC
    pub pci_address: String,
    /// Network devices found on the card
    pub devices: Vec<DeviceRecord>,
}

/// Canonical form of a MAC address used for comparisons
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

/// Find the device a selector refers to
#[must_use]
pub fn locate_device<'a>(cards: &'a [CardInventory], selector: &str) -> Option<&'a DeviceRecord> {
    cards
        .iter()
        .flat_map(|card| card.devices.iter())
        .find(|device| device.matches(selector))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(pci: &str, macs: &[&str]) -> CardInventory {
        CardInventory {
            pci_address: pci.to_string(),
            devices: macs
                .iter()
                .enumerate()
                .map(|(i, mac)| DeviceRecord {
                    mac: (*mac).to_string(),
                    interface: format!("eth{i}"),
                    card_pci: pci.to_string(),
                    firmware_version: String::new(),
                    name: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_locate_device_ignores_case_and_whitespace() {
        let cards = vec![
            card("0000:1b:00.0", &["64:4c:36:11:1b:a8"]),
            card("0000:af:00.0", &["64:4c:36:11:1b:b0", "64:4c:36:11:1b:b1"]),
        ];

        let found = locate_device(&cards, " 64:4C:36:11:1B:B1\n").unwrap();
        assert_eq!(found.card_pci, "0000:af:00.0");
        assert_eq!(found.interface, "eth1");
    }

    #[test]
    fn test_locate_device_missing() {
        let cards = vec![card("0000:1b:00.0", &["64:4c:36:11:1b:a8"])];
        assert!(locate_device(&cards, "00:00:00:00:00:00").is_none());
        assert!(locate_device(&[], "64:4c:36:11:1b:a8").is_none());
    }
}
