//! Inventory collection from diagnostic tools and sysfs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nicflash_exec::{CommandSpec, ProcessRunner};
use tracing::{debug, instrument, warn};

use crate::error::InventoryError;
use crate::parse::{
    parse_bmc_pci_addresses, parse_ethtool_firmware_version, parse_lspci_device_name,
};
use crate::traits::InventoryProvider;
use crate::types::{CardInventory, DeviceRecord};

/// Names or paths of the diagnostic tools
#[derive(Debug, Clone)]
pub struct DiagnosticTools {
    /// FPGA info tool (`fpgainfo`)
    pub fpgainfo: String,
    /// `ethtool`
    pub ethtool: String,
    /// `lspci`
    pub lspci: String,
}

impl Default for DiagnosticTools {
    fn default() -> Self {
        Self {
            fpgainfo: "fpgainfo".to_string(),
            ethtool: "ethtool".to_string(),
            lspci: "lspci".to_string(),
        }
    }
}

/// Inventory provider backed by `fpgainfo`, sysfs, `ethtool` and `lspci`
pub struct DiagnosticInventory {
    runner: Arc<dyn ProcessRunner>,
    tools: DiagnosticTools,
    sysfs_root: PathBuf,
    timeout: Duration,
}

impl DiagnosticInventory {
    /// Create a provider reading the real `/sys`
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            tools: DiagnosticTools::default(),
            sysfs_root: PathBuf::from("/sys"),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override tool names
    #[must_use]
    pub fn with_tools(mut self, tools: DiagnosticTools) -> Self {
        self.tools = tools;
        self
    }

    /// Read sysfs from another root (used by tests and chroots)
    #[must_use]
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    /// Set the per-command timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_tool(&self, cmd: CommandSpec) -> Result<String, InventoryError> {
        let tool = cmd.program.clone();
        let result = self
            .runner
            .run_with_timeout(&cmd, self.timeout)
            .await
            .map_err(|e| InventoryError::ToolFailed {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        if !result.success() {
            return Err(InventoryError::ToolFailed {
                tool,
                message: format!("exit status {}: {}", result.status, result.stderr.trim()),
            });
        }
        Ok(result.stdout)
    }

    /// PCI addresses of all FPGA cards
    async fn card_addresses(&self) -> Result<Vec<String>, InventoryError> {
        let output = self
            .run_tool(CommandSpec::new(&self.tools.fpgainfo).arg("bmc"))
            .await?;
        Ok(parse_bmc_pci_addresses(&output))
    }

    /// Network interface directories under a card's FPGA region
    fn interface_dirs(&self, card_pci: &str) -> Result<Vec<PathBuf>, InventoryError> {
        let base = self.sysfs_root.join("bus/pci/devices").join(card_pci);
        let pattern = format!(
            "{}/fpga_region/region*/dfl-fme.0/dfl*/net/*",
            glob::Pattern::escape(&base.to_string_lossy())
        );

        let paths = glob::glob(&pattern).map_err(|e| InventoryError::Sysfs(e.to_string()))?;
        let mut dirs = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => dirs.push(path),
                Err(e) => warn!(error = %e, "unreadable sysfs entry"),
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn firmware_version(&self, interface: &str) -> String {
        let cmd = CommandSpec::new(&self.tools.ethtool).args(["-i", interface]);
        match self.run_tool(cmd).await {
            Ok(output) => parse_ethtool_firmware_version(&output).unwrap_or_default(),
            Err(e) => {
                warn!(interface, error = %e, "unable to get ethtool info");
                String::new()
            }
        }
    }

    async fn device_name(&self, card_pci: &str) -> String {
        let cmd = CommandSpec::new(&self.tools.lspci).args(["-Dm", "-s", card_pci]);
        match self.run_tool(cmd).await {
            Ok(output) => parse_lspci_device_name(&output).unwrap_or_default(),
            Err(e) => {
                warn!(pci = card_pci, error = %e, "unable to get lspci info");
                String::new()
            }
        }
    }

    async fn card(&self, card_pci: &str) -> Result<CardInventory, InventoryError> {
        let name = self.device_name(card_pci).await;
        let mut devices = Vec::new();

        for dir in self.interface_dirs(card_pci)? {
            let Some(interface) = interface_name(&dir) else {
                continue;
            };
            let mac = match tokio::fs::read_to_string(dir.join("address")).await {
                Ok(mac) => mac.trim().to_string(),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "unable to read MAC address");
                    continue;
                }
            };

            devices.push(DeviceRecord {
                firmware_version: self.firmware_version(&interface).await,
                mac,
                interface,
                card_pci: card_pci.to_string(),
                name: name.clone(),
            });
        }

        Ok(CardInventory {
            pci_address: card_pci.to_string(),
            devices,
        })
    }
}

fn interface_name(dir: &Path) -> Option<String> {
    dir.file_name().map(|n| n.to_string_lossy().to_string())
}

#[async_trait]
impl InventoryProvider for DiagnosticInventory {
    #[instrument(skip(self))]
    async fn cards(&self) -> Result<Vec<CardInventory>, InventoryError> {
        let mut cards = Vec::new();
        for pci in self.card_addresses().await? {
            cards.push(self.card(&pci).await?);
        }

        debug!(
            cards = cards.len(),
            devices = cards.iter().map(|c| c.devices.len()).sum::<usize>(),
            "inventory collected"
        );
        Ok(cards)
    }
}
