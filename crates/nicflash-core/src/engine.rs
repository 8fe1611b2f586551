//! Device update engine
//!
//! Stages the vendor package and drives the NVM update tool for each
//! requested adapter until the tool reports no further update or the pass
//! budget runs out, then power-cycles the affected cards.

use std::sync::Arc;

use nicflash_api::HssiSpec;
use nicflash_artifact::{ArtifactRequest, ArtifactStore, Checksum};
use nicflash_exec::{CommandSpec, ProcessRunner};
use nicflash_inventory::{DeviceRecord, InventoryProvider, locate_device};
use tracing::{debug, info, instrument, warn};

use crate::error::EngineError;
use crate::layout::{StagingLayout, UpdateTools};
use crate::report::{UpdateReport, parse_report};

/// Refresh+update passes allowed per adapter
pub const MAX_UPDATE_PASSES: u32 = 2;

/// What to flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Adapter MAC addresses
    pub selectors: Vec<String>,
    /// Package URL
    pub firmware_url: String,
    /// Declared MD5, if any
    pub checksum: Option<String>,
    /// Exercise the flow without touching hardware
    pub dry_run: bool,
}

impl UpdateTarget {
    /// Target described by a resource's HSSI section
    #[must_use]
    pub fn from_spec(spec: &HssiSpec, dry_run: bool) -> Self {
        let checksum = spec.checksum.trim();
        Self {
            selectors: spec.macs.clone(),
            firmware_url: spec.firmware_url.clone(),
            checksum: (!checksum.is_empty()).then(|| checksum.to_string()),
            dry_run,
        }
    }
}

/// How a module fared in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    Success,
    /// Tool's result string
    Failure(String),
}

impl ModuleOutcome {
    fn from_result(result: &str) -> Self {
        if result == crate::report::SUCCESS_RESULT {
            ModuleOutcome::Success
        } else {
            ModuleOutcome::Failure(result.to_string())
        }
    }
}

/// One module reported by one update pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStepResult {
    pub module: String,
    pub version: String,
    pub outcome: ModuleOutcome,
    /// The pass that reported this module announced another update
    pub more_pending: bool,
}

/// Why the update loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Tool reported no further update
    Converged,
    /// Pass budget used up while the tool still offered an update
    StepBudgetExhausted,
}

/// Result of updating one adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    pub selector: String,
    /// Card the adapter sits on
    pub card_pci: String,
    pub passes: u32,
    pub convergence: Convergence,
    pub results: Vec<UpdateStepResult>,
}

/// Result of [`FirmwareEngine::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub devices: Vec<DeviceOutcome>,
}

impl ApplyOutcome {
    /// Module results of every adapter, in order
    pub fn results(&self) -> impl Iterator<Item = &UpdateStepResult> {
        self.devices.iter().flat_map(|d| d.results.iter())
    }

    /// Total passes over all adapters
    #[must_use]
    pub fn passes(&self) -> u32 {
        self.devices.iter().map(|d| d.passes).sum()
    }

    /// `StepBudgetExhausted` if any adapter stopped at the budget
    #[must_use]
    pub fn convergence(&self) -> Convergence {
        if self
            .devices
            .iter()
            .any(|d| d.convergence == Convergence::StepBudgetExhausted)
        {
            Convergence::StepBudgetExhausted
        } else {
            Convergence::Converged
        }
    }

    /// Cards touched, first occurrence order, no duplicates
    #[must_use]
    pub fn card_addresses(&self) -> Vec<String> {
        let mut cards: Vec<String> = Vec::new();
        for device in &self.devices {
            if !cards.contains(&device.card_pci) {
                cards.push(device.card_pci.clone());
            }
        }
        cards
    }
}

/// Drives firmware updates through injected capabilities
pub struct FirmwareEngine {
    runner: Arc<dyn ProcessRunner>,
    /// Runs package extraction
    stager: Arc<dyn ProcessRunner>,
    inventory: Arc<dyn InventoryProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    layout: StagingLayout,
    tools: UpdateTools,
    max_passes: u32,
    /// Treat every target as a dry run
    force_dry_run: bool,
}

impl FirmwareEngine {
    /// Create an engine with the default layout and tools
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        inventory: Arc<dyn InventoryProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            stager: Arc::clone(&runner),
            runner,
            inventory,
            artifacts,
            layout: StagingLayout::default(),
            tools: UpdateTools::default(),
            max_passes: MAX_UPDATE_PASSES,
            force_dry_run: false,
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: StagingLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Extract packages with `stager` instead of the tool runner
    ///
    /// Lets a dry-run tool runner still stage real files.
    #[must_use]
    pub fn with_staging_runner(mut self, stager: Arc<dyn ProcessRunner>) -> Self {
        self.stager = stager;
        self
    }

    /// Run every target as a dry run, whatever it requests
    ///
    /// Pair with a dry-run tool runner: no result file is expected from the
    /// tool and none is removed.
    #[must_use]
    pub fn with_forced_dry_run(mut self, force: bool) -> Self {
        self.force_dry_run = force;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: UpdateTools) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    fn dry_run(&self, target: &UpdateTarget) -> bool {
        target.dry_run || self.force_dry_run
    }

    /// Check the target and stage the package
    ///
    /// The package is downloaded and verified before anything is extracted or
    /// any tool runs. Extraction always happens, even for dry runs.
    ///
    /// # Errors
    /// Empty URL, no selectors, malformed checksum, an adapter missing from
    /// the inventory, download or checksum failure, extraction failure, or a
    /// missing or symlinked tool binary or config.
    #[instrument(skip(self, target), fields(url = %target.firmware_url))]
    pub async fn verify_preconditions(&self, target: &UpdateTarget) -> Result<(), EngineError> {
        if target.firmware_url.trim().is_empty() {
            return Err(EngineError::EmptyFirmwareUrl);
        }
        if target.selectors.is_empty() {
            return Err(EngineError::NoSelectors);
        }
        let checksum = target
            .checksum
            .as_deref()
            .map(Checksum::parse)
            .transpose()?;

        let cards = self.inventory.cards().await?;
        for selector in &target.selectors {
            if locate_device(&cards, selector).is_none() {
                return Err(EngineError::SelectorNotFound(selector.clone()));
            }
        }

        let root = self.layout.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| EngineError::io(root, e))?;

        info!("start downloading");
        let package = self
            .artifacts
            .fetch(&ArtifactRequest {
                url: target.firmware_url.clone(),
                checksum,
                destination: self.layout.package(),
            })
            .await?;

        debug!(package = %package.display(), "extracting nvmupdate package");
        let extract = CommandSpec::new(&self.tools.tar)
            .arg("xzf")
            .arg(package.to_string_lossy())
            .arg("-C")
            .arg(root.to_string_lossy());
        self.stager.execute_checked(&extract).await?;

        self.verify_staged().await
    }

    async fn verify_staged(&self) -> Result<(), EngineError> {
        for path in [
            self.layout.tool_binary(&self.tools),
            self.layout.config_file(),
        ] {
            let meta = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(EngineError::Staging {
                        path,
                        reason: "missing".to_string(),
                    });
                }
                Err(e) => return Err(EngineError::io(path, e)),
            };
            if meta.file_type().is_symlink() {
                return Err(EngineError::Staging {
                    path,
                    reason: "is a symlink".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Update every selected adapter
    ///
    /// Adapters are resolved against a fresh inventory and updated in order.
    ///
    /// # Errors
    /// The first selector missing from the inventory, tool failure, or module
    /// failure; later adapters are not attempted.
    #[instrument(skip(self, target), fields(dry_run = self.dry_run(target)))]
    pub async fn apply(&self, target: &UpdateTarget) -> Result<ApplyOutcome, EngineError> {
        let dry_run = self.dry_run(target);
        let cards = self.inventory.cards().await?;
        let mut outcome = ApplyOutcome::default();

        for selector in &target.selectors {
            let device = locate_device(&cards, selector)
                .ok_or_else(|| EngineError::SelectorNotFound(selector.clone()))?;
            outcome
                .devices
                .push(self.apply_device(selector, device, dry_run).await?);
        }

        Ok(outcome)
    }

    async fn apply_device(
        &self,
        selector: &str,
        device: &DeviceRecord,
        dry_run: bool,
    ) -> Result<DeviceOutcome, EngineError> {
        let mac_arg = selector.replace(':', "").to_uppercase();
        let config = self.layout.config_file().to_string_lossy().into_owned();
        let result_file = self.layout.result_file().to_string_lossy().into_owned();
        let mut results = Vec::new();
        let mut passes = 0;

        loop {
            if !dry_run {
                self.remove_stale_result().await?;
            }

            // refresh the tool's view of connected devices
            self.nvmupdate(["-i"], dry_run).await?;

            info!(mac = selector, interface = %device.interface, "updating");
            self.nvmupdate(
                [
                    "-u",
                    "-m",
                    mac_arg.as_str(),
                    "-c",
                    config.as_str(),
                    "-o",
                    result_file.as_str(),
                    "-l",
                ],
                dry_run,
            )
            .await?;
            passes += 1;

            let report = if dry_run {
                info!(mac = selector, "dry run device update succeeded");
                UpdateReport::default()
            } else {
                self.read_report().await?
            };

            for module in report.modules {
                let outcome = ModuleOutcome::from_result(&module.result);
                if let ModuleOutcome::Failure(result) = outcome {
                    return Err(EngineError::ModuleFailure {
                        selector: selector.to_string(),
                        module: module.module,
                        version: module.version,
                        result,
                    });
                }
                info!(mac = selector, module = %module.module, version = %module.version, "module updated");
                results.push(UpdateStepResult {
                    module: module.module,
                    version: module.version,
                    outcome,
                    more_pending: report.next_update_available,
                });
            }

            let convergence = if !report.next_update_available {
                info!(mac = selector, passes, "device updated to latest firmware");
                Convergence::Converged
            } else if passes >= self.max_passes {
                warn!(
                    mac = selector,
                    passes, "next update available but maximum step count reached"
                );
                Convergence::StepBudgetExhausted
            } else {
                info!(mac = selector, "next update available - updating");
                continue;
            };

            return Ok(DeviceOutcome {
                selector: selector.to_string(),
                card_pci: device.card_pci.clone(),
                passes,
                convergence,
                results,
            });
        }
    }

    async fn nvmupdate<const N: usize>(
        &self,
        args: [&str; N],
        dry_run: bool,
    ) -> Result<(), EngineError> {
        let cmd = CommandSpec::new(&self.tools.nvmupdate)
            .args(args)
            .current_dir(self.layout.tool_dir())
            .dry_run(dry_run);
        let result = self.runner.execute_checked(&cmd).await?;
        for line in result.stdout.lines() {
            debug!(command = %cmd, "{line}");
        }
        Ok(())
    }

    async fn remove_stale_result(&self) -> Result<(), EngineError> {
        let path = self.layout.result_file();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::io(path, e)),
        }
    }

    async fn read_report(&self) -> Result<UpdateReport, EngineError> {
        let path = self.layout.result_file();
        let xml = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::io(&path, e))?;
        parse_report(&xml).map_err(|e| EngineError::Report {
            path,
            message: e.to_string(),
        })
    }

    /// Power-cycle cards so new firmware takes effect
    ///
    /// Failures are logged and never returned.
    #[instrument(skip(self))]
    pub async fn power_cycle(&self, card_pcis: &[String], dry_run: bool) {
        for pci in card_pcis {
            let cmd = CommandSpec::new(&self.tools.rsu)
                .args(["bmcimg", pci.as_str()])
                .dry_run(dry_run);
            match self.runner.execute_checked(&cmd).await {
                Ok(_) => info!(pci = %pci, "card power-cycled"),
                Err(e) => warn!(pci = %pci, error = %e, "failed to power-cycle card"),
            }
        }
    }

    /// Apply the target, then power-cycle the cards that were updated
    ///
    /// # Errors
    /// See [`apply`](Self::apply). Cards are not power-cycled on error.
    pub async fn flash(&self, target: &UpdateTarget) -> Result<ApplyOutcome, EngineError> {
        let outcome = self.apply(target).await?;
        self.power_cycle(&outcome.card_addresses(), self.dry_run(target))
            .await;
        Ok(outcome)
    }
}
