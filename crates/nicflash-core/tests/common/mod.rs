//! Test doubles shared by the engine and reconciler tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nicflash_api::{FirmwareNode, ResourceExt};
use nicflash_artifact::{ArtifactError, ArtifactRequest, ArtifactStore, Checksum};
use nicflash_core::{CoreError, FirmwareEngine, StagingLayout, StatusSink};
use nicflash_exec::{CommandResult, CommandSpec, ExecError, ProcessRunner};
use nicflash_inventory::{CardInventory, DeviceRecord, InventoryError, InventoryProvider};

pub const CARD: &str = "0000:1b:00.0";
pub const MAC_A: &str = "64:4c:36:11:1b:a8";
pub const MAC_B: &str = "64:4c:36:11:1b:a9";
pub const PACKAGE: &[u8] = b"abc";
pub const PACKAGE_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

pub fn report_xml(result: &str, next_update: u8) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<DeviceUpdate lang="en">
  <Instance vendor="8086" device="1592">
    <Module type="NVM" version="0x8000a4ae" previous_version="0x80008b93">
      <Status result="{result}" id="0">done</Status>
    </Module>
    <Module type="OROM" version="1.3.60">
    </Module>
  </Instance>
  <NextUpdateAvailable> {next_update} </NextUpdateAvailable>
</DeviceUpdate>
"#
    )
}

/// Plays the part of `tar`, `nvmupdate64e` and `rsu`
pub struct ScriptedRunner {
    reports: Mutex<Vec<String>>,
    extract_tools: bool,
    fail_rsu: bool,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Each update pass writes the next report; the last one repeats
    pub fn new(reports: Vec<String>) -> Self {
        Self {
            reports: Mutex::new(reports),
            extract_tools: true,
            fail_rsu: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `tar` succeeds without producing the tool files
    pub fn without_tools(mut self) -> Self {
        self.extract_tools = false;
        self
    }

    pub fn failing_rsu(mut self) -> Self {
        self.fail_rsu = true;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    fn next_report(&self) -> String {
        let mut reports = self.reports.lock().unwrap();
        if reports.len() > 1 {
            reports.remove(0)
        } else {
            reports.first().cloned().unwrap_or_default()
        }
    }

    fn value_after<'a>(cmd: &'a CommandSpec, flag: &str) -> &'a str {
        let idx = cmd.args.iter().position(|a| a == flag).unwrap();
        &cmd.args[idx + 1]
    }

    fn ok() -> CommandResult {
        CommandResult {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.calls.lock().unwrap().push(cmd.clone());
        match cmd.program.as_str() {
            "tar" => {
                if self.extract_tools {
                    let root = Path::new(Self::value_after(cmd, "-C"));
                    let tool_dir = root.join("800Series/Linux_x64");
                    std::fs::create_dir_all(&tool_dir).unwrap();
                    std::fs::write(tool_dir.join("nvmupdate64e"), b"#!/bin/sh\n").unwrap();
                    std::fs::write(tool_dir.join("nvmupdate.cfg"), b"CONFIG VERSION: 1.0\n").unwrap();
                }
                Ok(Self::ok())
            }
            "./nvmupdate64e" => {
                if cmd.args.first().map(String::as_str) == Some("-u") {
                    std::fs::write(Self::value_after(cmd, "-o"), self.next_report()).unwrap();
                }
                Ok(Self::ok())
            }
            "rsu" if self.fail_rsu => Ok(CommandResult {
                status: 1,
                stdout: String::new(),
                stderr: "bmc not responding".to_string(),
                duration: Duration::ZERO,
            }),
            "rsu" => Ok(Self::ok()),
            other => panic!("unexpected command {other}"),
        }
    }

    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn runner_type(&self) -> &'static str {
        "scripted"
    }
}

/// One card with two adapters
pub struct StaticInventory;

#[async_trait]
impl InventoryProvider for StaticInventory {
    async fn cards(&self) -> Result<Vec<CardInventory>, InventoryError> {
        let device = |mac: &str, interface: &str| DeviceRecord {
            mac: mac.to_string(),
            interface: interface.to_string(),
            card_pci: CARD.to_string(),
            firmware_version: "4.00 0x80008b93 1.2892.0".to_string(),
            name: "Device 0b30".to_string(),
        };
        Ok(vec![CardInventory {
            pci_address: CARD.to_string(),
            devices: vec![device(MAC_A, "eth0"), device(MAC_B, "eth1")],
        }])
    }
}

/// Serves a fixed package body
pub struct FixedArtifacts {
    body: &'static [u8],
    fetches: Mutex<u32>,
}

impl FixedArtifacts {
    pub fn new(body: &'static [u8]) -> Self {
        Self {
            body,
            fetches: Mutex::new(0),
        }
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl ArtifactStore for FixedArtifacts {
    async fn fetch(&self, request: &ArtifactRequest) -> Result<PathBuf, ArtifactError> {
        *self.fetches.lock().unwrap() += 1;
        let actual = Checksum::of_bytes(self.body);
        if let Some(expected) = &request.checksum
            && *expected != actual
        {
            return Err(ArtifactError::ChecksumMismatch {
                url: request.url.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        std::fs::write(&request.destination, self.body).unwrap();
        Ok(request.destination.clone())
    }
}

/// Keeps every published status and checks resource versions
///
/// Once something is stored, a write must carry the stored resource version;
/// each accepted write bumps it.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<FirmwareNode>>,
    stored: Mutex<Option<FirmwareNode>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<FirmwareNode> {
        self.published.lock().unwrap().clone()
    }

    /// Object as it is stored now
    pub fn stored(&self) -> Option<FirmwareNode> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish_status(&self, node: &FirmwareNode) -> Result<FirmwareNode, CoreError> {
        let mut stored = self.stored.lock().unwrap();
        if let Some(current) = stored.as_ref()
            && current.resource_version() != node.resource_version()
        {
            return Err(CoreError::Status(format!(
                "conflict: resourceVersion {:?} is stale",
                node.resource_version()
            )));
        }

        let version = node
            .resource_version()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default()
            + 1;
        let mut next = node.clone();
        next.metadata.resource_version = Some(version.to_string());
        self.published.lock().unwrap().push(next.clone());
        *stored = Some(next.clone());
        Ok(next)
    }
}

pub fn engine(
    runner: &Arc<ScriptedRunner>,
    artifacts: &Arc<FixedArtifacts>,
    root: &Path,
) -> FirmwareEngine {
    FirmwareEngine::new(runner.clone(), Arc::new(StaticInventory), artifacts.clone())
        .with_layout(StagingLayout::new(root.join("nvmupdate")))
}
