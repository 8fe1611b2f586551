use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nicflash_exec::{CommandResult, CommandSpec, ExecError, ProcessRunner};
use nicflash_inventory::{DiagnosticInventory, InventoryError, InventoryProvider, locate_device};

/// Answers diagnostic commands from canned output
struct CannedRunner {
    fpgainfo: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl CannedRunner {
    fn new(fpgainfo: Option<&str>) -> Self {
        Self {
            fpgainfo: fpgainfo.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl ProcessRunner for CannedRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.calls.lock().unwrap().push(cmd.to_string());
        match cmd.program.as_str() {
            "fpgainfo" => match &self.fpgainfo {
                Some(out) => Ok(Self::ok(out)),
                None => Ok(CommandResult {
                    status: 1,
                    stdout: String::new(),
                    stderr: "no FPGA".to_string(),
                    duration: Duration::ZERO,
                }),
            },
            "ethtool" if cmd.args[1] == "eth1" => Err(ExecError::IoError("gone".to_string())),
            "ethtool" => Ok(Self::ok("driver: i40e\nfirmware-version: 8.30 0x8000a4ae\n")),
            "lspci" => Ok(Self::ok(
                "0000:1b:00.0 \"Processing accelerators\" \"Intel Corporation\" \"Device 0b30\"\n",
            )),
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
        "canned"
    }
}

fn add_interface(root: &Path, card: &str, dfl: &str, iface: &str, mac: &str) {
    let dir = root
        .join("bus/pci/devices")
        .join(card)
        .join("fpga_region/region0/dfl-fme.0")
        .join(dfl)
        .join("net")
        .join(iface);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
}

const BMC_OUTPUT: &str = "\
//****** BMC SENSORS ******//
PCIe s:b:d.f                     : 0000:1b:00.0
";

#[tokio::test]
async fn test_cards_reads_sysfs_and_tools() {
    let sysfs = tempfile::tempdir().unwrap();
    add_interface(sysfs.path(), "0000:1b:00.0", "dfl-fme.0.3", "eth0", "64:4c:36:11:1b:a8");
    add_interface(sysfs.path(), "0000:1b:00.0", "dfl-fme.0.4", "eth1", "64:4c:36:11:1b:a9");

    let runner = Arc::new(CannedRunner::new(Some(BMC_OUTPUT)));
    let inventory =
        DiagnosticInventory::new(runner.clone()).with_sysfs_root(sysfs.path().to_path_buf());

    let cards = inventory.cards().await.unwrap();

    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].pci_address, "0000:1b:00.0");
    assert_eq!(cards[0].devices.len(), 2);

    let eth0 = locate_device(&cards, "64:4C:36:11:1B:A8").unwrap();
    assert_eq!(eth0.interface, "eth0");
    assert_eq!(eth0.firmware_version, "8.30 0x8000a4ae");
    assert_eq!(eth0.name, "Device 0b30");
    assert_eq!(eth0.card_pci, "0000:1b:00.0");

    // ethtool failure leaves the version empty instead of failing the query
    let eth1 = locate_device(&cards, "64:4c:36:11:1b:a9").unwrap();
    assert_eq!(eth1.firmware_version, "");

    let calls = runner.calls.lock().unwrap();
    assert!(calls.contains(&"fpgainfo bmc".to_string()));
    assert!(calls.contains(&"lspci -Dm -s 0000:1b:00.0".to_string()));
}

#[tokio::test]
async fn test_cards_without_interfaces() {
    let sysfs = tempfile::tempdir().unwrap();
    let runner = Arc::new(CannedRunner::new(Some(BMC_OUTPUT)));
    let inventory = DiagnosticInventory::new(runner).with_sysfs_root(sysfs.path().to_path_buf());

    let cards = inventory.cards().await.unwrap();

    assert_eq!(cards.len(), 1);
    assert!(cards[0].devices.is_empty());
}

#[tokio::test]
async fn test_fpgainfo_failure_fails_query() {
    let sysfs = tempfile::tempdir().unwrap();
    let runner = Arc::new(CannedRunner::new(None));
    let inventory = DiagnosticInventory::new(runner).with_sysfs_root(sysfs.path().to_path_buf());

    let err = inventory.cards().await.unwrap_err();

    assert!(matches!(err, InventoryError::ToolFailed { ref tool, .. } if tool == "fpgainfo"));
}
