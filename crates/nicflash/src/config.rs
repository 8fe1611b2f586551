//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use nicflash_core::{StagingLayout, UpdateTools};
use nicflash_inventory::DiagnosticTools;
use nicflash_maintenance::ElectionConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the nicflash daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Maintenance lease
    #[serde(default)]
    pub lease: LeaseConfig,
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// External tools
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between polls of the node's resource
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Address of the health probe server
    #[serde(default = "default_probe_bind")]
    pub probe_bind: String,
    /// Timeout for the package download
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_secs: default_poll_interval(),
            probe_bind: default_probe_bind(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_name")]
    pub name: String,
    #[serde(default = "default_lease_duration")]
    pub duration_secs: u64,
    #[serde(default = "default_renew_deadline")]
    pub renew_deadline_secs: u64,
    #[serde(default = "default_retry_period")]
    pub retry_period_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            name: default_lease_name(),
            duration_secs: default_lease_duration(),
            renew_deadline_secs: default_renew_deadline(),
            retry_period_secs: default_retry_period(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Staging directory for the update package
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// sysfs mount point
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

/// Names or paths of the tools the daemon runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_nvmupdate")]
    pub nvmupdate: String,
    #[serde(default = "default_rsu")]
    pub rsu: String,
    #[serde(default = "default_tar")]
    pub tar: String,
    #[serde(default = "default_fpgainfo")]
    pub fpgainfo: String,
    #[serde(default = "default_ethtool")]
    pub ethtool: String,
    #[serde(default = "default_lspci")]
    pub lspci: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            nvmupdate: default_nvmupdate(),
            rsu: default_rsu(),
            tar: default_tar(),
            fpgainfo: default_fpgainfo(),
            ethtool: default_ethtool(),
            lspci: default_lspci(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_probe_bind() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_download_timeout() -> u64 {
    600
}

fn default_lease_name() -> String {
    ElectionConfig::DEFAULT_LEASE_NAME.to_string()
}

fn default_lease_duration() -> u64 {
    60
}

fn default_renew_deadline() -> u64 {
    15
}

fn default_retry_period() -> u64 {
    5
}

fn default_workdir() -> PathBuf {
    PathBuf::from(StagingLayout::DEFAULT_ROOT)
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_nvmupdate() -> String {
    UpdateTools::default().nvmupdate
}

fn default_rsu() -> String {
    UpdateTools::default().rsu
}

fn default_tar() -> String {
    UpdateTools::default().tar
}

fn default_fpgainfo() -> String {
    DiagnosticTools::default().fpgainfo
}

fn default_ethtool() -> String {
    DiagnosticTools::default().ethtool
}

fn default_lspci() -> String {
    DiagnosticTools::default().lspci
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `NICFLASH_CONFIG`, then the default paths, else defaults
    ///
    /// # Errors
    /// Returns error if a file is found but cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("NICFLASH_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let paths = [
            Some(PathBuf::from("nicflash.toml")),
            Some(PathBuf::from("/etc/nicflash/nicflash.toml")),
            dirs::config_dir().map(|p| p.join("nicflash/nicflash.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.poll_interval_secs.max(1))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.download_timeout_secs)
    }

    /// Election parameters for this node, `LEASE_DURATION_SECONDS` applied
    pub fn election(&self, namespace: &str, identity: &str) -> ElectionConfig {
        ElectionConfig {
            lease_name: self.lease.name.clone(),
            lease_duration: Duration::from_secs(self.lease.duration_secs),
            renew_deadline: Duration::from_secs(self.lease.renew_deadline_secs),
            retry_period: Duration::from_secs(self.lease.retry_period_secs),
            ..ElectionConfig::new(namespace, identity)
        }
        .with_env_override()
    }

    pub fn layout(&self) -> StagingLayout {
        StagingLayout::new(&self.paths.workdir)
    }

    pub fn update_tools(&self) -> UpdateTools {
        UpdateTools {
            nvmupdate: self.tools.nvmupdate.clone(),
            rsu: self.tools.rsu.clone(),
            tar: self.tools.tar.clone(),
        }
    }

    pub fn diagnostic_tools(&self) -> DiagnosticTools {
        DiagnosticTools {
            fpgainfo: self.tools.fpgainfo.clone(),
            ethtool: self.tools.ethtool.clone(),
            lspci: self.tools.lspci.clone(),
        }
    }
}
