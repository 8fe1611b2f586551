//! Where the update package is staged and which tools drive it

use std::path::{Path, PathBuf};

/// Paths inside the staging directory
///
/// ```text
/// <root>/nvmupdate.tar.gz
/// <root>/update.xml
/// <root>/800Series/Linux_x64/nvmupdate64e
/// <root>/800Series/Linux_x64/nvmupdate.cfg
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    pub const DEFAULT_ROOT: &'static str = "/nicflash-workdir/nvmupdate";
    const PACKAGE_FILE: &'static str = "nvmupdate.tar.gz";
    const RESULT_FILE: &'static str = "update.xml";
    const TOOL_DIR: &'static str = "800Series/Linux_x64";
    const CONFIG_FILE: &'static str = "nvmupdate.cfg";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded package
    #[must_use]
    pub fn package(&self) -> PathBuf {
        self.root.join(Self::PACKAGE_FILE)
    }

    /// Result file the tool writes after an update pass
    #[must_use]
    pub fn result_file(&self) -> PathBuf {
        self.root.join(Self::RESULT_FILE)
    }

    /// Directory the tool runs in
    #[must_use]
    pub fn tool_dir(&self) -> PathBuf {
        self.root.join(Self::TOOL_DIR)
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.tool_dir().join(Self::CONFIG_FILE)
    }

    /// Location of the extracted tool binary
    #[must_use]
    pub fn tool_binary(&self, tools: &UpdateTools) -> PathBuf {
        let dir = self.tool_dir();
        match Path::new(&tools.nvmupdate).file_name() {
            Some(name) => dir.join(name),
            None => dir.join(&tools.nvmupdate),
        }
    }
}

impl Default for StagingLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

/// Commands used by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTools {
    /// NVM update tool, relative to the tool directory
    pub nvmupdate: String,
    /// Card power-cycle tool
    pub rsu: String,
    /// Archive extractor
    pub tar: String,
}

impl Default for UpdateTools {
    fn default() -> Self {
        Self {
            nvmupdate: "./nvmupdate64e".to_string(),
            rsu: "rsu".to_string(),
            tar: "tar".to_string(),
        }
    }
}
