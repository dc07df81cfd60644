//! Standard paths used by Daedalos tools

use std::path::PathBuf;

/// Standard Daedalos paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/daedalos)
    pub data: PathBuf,
    /// Config directory (~/.config/daedalos)
    pub config: PathBuf,
    /// Runtime directory (/run/daedalos or ~/.local/share/daedalos)
    pub runtime: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("daedalos");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("daedalos");

        // Try /run/daedalos first (NixOS), fall back to data dir
        let runtime = if PathBuf::from("/run/daedalos").exists() {
            PathBuf::from("/run/daedalos")
        } else {
            data.clone()
        };

        Self {
            data,
            config,
            runtime,
        }
    }

    /// Build paths rooted under a single directory (tests, sandboxes)
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data: root.join("data"),
            config: root.join("config"),
            runtime: root.join("run"),
        }
    }

    /// Get socket path for a tool that listens for commands
    pub fn socket(&self, tool: &str) -> PathBuf {
        self.runtime.join(tool).join(format!("{}.sock", tool))
    }

    /// Get state (data) directory for a tool
    pub fn state(&self, tool: &str) -> PathBuf {
        self.data.join(tool)
    }

    /// Get a named config file for a tool
    pub fn config_file(&self, tool: &str, name: &str) -> PathBuf {
        self.config.join(tool).join(name)
    }
}
