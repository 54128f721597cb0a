//! # Saved Connection Settings
//!
//! Remembers the last Bluetooth address and network host/port between runs.
//! The application loads them at start-up and saves as soon as a run
//! reaches `Connected`; the session controller never touches them.
//!
//! Values are stored as a flat JSON object under fixed keys:
//!
//! ```json
//! {
//!   "ZEBRA_DEMO_BLUETOOTH_ADDRESS": "AC:3F:A4:F0:94:3B",
//!   "ZEBRA_DEMO_TCP_ADDRESS": "10.0.0.5",
//!   "ZEBRA_DEMO_TCP_PORT": "9100"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProbeError;
use crate::session::ConnectionConfig;

/// Last-used connection values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSettings {
    #[serde(
        rename = "ZEBRA_DEMO_BLUETOOTH_ADDRESS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bluetooth_address: Option<String>,

    #[serde(
        rename = "ZEBRA_DEMO_TCP_ADDRESS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub network_host: Option<String>,

    #[serde(
        rename = "ZEBRA_DEMO_TCP_PORT",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub network_port: Option<String>,
}

impl SavedSettings {
    /// Record the values from `config`, leaving the other variant's alone.
    pub fn remember(&mut self, config: &ConnectionConfig) {
        match config {
            ConnectionConfig::Bluetooth { address } => {
                self.bluetooth_address = Some(address.clone());
            }
            ConnectionConfig::Network { host, port } => {
                self.network_host = Some(host.clone());
                self.network_port = Some(port.clone());
            }
        }
    }

    pub fn bluetooth_config(&self) -> Option<ConnectionConfig> {
        self.bluetooth_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(ConnectionConfig::bluetooth)
    }

    /// Saved network config; `default_port` fills in a missing port.
    pub fn network_config(&self, default_port: &str) -> Option<ConnectionConfig> {
        let host = self.network_host.as_deref().filter(|h| !h.is_empty())?;
        let port = self.network_port.as_deref().unwrap_or(default_port);
        Some(ConnectionConfig::network(host, port))
    }
}

/// Storage for [`SavedSettings`].
pub trait ConfigRepository {
    fn load(&self) -> Result<SavedSettings, ProbeError>;

    /// Merge `config` into the stored values.
    fn save(&self, config: &ConnectionConfig) -> Result<(), ProbeError>;
}

/// Settings kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.config/zebra-probe/settings.json`, or a file in the working
    /// directory when `HOME` is unset.
    pub fn default_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home)
                .join(".config")
                .join("zebra-probe")
                .join("settings.json"),
            None => PathBuf::from("zebra-probe-settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigRepository for JsonFileRepository {
    fn load(&self) -> Result<SavedSettings, ProbeError> {
        if !self.path.exists() {
            return Ok(SavedSettings::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| {
            ProbeError::Settings(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, config: &ConnectionConfig) -> Result<(), ProbeError> {
        let mut settings = self.load()?;
        settings.remember(config);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| ProbeError::Settings(format!("Failed to encode settings: {}", e)))?;

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "Saved connection settings");
        Ok(())
    }
}
