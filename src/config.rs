// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving station settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::link::link_constants::{PRODUCT_ID, VENDOR_ID};
use crate::link::{BlockSizing, FobByteOrder, RelayControl};

const APP_DIR: &str = "lock-provisioner";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the device database.
    #[serde(skip)]
    pub data_dir: PathBuf,

    pub link: LinkConfig,

    pub cloud: CloudConfig,

    pub workflow: WorkflowConfig,

    pub relay: RelayConfig,
}

/// Wired link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub vendor_id: u16,
    pub product_id: u16,

    /// Presence polling interval in milliseconds.
    pub presence_poll_ms: u64,

    /// How long one blocking report read may wait.
    pub read_poll_ms: u64,

    /// Upper bound on a single device exchange.
    pub exchange_timeout_ms: u64,

    /// Reject frames whose checksum does not match.
    pub strict_checksum: bool,

    pub block_sizing: BlockSizing,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            presence_poll_ms: 100,
            read_poll_ms: 50,
            exchange_timeout_ms: 10_000,
            strict_checksum: false,
            block_sizing: BlockSizing::default(),
        }
    }
}

impl LinkConfig {
    pub fn presence_poll(&self) -> Duration {
        Duration::from_millis(self.presence_poll_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

/// Cloud service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_ms: u64,
    pub request_command_path: String,
    pub forward_response_path: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.rentlyopensesame.com/oakslock".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_ms: 15_000,
            request_command_path: "/device/requestServerCommand".to_string(),
            forward_response_path: "/device/forwardResponseToServer".to_string(),
        }
    }
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Provisioning step settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub fob_byte_order: FobByteOrder,

    /// Fixed UTC offset for the lock clock; system local time when unset.
    pub rtc_utc_offset_minutes: Option<i32>,
}

/// BLE relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub workflow: String,
    pub lock_type: String,
    pub model_num: u32,
    pub hardware_ver: u32,
    pub firmware_ver: u32,
    pub timezone: String,

    /// Reported when the device info 2 test did not measure it.
    pub default_battery: u8,

    pub add_session_key_control: u8,
    pub init_control: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let control = RelayControl::default();
        Self {
            workflow: "init".to_string(),
            lock_type: "V3Lock".to_string(),
            model_num: 3,
            hardware_ver: 1,
            firmware_ver: 1,
            timezone: "Pacific Time (US & Canada)".to_string(),
            default_battery: 100,
            add_session_key_control: control.add_session_key,
            init_control: control.init,
        }
    }
}

impl RelayConfig {
    pub fn control(&self) -> RelayControl {
        RelayControl {
            add_session_key: self.add_session_key_control,
            init: self.init_control,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR),
            link: LinkConfig::default(),
            cloud: CloudConfig::default(),
            workflow: WorkflowConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;

        config.data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Load from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            return Ok(toml::from_str(&content)?);
        }

        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_written_and_reloaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.link.presence_poll_ms, 100);
        assert_eq!(reloaded.link.block_sizing, created.link.block_sizing);
        assert_eq!(reloaded.cloud.base_url, created.cloud.base_url);
        assert_eq!(reloaded.relay.control(), RelayControl::default());
        assert_eq!(reloaded.workflow.rtc_utc_offset_minutes, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[link]\nstrict_checksum = true\nblock_sizing = \"legacy\"\n\n[workflow]\nfob_byte_order = \"big\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.link.strict_checksum);
        assert_eq!(config.link.block_sizing, BlockSizing::Legacy);
        assert_eq!(config.link.exchange_timeout(), Duration::from_secs(10));
        assert_eq!(config.workflow.fob_byte_order, FobByteOrder::Big);
        assert_eq!(config.relay.lock_type, "V3Lock");
    }
}
