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
//! Handles loading and saving application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::nxt_constants::{limits, RFCOMM_CHANNEL};
use crate::bluetooth::SteeringMode;
use crate::driver::DriverOptions;

const APP_DIR: &str = "nxt-bridge";
const DEFAULT_PROGRAM: &str = "SteeringControl.rxe";

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Driver settings.
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Brick address, e.g. "00:16:53:0A:0B:0C". A command line argument
    /// takes precedence.
    pub address: Option<String>,

    /// RFCOMM channel of the brick's serial port.
    pub channel: u8,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            address: None,
            channel: RFCOMM_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Delay between sensor polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Largest plausible reply frame.
    pub max_frame_len: usize,

    /// Name of the steering program on the brick.
    pub program_name: String,

    /// Local copy of the program, uploaded when the brick lacks it.
    pub firmware_path: PathBuf,

    /// Vehicle layout.
    pub steering: SteeringMode,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            max_frame_len: limits::DEFAULT_MAX_FRAME_LEN,
            program_name: DEFAULT_PROGRAM.to_string(),
            firmware_path: data_dir().join(DEFAULT_PROGRAM),
            steering: SteeringMode::default(),
        }
    }
}

impl DriverConfig {
    pub fn options(&self) -> DriverOptions {
        DriverOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_frame_len: self.max_frame_len,
            steering: self.steering,
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = config_dir();
        std::fs::create_dir_all(&config_dir)?;
        std::fs::create_dir_all(data_dir())?;
        Self::load_from(&config_dir.join("config.toml"))
    }

    /// Load configuration from `path`, writing defaults there when the file
    /// does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            return Ok(config);
        }

        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
