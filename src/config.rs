use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    bcr::{self, device::SessionConfig, DeviceHandle},
    midi::PortPair,
};

const APP_DIR: &str = "bcr-master";
const FILE_NAME: &str = "config.toml";

/// The device found by the last auto-detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDevice {
    pub input: String,
    pub output: String,
    pub device_id: u8,
}

impl SavedDevice {
    pub fn to_handle(&self) -> DeviceHandle {
        DeviceHandle::new(
            PortPair::new(self.input.as_str(), self.output.as_str()),
            self.device_id,
        )
    }
}

impl From<&DeviceHandle> for SavedDevice {
    fn from(handle: &DeviceHandle) -> Self {
        Self {
            input: handle.ports.input.to_string(),
            output: handle.ports.output.to_string(),
            device_id: handle.device_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client_name: String,
    pub identity_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub dump_timeout_ms: u64,
    pub max_in_flight: usize,
    pub device: Option<SavedDevice>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_name: "BCR Master".to_string(),
            identity_timeout_ms: 1000,
            reply_timeout_ms: 2000,
            dump_timeout_ms: 3000,
            max_in_flight: 1,
            device: None,
        }
    }
}

impl Settings {
    const TIMEOUT_RANGE_MS: (u64, u64) = (100, 60_000);
    const MAX_IN_FLIGHT: usize = 64;

    /// Brings back out of range values into range.
    pub fn validate(&mut self) {
        let (min, max) = Self::TIMEOUT_RANGE_MS;
        for (name, timeout) in [
            ("identity_timeout_ms", &mut self.identity_timeout_ms),
            ("reply_timeout_ms", &mut self.reply_timeout_ms),
            ("dump_timeout_ms", &mut self.dump_timeout_ms),
        ] {
            let clamped = (*timeout).clamp(min, max);
            if clamped != *timeout {
                log::warn!("{name} {} out of range, using {clamped}", *timeout);
                *timeout = clamped;
            }
        }

        let clamped = self.max_in_flight.clamp(1, Self::MAX_IN_FLIGHT);
        if clamped != self.max_in_flight {
            log::warn!("max_in_flight {} out of range, using {clamped}", self.max_in_flight);
            self.max_in_flight = clamped;
        }

        if self.client_name.trim().is_empty() {
            self.client_name = Settings::default().client_name;
        }

        if let Some(device) = &mut self.device {
            if !bcr::is_valid_device_id(device.device_id) {
                log::warn!("device_id {} out of range, using any device", device.device_id);
                device.device_id = bcr::ANY_DEVICE;
            }
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            identity_timeout: Duration::from_millis(self.identity_timeout_ms),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            dump_timeout: Duration::from_millis(self.dump_timeout_ms),
            max_in_flight: self.max_in_flight,
        }
    }
}

pub struct Loader {
    path: PathBuf,
}

impl Loader {
    /// Uses the platform configuration directory.
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join(APP_DIR);

        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        Ok(Self {
            path: dir.join(FILE_NAME),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_create(&self) -> Result<Settings> {
        if !self.path.exists() {
            let settings = Settings::default();
            self.save(&settings)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(&self.path).context("Failed to read config file")?;

        let mut settings: Settings = match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                let backup = self.path.with_extension("toml.backup");
                fs::write(&backup, &content).context("Failed to write config backup")?;

                log::error!(
                    "Config file corrupted: {err}. Backup saved to {}. Using defaults.",
                    backup.display(),
                );

                let settings = Settings::default();
                self.save(&settings)?;
                return Ok(settings);
            }
        };

        settings.validate();

        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let content = toml::to_string_pretty(settings).context("Failed to serialize config")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config file {}", self.path.display()))?;

        log::debug!("Saved settings to {}", self.path.display());

        Ok(())
    }
}
