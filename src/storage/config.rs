//! Application configuration and the persisted ANT+ pairing table.

use crate::sensors::ant::accumulator::StallPolicy;
use crate::sensors::ant::MessageRate;
use crate::sensors::types::{DeviceIdentity, SensorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// ANT+ settings
    #[serde(default)]
    pub ant: AntSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            ant: AntSettings::default(),
        }
    }
}

/// ANT+ settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntSettings {
    /// Use the ANT+ radio at all
    pub enabled: bool,
    /// Generate simulated readings when no radio is available
    pub dummy_output: bool,
    /// Message rate of paired-device channels
    pub message_rate: MessageRate,
    /// Wheel circumference in millimetres
    pub wheel_circumference_mm: u32,
    /// Idle seconds after which a rate is considered stalled
    pub stall_cutoff_secs: u64,
    /// Report stalled rates as zero
    pub zero_on_stall: bool,
    /// Radio settle delay for scan, search and quiesce
    pub settle_delay_ms: u64,
    /// Integration step of simulated readings
    pub sensor_interval_secs: f64,
    /// Paired devices per sensor kind
    pub pairing: PairingTable,
}

impl Default for AntSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dummy_output: false,
            message_rate: MessageRate::default(),
            wheel_circumference_mm: 2105,
            stall_cutoff_secs: 60,
            zero_on_stall: false,
            settle_delay_ms: 500,
            sensor_interval_secs: 1.0,
            pairing: PairingTable::default(),
        }
    }
}

impl AntSettings {
    /// Wheel circumference in meters.
    pub fn wheel_circumference(&self) -> f64 {
        self.wheel_circumference_mm as f64 / 1000.0
    }

    pub fn stall_policy(&self) -> StallPolicy {
        StallPolicy {
            cutoff: Duration::from_secs(self.stall_cutoff_secs),
            zero_on_stall: self.zero_on_stall,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn sensor_interval(&self) -> f64 {
        if self.sensor_interval_secs.is_finite() && self.sensor_interval_secs > 0.0 {
            self.sensor_interval_secs
        } else {
            1.0
        }
    }
}

/// One pairing slot: `use` flag and the bound device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPairingEntry", into = "RawPairingEntry")]
pub struct PairingEntry {
    /// Connect this slot at start-up and keep it connected
    pub in_use: bool,
    pub id: u16,
    pub device_type: u8,
}

impl PairingEntry {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.id, self.device_type)
    }

    pub fn is_cleared(&self) -> bool {
        *self == PairingEntry::default()
    }
}

/// On-disk form of a pairing slot. Values are read wide so that
/// out-of-range ids and types can be cleared instead of failing the load.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct RawPairingEntry {
    #[serde(rename = "use", default)]
    in_use: bool,
    #[serde(default)]
    id: i64,
    #[serde(rename = "type", default)]
    device_type: i64,
}

impl From<RawPairingEntry> for PairingEntry {
    fn from(raw: RawPairingEntry) -> Self {
        match (u16::try_from(raw.id), u8::try_from(raw.device_type)) {
            (Ok(id), Ok(device_type)) => PairingEntry {
                in_use: raw.in_use,
                id,
                device_type,
            },
            _ => {
                tracing::warn!(
                    "Pairing entry id {} type {} out of range, cleared",
                    raw.id,
                    raw.device_type
                );
                PairingEntry::default()
            }
        }
    }
}

impl From<PairingEntry> for RawPairingEntry {
    fn from(entry: PairingEntry) -> Self {
        RawPairingEntry {
            in_use: entry.in_use,
            id: entry.id as i64,
            device_type: entry.device_type as i64,
        }
    }
}

/// Pairing slots for every sensor kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingTable {
    pub heart_rate: PairingEntry,
    pub speed: PairingEntry,
    pub cadence: PairingEntry,
    pub speed_cadence: PairingEntry,
    pub power: PairingEntry,
    pub light: PairingEntry,
    pub control: PairingEntry,
}

/// Pairing table shared between the manager and the configuration layer.
pub type SharedPairing = Arc<RwLock<PairingTable>>;

impl PairingTable {
    pub fn entry(&self, kind: SensorKind) -> &PairingEntry {
        match kind {
            SensorKind::HeartRate => &self.heart_rate,
            SensorKind::Speed => &self.speed,
            SensorKind::Cadence => &self.cadence,
            SensorKind::SpeedCadence => &self.speed_cadence,
            SensorKind::Power => &self.power,
            SensorKind::Light => &self.light,
            SensorKind::Control => &self.control,
        }
    }

    pub fn entry_mut(&mut self, kind: SensorKind) -> &mut PairingEntry {
        match kind {
            SensorKind::HeartRate => &mut self.heart_rate,
            SensorKind::Speed => &mut self.speed,
            SensorKind::Cadence => &mut self.cadence,
            SensorKind::SpeedCadence => &mut self.speed_cadence,
            SensorKind::Power => &mut self.power,
            SensorKind::Light => &mut self.light,
            SensorKind::Control => &mut self.control,
        }
    }

    pub fn in_use(&self, kind: SensorKind) -> bool {
        self.entry(kind).in_use
    }

    pub fn set_use(&mut self, kind: SensorKind, in_use: bool) {
        self.entry_mut(kind).in_use = in_use;
    }

    /// Device bound to `kind`, if any.
    pub fn bound_identity(&self, kind: SensorKind) -> Option<DeviceIdentity> {
        let entry = self.entry(kind);
        (entry.device_type != 0).then(|| entry.identity())
    }

    /// Bind `kind` to `identity` without touching the `use` flag.
    pub fn bind(&mut self, kind: SensorKind, identity: DeviceIdentity) {
        let entry = self.entry_mut(kind);
        entry.id = identity.id;
        entry.device_type = identity.device_type;
    }

    pub fn clear(&mut self, kind: SensorKind) {
        *self.entry_mut(kind) = PairingEntry::default();
    }

    pub fn clear_all(&mut self) {
        for kind in SensorKind::ALL {
            self.clear(kind);
        }
    }

    /// Kinds currently bound to `identity` with `use` set.
    pub fn kinds_using(&self, identity: DeviceIdentity) -> Vec<SensorKind> {
        SensorKind::ALL
            .into_iter()
            .filter(|kind| self.in_use(*kind) && self.bound_identity(*kind) == Some(identity))
            .collect()
    }

    /// Clear every entry whose device type is not accepted for its kind.
    /// Returns the kinds that were cleared.
    pub fn sanitize(&mut self) -> Vec<SensorKind> {
        let mut cleared = Vec::new();
        for kind in SensorKind::ALL {
            let entry = *self.entry(kind);
            if !entry.is_cleared() && !kind.accepts(entry.device_type) {
                tracing::warn!(
                    "Pairing for {} has type 0x{:02X}, cleared",
                    kind,
                    entry.device_type
                );
                self.clear(kind);
                cleared.push(kind);
            }
        }
        cleared
    }

    pub fn into_shared(self) -> SharedPairing {
        Arc::new(RwLock::new(self))
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "antride", "AntRide")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    config.data_dir = get_data_dir();
    Ok(config)
}

/// Load application configuration from `path`. A missing file yields
/// defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let data_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if !path.exists() {
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.ant.pairing.sanitize();
    config.data_dir = data_dir;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
