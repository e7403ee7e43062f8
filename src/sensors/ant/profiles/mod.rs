//! ANT+ Device Profiles
//!
//! Page decoders for each supported device profile, plus the common pages
//! (80, 81, 82) any profile may interleave with its main data pages.

pub mod hr;
pub mod manufacturers;
pub mod power;
pub mod speed_cadence;

use super::accumulator::{DecodeContext, MalformedSample};
use super::{
    DEVICE_TYPE_BIKE_CADENCE, DEVICE_TYPE_BIKE_POWER, DEVICE_TYPE_BIKE_SPEED,
    DEVICE_TYPE_BIKE_SPEED_CADENCE, DEVICE_TYPE_HEART_RATE,
};
use crate::sensors::types::{BatteryStatus, DeviceInfo, SensorReading};
use std::time::Instant;

pub use hr::HeartRateState;
pub use manufacturers::manufacturer_name;
pub use power::PowerState;
pub use speed_cadence::{EventCounterState, SpeedCadenceState};

/// Length of an ANT+ data page
pub const PAGE_LEN: usize = 8;

pub const PAGE_MANUFACTURER_INFO: u8 = 0x50;
pub const PAGE_PRODUCT_INFO: u8 = 0x51;
pub const PAGE_BATTERY_STATUS: u8 = 0x52;

/// Common trait for ANT+ profile data pages
pub trait AntProfilePage: Sized {
    /// Get the page number
    fn page_number(&self) -> u8;

    /// Parse raw data into this page type
    fn parse(data: &[u8]) -> Option<Self>;
}

/// Common manufacturer information page (Page 80)
#[derive(Debug, Clone)]
pub struct ManufacturerInfo {
    pub hw_revision: u8,
    pub manufacturer_id: u16,
    pub model_number: u16,
}

impl AntProfilePage for ManufacturerInfo {
    fn page_number(&self) -> u8 {
        PAGE_MANUFACTURER_INFO
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_MANUFACTURER_INFO {
            return None;
        }

        Some(Self {
            hw_revision: data[3],
            manufacturer_id: u16::from_le_bytes([data[4], data[5]]),
            model_number: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

impl ManufacturerInfo {
    pub fn apply(&self, info: &mut DeviceInfo) {
        info.hardware_version = Some(self.hw_revision);
        info.manufacturer_id = Some(self.manufacturer_id);
        info.model_number = Some(self.model_number);
        if let Some(name) = manufacturer_name(self.manufacturer_id) {
            info.manufacturer_name = Some(name);
        }
    }
}

/// Product information page (Page 81)
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub sw_revision_supplemental: u8,
    pub sw_revision_main: u8,
    pub serial_number: u32,
}

impl AntProfilePage for ProductInfo {
    fn page_number(&self) -> u8 {
        PAGE_PRODUCT_INFO
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_PRODUCT_INFO {
            return None;
        }

        Some(Self {
            sw_revision_supplemental: data[2],
            sw_revision_main: data[3],
            serial_number: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

impl ProductInfo {
    /// Software version. A supplemental byte of 0xFF means only the main
    /// revision (in tenths) is known.
    pub fn software_version(&self) -> f64 {
        if self.sw_revision_supplemental != 0xFF {
            (self.sw_revision_main as f64 * 100.0 + self.sw_revision_supplemental as f64) / 1000.0
        } else {
            self.sw_revision_main as f64 / 10.0
        }
    }

    pub fn apply(&self, info: &mut DeviceInfo) {
        info.software_version = Some(self.software_version());
        info.serial_number = Some(self.serial_number);
    }
}

/// Battery status page (Page 82)
#[derive(Debug, Clone)]
pub struct BatteryPage {
    pub operating_time: u32, // in 2-second units
    pub battery_voltage: f64,
    pub battery_status: BatteryStatus,
}

impl AntProfilePage for BatteryPage {
    fn page_number(&self) -> u8 {
        PAGE_BATTERY_STATUS
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_BATTERY_STATUS {
            return None;
        }

        let operating_time = u32::from_le_bytes([data[3], data[4], data[5], 0]) & 0x00FFFFFF;
        let (battery_status, battery_voltage) = decode_battery([data[6], data[7]]);

        Some(Self {
            operating_time,
            battery_voltage,
            battery_status,
        })
    }
}

/// Decode the 2-byte battery field: fractional voltage, then a byte holding
/// the status in bits 4-6 and the coarse voltage in bits 0-3.
pub fn decode_battery(bytes: [u8; 2]) -> (BatteryStatus, f64) {
    let [fractional, descriptive] = bytes;
    let status = BatteryStatus::from_bits(descriptive >> 4);
    let voltage = (descriptive & 0x0F) as f64 + fractional as f64 / 256.0;
    (status, (voltage * 100.0).round() / 100.0)
}

/// Apply the 2-byte battery field to `info`.
pub fn apply_battery(bytes: [u8; 2], info: &mut DeviceInfo) {
    let (status, voltage) = decode_battery(bytes);
    info.battery_status = Some(status);
    info.battery_voltage = Some(voltage);
}

/// Count and log a discarded sample. The reading keeps its previous value.
pub fn reject(reading: &mut SensorReading, sample: MalformedSample) {
    reading.rejected_samples = reading.rejected_samples.saturating_add(1);
    tracing::warn!("ANT+ {} sample discarded: {}", reading.identity, sample);
}

/// Decode a common page into `info`. Returns false for other pages.
pub fn decode_common_page(data: &[u8], info: &mut DeviceInfo) -> bool {
    if data.len() < PAGE_LEN {
        return false;
    }
    match data[0] {
        PAGE_MANUFACTURER_INFO => ManufacturerInfo::parse(data).map(|p| p.apply(info)).is_some(),
        PAGE_PRODUCT_INFO => ProductInfo::parse(data).map(|p| p.apply(info)).is_some(),
        PAGE_BATTERY_STATUS => {
            apply_battery([data[6], data[7]], info);
            true
        }
        _ => false,
    }
}

/// Decode state of one device, selected by its device type.
#[derive(Debug, Clone)]
pub enum Profile {
    HeartRate(HeartRateState),
    SpeedCadence(SpeedCadenceState),
    Cadence(EventCounterState),
    Speed(EventCounterState),
    Power(PowerState),
    /// Lights, remotes and other devices: common pages only
    Generic,
}

impl Profile {
    pub fn for_device_type(device_type: u8) -> Self {
        match device_type {
            DEVICE_TYPE_HEART_RATE => Profile::HeartRate(HeartRateState::default()),
            DEVICE_TYPE_BIKE_SPEED_CADENCE => Profile::SpeedCadence(SpeedCadenceState::default()),
            DEVICE_TYPE_BIKE_CADENCE => Profile::Cadence(EventCounterState::cadence()),
            DEVICE_TYPE_BIKE_SPEED => Profile::Speed(EventCounterState::speed()),
            DEVICE_TYPE_BIKE_POWER => Profile::Power(PowerState::default()),
            _ => Profile::Generic,
        }
    }

    /// Decode one payload into `reading`. Short payloads and unknown pages
    /// leave the reading untouched.
    pub fn decode(
        &mut self,
        data: &[u8],
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        if data.len() < PAGE_LEN {
            tracing::trace!("ANT+ {} short payload ({} bytes)", reading.identity, data.len());
            return;
        }
        match self {
            Profile::HeartRate(state) => state.decode(data, reading, now),
            Profile::SpeedCadence(state) => state.decode(data, reading, ctx, now),
            Profile::Cadence(state) | Profile::Speed(state) => {
                state.decode(data, reading, ctx, now)
            }
            Profile::Power(state) => state.decode(data, reading, ctx, now),
            Profile::Generic => {
                if decode_common_page(data, &mut reading.info) {
                    reading.timestamp = Some(now);
                }
                reading.last_data_at = Some(now);
            }
        }
    }

    /// Forget all rolling counters.
    pub fn reset(&mut self) {
        match self {
            Profile::HeartRate(state) => *state = HeartRateState::default(),
            Profile::SpeedCadence(state) => state.reset(),
            Profile::Cadence(state) | Profile::Speed(state) => state.reset(),
            Profile::Power(state) => state.reset(),
            Profile::Generic => {}
        }
    }
}
