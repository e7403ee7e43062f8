//! ANT+ Heart Rate Profile
//!
//! Device Type: 120. Every page carries the computed heart rate in byte 7;
//! the low 7 bits of byte 0 select the background page and the top bit is
//! the page-change toggle.

use super::{apply_battery, manufacturer_name, PAGE_LEN};
use crate::sensors::types::SensorReading;
use std::time::Instant;

pub const PAGE_MANUFACTURER: u8 = 2;
pub const PAGE_PRODUCT: u8 = 3;
pub const PAGE_BATTERY: u8 = 7;

/// Fields common to every heart rate page
#[derive(Debug, Clone)]
pub struct HeartRateData {
    /// Page number (0-127)
    pub page_number: u8,
    /// Whether page change toggle bit is set
    pub page_change_toggle: bool,
    /// Heart beat event time (1/1024 second resolution)
    pub beat_time: u16,
    /// Heart beat count (wraps at 255)
    pub beat_count: u8,
    /// Computed heart rate in BPM
    pub heart_rate: u8,
}

impl HeartRateData {
    /// Parse any heart rate page
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN {
            return None;
        }

        let page_byte = data[0];
        Some(Self {
            page_number: page_byte & 0x7F,
            page_change_toggle: (page_byte & 0x80) != 0,
            beat_time: u16::from_le_bytes([data[4], data[5]]),
            beat_count: data[6],
            heart_rate: data[7],
        })
    }
}

/// Heart rate monitor decode state.
///
/// Monitors using the legacy format never flip the toggle bit and fill
/// bytes 0-3 with vendor data, so background pages are only trusted once
/// the toggle has been seen to change.
#[derive(Debug, Clone, Default)]
pub struct HeartRateState {
    last_toggle: Option<bool>,
    toggle_seen: bool,
}

impl HeartRateState {
    /// Whether this monitor has proven it sends paged data.
    pub fn pages_enabled(&self) -> bool {
        self.toggle_seen
    }

    pub fn decode(&mut self, data: &[u8], reading: &mut SensorReading, now: Instant) {
        let Some(page) = HeartRateData::parse(data) else {
            return;
        };

        if let Some(last) = self.last_toggle {
            if last != page.page_change_toggle {
                self.toggle_seen = true;
            }
        }
        self.last_toggle = Some(page.page_change_toggle);

        reading.heart_rate = Some(page.heart_rate);
        reading.timestamp = Some(now);
        reading.last_data_at = Some(now);

        if !self.toggle_seen {
            return;
        }

        let info = &mut reading.info;
        match page.page_number {
            PAGE_MANUFACTURER => {
                let id = data[1] as u16;
                info.manufacturer_id = Some(id);
                info.manufacturer_name = manufacturer_name(id);
                info.serial_number = Some(u16::from_le_bytes([data[2], data[3]]) as u32);
            }
            PAGE_PRODUCT => {
                info.hardware_version = Some(data[1]);
                info.software_version = Some(data[2] as f64);
                info.model_number = Some(data[3] as u16);
            }
            PAGE_BATTERY => apply_battery([data[2], data[3]], info),
            _ => {}
        }
    }
}
