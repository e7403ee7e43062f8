//! ANT+ Protocol Support
//!
//! Decoding of ANT+ broadcast pages and management of the radio channels
//! that carry them. The radio driver itself is an external capability, see
//! [`backend`].

pub mod accumulator;
pub mod backend;
pub mod device;
pub mod manager;
pub mod mock;
pub mod profiles;
pub mod scanner;
pub mod searcher;
pub mod simulated;

use crate::sensors::types::{DeviceIdentity, SensorKind};
use crossbeam::channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

// Re-export main types
pub use backend::{probe, AntChannel, AntNode, ChannelStatus, ChannelType, RadioBackend, WaitMode};
pub use device::AntDevice;
pub use manager::AntSensorManager;
pub use mock::MockNode;
pub use scanner::{BackgroundDeviceMap, BackgroundReading, Scanner};
pub use searcher::{SearchHit, SearchResult, Searcher};

/// ANT+ managed network key
pub const NETWORK_KEY: [u8; 8] = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];

/// Network number the key is loaded into
pub const NETWORK_NUMBER: u8 = 0x00;

/// ANT+ RF channel (2457 MHz)
pub const RF_FREQUENCY: u8 = 57;

/// Search timeout for paired-device channels (infinite)
pub const DEVICE_SEARCH_TIMEOUT: u8 = 0xFF;

/// Library config flag enabling channel id in extended messages
pub const LIB_CONFIG_CHANNEL_ID: u8 = 0x80;

pub const DEVICE_TYPE_HEART_RATE: u8 = 0x78;
pub const DEVICE_TYPE_BIKE_SPEED_CADENCE: u8 = 0x79;
pub const DEVICE_TYPE_BIKE_CADENCE: u8 = 0x7A;
pub const DEVICE_TYPE_BIKE_SPEED: u8 = 0x7B;
pub const DEVICE_TYPE_BIKE_POWER: u8 = 0x0B;
pub const DEVICE_TYPE_LIGHT: u8 = 0x23;
pub const DEVICE_TYPE_CONTROL: u8 = 0x10;

/// Length of a broadcast payload carrying the extended channel id
pub const EXTENDED_MESSAGE_LEN: usize = 13;

/// Errors that can occur during ANT+ operations
#[derive(Debug, Error)]
pub enum AntError {
    #[error("ANT+ backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Channel {operation} failed: {reason}")]
    ChannelOperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Channel allocation failed: {0}")]
    ChannelAllocationFailed(String),

    #[error("Device type 0x{device_type:02X} cannot be paired as {kind}")]
    UnsupportedDeviceType { kind: SensorKind, device_type: u8 },

    #[error("No device paired as {0}")]
    NotPaired(SensorKind),
}

impl AntError {
    pub fn channel(operation: &'static str, reason: impl Into<String>) -> Self {
        AntError::ChannelOperationFailed {
            operation,
            reason: reason.into(),
        }
    }
}

/// Global message-rate selector (4 Hz, 2 Hz or 1 Hz)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageRate {
    #[serde(rename = "4hz")]
    Hz4,
    #[serde(rename = "2hz")]
    Hz2,
    #[default]
    #[serde(rename = "1hz")]
    Hz1,
}

impl MessageRate {
    fn index(&self) -> usize {
        match self {
            MessageRate::Hz4 => 0,
            MessageRate::Hz2 => 1,
            MessageRate::Hz1 => 2,
        }
    }
}

/// Channel period (in 32768 Hz ticks) for a device type at the given rate.
pub fn channel_period(device_type: u8, rate: MessageRate) -> u16 {
    let table: [u16; 3] = match device_type {
        DEVICE_TYPE_HEART_RATE => [8070, 16140, 32280],
        DEVICE_TYPE_BIKE_SPEED_CADENCE => [8086, 16172, 32344],
        DEVICE_TYPE_BIKE_CADENCE => [8102, 16204, 32408],
        DEVICE_TYPE_BIKE_SPEED => [8118, 16236, 32472],
        DEVICE_TYPE_BIKE_POWER => [8182, 16364, 32728],
        _ => [8192, 16384, 32768],
    };
    table[rate.index()]
}

/// Human readable name of a device type code.
pub fn device_type_name(device_type: u8) -> &'static str {
    match device_type {
        DEVICE_TYPE_HEART_RATE => "HeartRate",
        DEVICE_TYPE_BIKE_SPEED_CADENCE => "Speed and Cadence",
        DEVICE_TYPE_BIKE_CADENCE => "Cadence",
        DEVICE_TYPE_BIKE_SPEED => "Speed",
        DEVICE_TYPE_BIKE_POWER => "Power",
        DEVICE_TYPE_LIGHT => "Light",
        DEVICE_TYPE_CONTROL => "Control",
        _ => "Unknown",
    }
}

/// Extract the transmitting device from an extended broadcast message.
///
/// Bytes 9-10 hold the device number and byte 11 the device type, whose
/// top bit is the pairing flag.
pub fn extended_channel_id(data: &[u8]) -> Option<DeviceIdentity> {
    if data.len() != EXTENDED_MESSAGE_LEN {
        return None;
    }
    Some(DeviceIdentity::new(
        u16::from_le_bytes([data[9], data[10]]),
        data[11] & 0x7F,
    ))
}

/// Events from the ANT+ subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum AntEvent {
    /// Backend resolved at start-up
    BackendSelected { simulated: bool },
    /// A kind was bound to a device
    DevicePaired {
        kind: SensorKind,
        identity: DeviceIdentity,
    },
    /// A kind was unbound
    DeviceUnpaired {
        kind: SensorKind,
        identity: DeviceIdentity,
    },
    /// A device channel was opened
    ChannelOpened { identity: DeviceIdentity },
    /// A device channel was closed
    ChannelClosed { identity: DeviceIdentity },
    /// Background scan started
    ScanStarted,
    /// Background scan stopped
    ScanStopped,
    /// Pairing search started
    SearchStarted { kind: SensorKind },
    /// Pairing search stopped
    SearchStopped,
    /// A search saw a device of the requested kind for the first time
    DeviceFound {
        identity: DeviceIdentity,
        already_paired: bool,
    },
}

/// Shared sender half of the event stream.
///
/// Cloned into devices and the searcher so callbacks can report events;
/// events are dropped until a receiver is attached.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Arc<RwLock<Option<Sender<AntEvent>>>>);

impl EventSink {
    /// Replace the receiver. Earlier receivers stop getting events.
    pub fn attach(&self) -> Receiver<AntEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(tx);
        }
        rx
    }

    /// Send an event if the channel is available.
    pub fn send(&self, event: AntEvent) {
        if let Ok(slot) = self.0.read() {
            if let Some(tx) = slot.as_ref() {
                let _ = tx.send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sink() {
        let sink = EventSink::default();
        sink.send(AntEvent::ScanStarted);

        let rx = sink.attach();
        sink.clone().send(AntEvent::ScanStopped);
        assert_eq!(rx.try_recv().unwrap(), AntEvent::ScanStopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_period_table() {
        assert_eq!(channel_period(DEVICE_TYPE_HEART_RATE, MessageRate::Hz4), 8070);
        assert_eq!(channel_period(DEVICE_TYPE_BIKE_POWER, MessageRate::Hz2), 16364);
        assert_eq!(channel_period(DEVICE_TYPE_BIKE_SPEED, MessageRate::Hz1), 32472);
    }

    #[test]
    fn test_extended_channel_id() {
        let data = [0x10, 0, 0, 0, 0, 0, 0, 0, 0x80, 0x57, 0x04, 0x0B, 0x01];
        let identity = extended_channel_id(&data).unwrap();
        assert_eq!(identity, DeviceIdentity::new(1111, 0x0B));

        // pairing bit is masked off
        let data = [0x10, 0, 0, 0, 0, 0, 0, 0, 0x80, 0x57, 0x04, 0x8B, 0x01];
        assert_eq!(extended_channel_id(&data).unwrap().device_type, 0x0B);

        assert!(extended_channel_id(&data[..8]).is_none());
    }

    #[test]
    fn test_message_rate_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            rate: MessageRate,
        }
        let parsed: Wrapper = toml::from_str("rate = \"4hz\"").unwrap();
        assert_eq!(parsed.rate, MessageRate::Hz4);
    }
}
