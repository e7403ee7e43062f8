//! Sensor module for ANT+ device communication.

pub mod ant;
pub mod types;

pub use types::{
    BatteryStatus, DeviceIdentity, DeviceInfo, RecordingFlag, RecordingStatus, SensorKind,
    SensorReading,
};
