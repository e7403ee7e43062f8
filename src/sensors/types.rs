//! Sensor kinds, device identities and live readings.

use crate::sensors::ant::{
    DEVICE_TYPE_BIKE_CADENCE, DEVICE_TYPE_BIKE_POWER, DEVICE_TYPE_BIKE_SPEED,
    DEVICE_TYPE_BIKE_SPEED_CADENCE, DEVICE_TYPE_CONTROL, DEVICE_TYPE_HEART_RATE,
    DEVICE_TYPE_LIGHT,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Kind of sensor a pairing slot is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Heart rate monitor
    HeartRate,
    /// Speed sensor (speed-only or combined)
    Speed,
    /// Cadence sensor (cadence-only, combined or power meter)
    Cadence,
    /// Combined speed and cadence sensor
    SpeedCadence,
    /// Power meter
    Power,
    /// Bike light
    Light,
    /// Remote control
    Control,
}

impl SensorKind {
    /// Every kind, in menu order.
    pub const ALL: [SensorKind; 7] = [
        SensorKind::HeartRate,
        SensorKind::Speed,
        SensorKind::Cadence,
        SensorKind::SpeedCadence,
        SensorKind::Power,
        SensorKind::Light,
        SensorKind::Control,
    ];

    /// Device-type codes that may be paired to this kind.
    pub fn accepted_types(&self) -> &'static [u8] {
        match self {
            SensorKind::HeartRate => &[DEVICE_TYPE_HEART_RATE],
            SensorKind::Speed => &[DEVICE_TYPE_BIKE_SPEED_CADENCE, DEVICE_TYPE_BIKE_SPEED],
            SensorKind::Cadence => &[
                DEVICE_TYPE_BIKE_SPEED_CADENCE,
                DEVICE_TYPE_BIKE_CADENCE,
                DEVICE_TYPE_BIKE_POWER,
            ],
            SensorKind::SpeedCadence => &[DEVICE_TYPE_BIKE_SPEED_CADENCE],
            SensorKind::Power => &[DEVICE_TYPE_BIKE_POWER],
            SensorKind::Light => &[DEVICE_TYPE_LIGHT],
            SensorKind::Control => &[DEVICE_TYPE_CONTROL],
        }
    }

    /// Whether `device_type` may be paired to this kind.
    pub fn accepts(&self, device_type: u8) -> bool {
        self.accepted_types().contains(&device_type)
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::HeartRate => write!(f, "HeartRate"),
            SensorKind::Speed => write!(f, "Speed"),
            SensorKind::Cadence => write!(f, "Cadence"),
            SensorKind::SpeedCadence => write!(f, "Speed and Cadence"),
            SensorKind::Power => write!(f, "Power"),
            SensorKind::Light => write!(f, "Light"),
            SensorKind::Control => write!(f, "Control"),
        }
    }
}

/// The (device id, device type) pair naming one physical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    /// ANT device number, 0 when unset
    pub id: u16,
    /// ANT+ device type code
    pub device_type: u8,
}

impl DeviceIdentity {
    pub fn new(id: u16, device_type: u8) -> Self {
        Self { id, device_type }
    }

    /// An id of zero is the wildcard/unset device number.
    pub fn is_unset(&self) -> bool {
        self.id == 0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05}:0x{:02X}", self.id, self.device_type)
    }
}

/// Ride recording state supplied by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingStatus {
    /// No ride started yet
    #[default]
    Init,
    /// Recording; accumulators advance
    Start,
    /// Paused or finished
    Stop,
}

impl RecordingStatus {
    fn to_u8(self) -> u8 {
        match self {
            RecordingStatus::Init => 0,
            RecordingStatus::Start => 1,
            RecordingStatus::Stop => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordingStatus::Start,
            2 => RecordingStatus::Stop,
            _ => RecordingStatus::Init,
        }
    }
}

/// Shared handle to the global recording status.
///
/// Read on the radio callback path, so it is a lock-free atomic.
#[derive(Debug, Clone, Default)]
pub struct RecordingFlag(Arc<AtomicU8>);

impl RecordingFlag {
    pub fn new(status: RecordingStatus) -> Self {
        Self(Arc::new(AtomicU8::new(status.to_u8())))
    }

    pub fn get(&self) -> RecordingStatus {
        RecordingStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: RecordingStatus) {
        self.0.store(status.to_u8(), Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.get() == RecordingStatus::Start
    }
}

/// Battery condition reported by common page 82 and its 2-byte variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    None,
    New,
    Good,
    Ok,
    Low,
    Critical,
    Invalid,
}

impl BatteryStatus {
    /// Decode the 3-bit status field.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            1 => BatteryStatus::New,
            2 => BatteryStatus::Good,
            3 => BatteryStatus::Ok,
            4 => BatteryStatus::Low,
            5 => BatteryStatus::Critical,
            7 => BatteryStatus::Invalid,
            _ => BatteryStatus::None,
        }
    }
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BatteryStatus::None => "None",
            BatteryStatus::New => "New",
            BatteryStatus::Good => "Good",
            BatteryStatus::Ok => "Ok",
            BatteryStatus::Low => "Low",
            BatteryStatus::Critical => "Critical",
            BatteryStatus::Invalid => "Invalid",
        };
        write!(f, "{}", label)
    }
}

/// Manufacturer, product and battery metadata from common pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub hardware_version: Option<u8>,
    pub manufacturer_id: Option<u16>,
    pub manufacturer_name: Option<&'static str>,
    pub model_number: Option<u16>,
    pub software_version: Option<f64>,
    pub serial_number: Option<u32>,
    pub battery_status: Option<BatteryStatus>,
    pub battery_voltage: Option<f64>,
}

/// Standard power-only page (0x10) values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardPower {
    /// Average power over the event-count delta in watts
    pub power: Option<f64>,
    /// Left pedal share of `power` in watts
    pub power_left: Option<f64>,
    /// Right pedal share of `power` in watts
    pub power_right: Option<f64>,
    /// (left, right) percentages
    pub lr_balance: Option<(u8, u8)>,
    /// Instantaneous power field as transmitted
    pub power_16_simple: Option<u16>,
    /// Instantaneous cadence in RPM
    pub cadence: Option<u8>,
    /// Work in joules
    pub accumulated_power: f64,
    pub timestamp: Option<Instant>,
}

impl StandardPower {
    /// Balance as "L:R", or ":" when not reported.
    pub fn lr_balance_label(&self) -> String {
        match self.lr_balance {
            Some((left, right)) => format!("{}:{}", left, right),
            None => ":".to_string(),
        }
    }
}

/// Wheel torque page (0x11) values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WheelTorquePower {
    pub power: Option<f64>,
    /// Wheel speed in km/h
    pub speed_kmh: Option<f64>,
    /// Distance in meters
    pub distance: f64,
    /// Work in joules
    pub accumulated_power: f64,
    pub timestamp: Option<Instant>,
}

/// Crank torque page (0x12) values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrankTorquePower {
    pub power: Option<f64>,
    pub cadence: Option<u8>,
    /// Work in joules
    pub accumulated_power: f64,
    pub timestamp: Option<Instant>,
}

/// Torque effectiveness and pedal smoothness page (0x13), in percent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PedalMetrics {
    pub torque_effectiveness_left: Option<f64>,
    pub torque_effectiveness_right: Option<f64>,
    pub pedal_smoothness_left: Option<f64>,
    pub pedal_smoothness_right: Option<f64>,
}

impl PedalMetrics {
    /// Torque effectiveness as "LL%/RR%".
    pub fn torque_effectiveness_label(&self) -> String {
        pair_label(self.torque_effectiveness_left, self.torque_effectiveness_right)
    }

    /// Pedal smoothness as "LL%/RR%".
    pub fn pedal_smoothness_label(&self) -> String {
        pair_label(self.pedal_smoothness_left, self.pedal_smoothness_right)
    }
}

fn pair_label(left: Option<f64>, right: Option<f64>) -> String {
    let side = |v: Option<f64>| match v {
        Some(p) => format!("{:02}%", p as u32),
        None => "--%".to_string(),
    };
    format!("{}/{}", side(left), side(right))
}

/// Live reading of one ANT+ device.
///
/// Rate fields stay `None` until the first valid decode. Accumulators only
/// move while recording and are cleared by [`SensorReading::reset_accumulators`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Source device
    pub identity: DeviceIdentity,
    /// Heart rate in BPM
    pub heart_rate: Option<u8>,
    /// Speed in m/s
    pub speed: Option<f64>,
    /// Cadence in RPM
    pub cadence: Option<f64>,
    /// Wheel distance in meters
    pub distance: f64,
    pub standard_power: StandardPower,
    pub wheel_torque: WheelTorquePower,
    pub crank_torque: CrankTorquePower,
    pub pedal: PedalMetrics,
    pub info: DeviceInfo,
    /// Samples discarded by the sanity and spike checks
    pub rejected_samples: u32,
    /// When a sample was last accepted
    pub timestamp: Option<Instant>,
    /// When any payload was last received
    pub last_data_at: Option<Instant>,
}

impl SensorReading {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            heart_rate: None,
            speed: None,
            cadence: None,
            distance: 0.0,
            standard_power: StandardPower::default(),
            wheel_torque: WheelTorquePower::default(),
            crank_torque: CrankTorquePower::default(),
            pedal: PedalMetrics::default(),
            info: DeviceInfo::default(),
            rejected_samples: 0,
            timestamp: None,
            last_data_at: None,
        }
    }

    /// Power from whichever power page the meter broadcasts.
    pub fn power(&self) -> Option<f64> {
        self.standard_power
            .power
            .or(self.crank_torque.power)
            .or(self.wheel_torque.power)
    }

    /// Total work in joules across the power pages.
    pub fn accumulated_power(&self) -> f64 {
        self.standard_power.accumulated_power
            + self.wheel_torque.accumulated_power
            + self.crank_torque.accumulated_power
    }

    /// Clear distance and work, and forget device metadata.
    pub fn reset_accumulators(&mut self) {
        self.distance = 0.0;
        self.standard_power.accumulated_power = 0.0;
        self.wheel_torque.distance = 0.0;
        self.wheel_torque.accumulated_power = 0.0;
        self.crank_torque.accumulated_power = 0.0;
        self.info = DeviceInfo::default();
    }
}
