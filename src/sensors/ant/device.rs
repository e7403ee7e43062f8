//! Per-device channel lifecycle.
//!
//! An [`AntDevice`] owns the radio channel of one paired identity and the
//! decode state fed by it. The channel is allocated once and reopened on
//! every reconnect.

use super::accumulator::DecodeEnv;
use super::backend::{AntChannel, AntNode, ChannelType, DataHandler};
use super::profiles::Profile;
use super::{
    channel_period, AntError, AntEvent, EventSink, MessageRate, DEVICE_SEARCH_TIMEOUT,
    RF_FREQUENCY,
};
use crate::sensors::types::{DeviceIdentity, SensorKind, SensorReading};
use crate::storage::config::SharedPairing;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Decode state and live reading of one device.
///
/// Guarded as a whole so a poller never sees half of an update.
#[derive(Debug)]
pub struct DeviceCore {
    profile: Profile,
    reading: SensorReading,
    env: DecodeEnv,
}

/// Device core shared between the radio callback and pollers.
pub type SharedCore = Arc<RwLock<DeviceCore>>;

impl DeviceCore {
    pub fn new(identity: DeviceIdentity, env: DecodeEnv) -> Self {
        Self {
            profile: Profile::for_device_type(identity.device_type),
            reading: SensorReading::new(identity),
            env,
        }
    }

    pub fn shared(identity: DeviceIdentity, env: DecodeEnv) -> SharedCore {
        Arc::new(RwLock::new(Self::new(identity, env)))
    }

    /// Decode one payload received at `now`.
    pub fn on_data(&mut self, data: &[u8], now: Instant) {
        let ctx = self.env.context();
        self.profile.decode(data, &mut self.reading, &ctx, now);
    }

    pub fn reading(&self) -> &SensorReading {
        &self.reading
    }

    pub fn reading_mut(&mut self) -> &mut SensorReading {
        &mut self.reading
    }

    pub fn env(&self) -> &DecodeEnv {
        &self.env
    }

    /// Reading as seen by a poller at `now`, with stalled rates zeroed when
    /// the stall policy asks for it.
    pub fn snapshot(&self, now: Instant) -> SensorReading {
        let mut reading = self.reading.clone();
        let stall = self.env.stall;
        if stall.zero_on_stall && stall.is_stalled(reading.timestamp, now) {
            reading.speed = reading.speed.map(|_| 0.0);
            reading.cadence = reading.cadence.map(|_| 0.0);
            reading.standard_power.power = reading.standard_power.power.map(|_| 0.0);
            reading.wheel_torque.power = reading.wheel_torque.power.map(|_| 0.0);
            reading.wheel_torque.speed_kmh = reading.wheel_torque.speed_kmh.map(|_| 0.0);
            reading.crank_torque.power = reading.crank_torque.power.map(|_| 0.0);
        }
        reading
    }

    /// Forget rolling counters; the next payload is a fresh baseline.
    pub fn reset_counters(&mut self) {
        self.profile.reset();
    }

    /// Forget rolling counters and clear accumulators.
    pub fn reset_value(&mut self) {
        self.profile.reset();
        self.reading.reset_accumulators();
    }
}

/// Radio callback feeding `core`.
pub fn data_handler(core: &SharedCore) -> DataHandler {
    let core = Arc::clone(core);
    Arc::new(move |data: &[u8]| {
        let now = Instant::now();
        if let Ok(mut core) = core.write() {
            core.on_data(data, now);
        }
    })
}

/// One paired ANT+ device and its channel.
pub struct AntDevice {
    identity: DeviceIdentity,
    kind: SensorKind,
    /// `None` for simulated devices
    channel: Option<Box<dyn AntChannel>>,
    core: SharedCore,
    pairing: SharedPairing,
    events: EventSink,
}

impl std::fmt::Debug for AntDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntDevice")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("channel", &self.channel.as_ref().map(|c| c.number()))
            .finish()
    }
}

impl AntDevice {
    /// Allocate and configure a channel for `identity`, then connect it if
    /// the pairing slot of `kind` is in use.
    pub fn new(
        node: &Arc<dyn AntNode>,
        kind: SensorKind,
        identity: DeviceIdentity,
        env: DecodeEnv,
        rate: MessageRate,
        pairing: SharedPairing,
        events: EventSink,
    ) -> Result<Self, AntError> {
        let core = DeviceCore::shared(identity, env);
        let channel = node.new_channel(ChannelType::BidirectionalReceive, false, data_handler(&core))?;
        tracing::info!(
            "ANT+ {} {}: channel {}",
            kind,
            identity,
            channel.number()
        );

        let device = Self {
            identity,
            kind,
            channel: Some(channel),
            core,
            pairing,
            events,
        };
        device.ready_connect(rate)?;
        device.connect(true, false);
        Ok(device)
    }

    /// A device without a radio channel, for simulated readings.
    pub fn simulated(
        kind: SensorKind,
        identity: DeviceIdentity,
        env: DecodeEnv,
        pairing: SharedPairing,
    ) -> Self {
        Self {
            identity,
            kind,
            channel: None,
            core: DeviceCore::shared(identity, env),
            pairing,
            events: EventSink::default(),
        }
    }

    fn ready_connect(&self, rate: MessageRate) -> Result<(), AntError> {
        if let Some(channel) = &self.channel {
            channel.set_id(self.identity.id, self.identity.device_type, 0)?;
            channel.set_period(channel_period(self.identity.device_type, rate))?;
            channel.set_search_timeout(DEVICE_SEARCH_TIMEOUT)?;
            channel.set_rf_freq(RF_FREQUENCY)?;
        }
        Ok(())
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn channel_number(&self) -> Option<u8> {
        self.channel.as_ref().map(|c| c.number())
    }

    pub fn core(&self) -> &SharedCore {
        &self.core
    }

    fn in_use(&self) -> bool {
        self.pairing
            .read()
            .map(|p| p.in_use(self.kind))
            .unwrap_or(false)
    }

    fn set_use(&self, in_use: bool) {
        if let Ok(mut pairing) = self.pairing.write() {
            pairing.set_use(self.kind, in_use);
        }
    }

    /// Whether the channel is open. Simulated devices are never open.
    pub fn is_open(&self) -> bool {
        self.channel
            .as_ref()
            .and_then(|c| c.status().ok())
            .map(|s| s.is_open())
            .unwrap_or(false)
    }

    /// Open the channel.
    ///
    /// With `check_use`, nothing happens unless the pairing slot is in use.
    /// With `change_use`, the slot is marked in use once the channel is
    /// open. Returns true only when this call opened the channel.
    pub fn connect(&self, check_use: bool, change_use: bool) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        if check_use && !self.in_use() {
            return false;
        }

        match channel.status() {
            Ok(status) if status.is_open() => {
                if change_use {
                    self.set_use(true);
                }
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("ANT+ {} status: {}", self.identity, e);
                return false;
            }
        }

        match channel.open() {
            Ok(()) => {
                if let Ok(mut core) = self.core.write() {
                    core.reset_counters();
                }
                if change_use {
                    self.set_use(true);
                }
                tracing::info!("ANT+ {} {} connected", self.kind, self.identity);
                self.events.send(AntEvent::ChannelOpened {
                    identity: self.identity,
                });
                true
            }
            Err(e) => {
                tracing::warn!("ANT+ {} connect: {}", self.identity, e);
                false
            }
        }
    }

    /// Close the channel and block for `wait` so the radio can settle.
    ///
    /// Mirrors [`AntDevice::connect`]: `change_use` clears the slot's use
    /// flag. Returns true only when this call closed the channel.
    pub fn disconnect(&self, check_use: bool, change_use: bool, wait: Duration) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        if check_use && !self.in_use() {
            return false;
        }

        match channel.status() {
            Ok(status) if status.is_closed() => {
                if change_use {
                    self.set_use(false);
                }
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("ANT+ {} status: {}", self.identity, e);
                return false;
            }
        }

        match channel.close() {
            Ok(()) => {
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                if change_use {
                    self.set_use(false);
                }
                tracing::info!("ANT+ {} {} disconnected", self.kind, self.identity);
                self.events.send(AntEvent::ChannelClosed {
                    identity: self.identity,
                });
                true
            }
            Err(e) => {
                tracing::warn!("ANT+ {} disconnect: {}", self.identity, e);
                false
            }
        }
    }

    /// Snapshot of the current reading.
    pub fn reading(&self) -> Option<SensorReading> {
        self.core
            .read()
            .ok()
            .map(|core| core.snapshot(Instant::now()))
    }

    /// Clear accumulators and rolling counters.
    pub fn reset_value(&self) {
        if let Ok(mut core) = self.core.write() {
            core.reset_value();
        }
    }
}
