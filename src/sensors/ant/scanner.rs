//! Background continuous scan.
//!
//! One receive-only channel hears every device in range. Payloads from a
//! paired main device are forwarded to that device's own decoder; heart
//! rate monitors and power meters that are not paired get a lightweight
//! reading of their own in the [`BackgroundDeviceMap`].

use super::accumulator::DecodeEnv;
use super::backend::{AntChannel, AntNode, ChannelType, DataHandler, RadioBackend};
use super::device::SharedCore;
use super::profiles::power::{PAGE_CRANK_TORQUE, PAGE_STANDARD_POWER, PAGE_WHEEL_TORQUE};
use super::profiles::{decode_common_page, PowerState, PAGE_MANUFACTURER_INFO};
use super::{extended_channel_id, AntError, RF_FREQUENCY};
use crate::sensors::types::{DeviceIdentity, SensorKind, SensorReading};
use crate::storage::config::SharedPairing;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Cores of the devices currently paired as a main device.
pub type DeviceRegistry = Arc<RwLock<HashMap<DeviceIdentity, SharedCore>>>;

/// Minimal reading of a device seen only by the background scan.
#[derive(Debug, Clone)]
pub struct BackgroundReading {
    pub identity: DeviceIdentity,
    pub heart_rate: Option<u8>,
    pub power: Option<f64>,
    pub manufacturer_name: Option<&'static str>,
    pub last_seen: Option<Instant>,
    power_state: PowerState,
    reading: SensorReading,
}

impl BackgroundReading {
    fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            heart_rate: None,
            power: None,
            manufacturer_name: None,
            last_seen: None,
            power_state: PowerState::default(),
            reading: SensorReading::new(identity),
        }
    }

    /// Full decoded reading of a background power meter.
    pub fn reading(&self) -> &SensorReading {
        &self.reading
    }
}

/// Devices seen by the scan that are not paired as a main device.
pub type BackgroundDeviceMap = BTreeMap<DeviceIdentity, BackgroundReading>;

/// Routing half of the scanner, called on the radio thread.
struct ScanRouter {
    pairing: SharedPairing,
    main_devices: DeviceRegistry,
    background: Arc<RwLock<BackgroundDeviceMap>>,
    env: DecodeEnv,
}

/// Kinds probed for a device type, in routing order.
const ROUTED_KINDS: [SensorKind; 4] = [
    SensorKind::HeartRate,
    SensorKind::Power,
    SensorKind::Speed,
    SensorKind::Cadence,
];

impl ScanRouter {
    fn route(&self, data: &[u8], now: Instant) {
        let Some(identity) = extended_channel_id(data) else {
            return;
        };
        let Some(kind) = ROUTED_KINDS
            .into_iter()
            .find(|kind| kind.accepts(identity.device_type))
        else {
            tracing::trace!("ANT+ scan: {} not routed", identity);
            return;
        };

        if self.is_main_device(identity) {
            self.forward(identity, data, now);
            return;
        }

        match kind {
            SensorKind::HeartRate => self.update_background(identity, now, |entry| {
                entry.heart_rate = Some(data[7]);
            }),
            SensorKind::Power => {
                let ctx = self.env.context();
                self.update_background(identity, now, |entry| match data[0] {
                    PAGE_STANDARD_POWER | PAGE_WHEEL_TORQUE | PAGE_CRANK_TORQUE => {
                        entry.power_state.decode(data, &mut entry.reading, &ctx, now);
                        entry.power = match data[0] {
                            PAGE_STANDARD_POWER => entry.reading.standard_power.power,
                            PAGE_WHEEL_TORQUE => entry.reading.wheel_torque.power,
                            _ => entry.reading.crank_torque.power,
                        };
                    }
                    PAGE_MANUFACTURER_INFO => {
                        decode_common_page(data, &mut entry.reading.info);
                        entry.manufacturer_name = entry.reading.info.manufacturer_name;
                    }
                    _ => {}
                })
            }
            // speed and cadence are only of interest when paired
            _ => {}
        }
    }

    /// Paired with `use` set under any kind.
    fn is_main_device(&self, identity: DeviceIdentity) -> bool {
        self.pairing
            .read()
            .map(|p| !p.kinds_using(identity).is_empty())
            .unwrap_or(false)
    }

    fn forward(&self, identity: DeviceIdentity, data: &[u8], now: Instant) {
        let core = self
            .main_devices
            .read()
            .ok()
            .and_then(|devices| devices.get(&identity).cloned());
        match core {
            Some(core) => {
                if let Ok(mut core) = core.write() {
                    core.on_data(data, now);
                }
            }
            None => tracing::trace!("ANT+ scan: main device {} has no decoder", identity),
        }
    }

    fn update_background<F>(&self, identity: DeviceIdentity, now: Instant, update: F)
    where
        F: FnOnce(&mut BackgroundReading),
    {
        if let Ok(mut map) = self.background.write() {
            let entry = map
                .entry(identity)
                .or_insert_with(|| BackgroundReading::new(identity));
            entry.last_seen = Some(now);
            update(entry);
        }
    }
}

/// The continuous-scan channel.
pub struct Scanner {
    node: Option<Arc<dyn AntNode>>,
    channel: Option<Box<dyn AntChannel>>,
    background: Arc<RwLock<BackgroundDeviceMap>>,
    in_use: AtomicBool,
}

impl Scanner {
    /// Reserve the scan channel. A simulated backend gets an inert scanner.
    pub fn new(
        backend: &RadioBackend,
        pairing: SharedPairing,
        main_devices: DeviceRegistry,
        env: DecodeEnv,
    ) -> Self {
        let background = Arc::new(RwLock::new(BackgroundDeviceMap::new()));
        let router = Arc::new(ScanRouter {
            pairing,
            main_devices,
            background: Arc::clone(&background),
            env,
        });

        let node = backend.node().cloned();
        let channel = node.as_ref().and_then(|node| {
            match Self::make_channel(node, router) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    tracing::warn!("ANT+ scan channel unavailable: {}", e);
                    None
                }
            }
        });

        Self {
            node,
            channel,
            background,
            in_use: AtomicBool::new(false),
        }
    }

    fn make_channel(
        node: &Arc<dyn AntNode>,
        router: Arc<ScanRouter>,
    ) -> Result<Box<dyn AntChannel>, AntError> {
        let handler: DataHandler = Arc::new(move |data: &[u8]| router.route(data, Instant::now()));
        let channel = node.new_channel(ChannelType::UnidirectionalReceiveOnly, false, handler)?;
        channel.set_rf_freq(RF_FREQUENCY)?;
        channel.set_id(0, 0, 0)?;
        tracing::info!("ANT+ scan: channel {}", channel.number());
        Ok(channel)
    }

    pub fn is_scanning(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Start the continuous scan. Returns true when the radio accepted it.
    pub fn scan(&self) -> bool {
        let (Some(node), Some(_)) = (&self.node, &self.channel) else {
            return false;
        };
        let started = node
            .set_extended_messages(true)
            .and_then(|_| node.continuous_scan());
        match started {
            Ok(()) => {
                self.in_use.store(true, Ordering::SeqCst);
                tracing::info!("ANT+ continuous scan started");
                true
            }
            Err(e) => {
                tracing::warn!("ANT+ continuous scan: {}", e);
                false
            }
        }
    }

    /// Stop scanning and let the radio settle for `wait`.
    pub fn stop_scan(&self, wait: Duration) -> bool {
        self.disconnect(wait)
    }

    /// Stop scanning without waiting, for shutdown. Returns false when the
    /// scan was not running.
    pub fn stop(&self) -> bool {
        self.disconnect(Duration::ZERO)
    }

    fn disconnect(&self, wait: Duration) -> bool {
        let (Some(node), Some(channel)) = (&self.node, &self.channel) else {
            return false;
        };
        if !self.is_scanning() {
            return false;
        }

        match channel.status() {
            Ok(status) if status.is_closed() => {
                self.in_use.store(false, Ordering::SeqCst);
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("ANT+ scan status: {}", e);
                return false;
            }
        }

        match channel.close() {
            Ok(()) => {
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                self.in_use.store(false, Ordering::SeqCst);
                if let Err(e) = node.set_extended_messages(false) {
                    tracing::warn!("ANT+ extended messages off: {}", e);
                }
                tracing::info!("ANT+ continuous scan stopped");
                true
            }
            Err(e) => {
                tracing::warn!("ANT+ scan stop: {}", e);
                false
            }
        }
    }

    /// Snapshot of devices seen by the scan.
    pub fn background_devices(&self) -> BackgroundDeviceMap {
        self.background
            .read()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    /// Drop one device from the background map.
    pub fn forget(&self, identity: DeviceIdentity) {
        if let Ok(mut map) = self.background.write() {
            map.remove(&identity);
        }
    }

    /// Forget devices seen so far.
    pub fn reset(&self) {
        if let Ok(mut map) = self.background.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ant::accumulator::StallPolicy;
    use crate::sensors::ant::device::DeviceCore;
    use crate::sensors::ant::MockNode;
    use crate::sensors::types::RecordingFlag;
    use crate::storage::config::PairingTable;

    fn extended(page: [u8; 8], id: u16, device_type: u8) -> Vec<u8> {
        let mut data = page.to_vec();
        data.push(0x80);
        data.extend_from_slice(&id.to_le_bytes());
        data.push(device_type);
        data.push(0x01);
        data
    }

    fn env() -> DecodeEnv {
        DecodeEnv::new(2.105, RecordingFlag::default(), StallPolicy::default())
    }

    #[test]
    fn test_simulated_scanner_is_inert() {
        let scanner = Scanner::new(
            &RadioBackend::Simulated,
            PairingTable::default().into_shared(),
            DeviceRegistry::default(),
            env(),
        );
        assert!(!scanner.scan());
        assert!(!scanner.stop());
        assert!(scanner.background_devices().is_empty());
    }

    #[test]
    fn test_routing() {
        let node = Arc::new(MockNode::new());
        let backend = RadioBackend::Real(Arc::clone(&node) as Arc<dyn AntNode>);

        let main = DeviceIdentity::new(1111, 0x78);
        let mut pairing = PairingTable::default();
        pairing.bind(SensorKind::HeartRate, main);
        pairing.set_use(SensorKind::HeartRate, true);

        let registry = DeviceRegistry::default();
        let core = DeviceCore::shared(main, env());
        registry.write().unwrap().insert(main, Arc::clone(&core));

        let scanner = Scanner::new(&backend, pairing.into_shared(), registry, env());
        assert!(scanner.scan());
        assert!(node.extended_messages());
        let channel = node.scan_channel().unwrap();
        assert!(channel.status().is_open());

        channel.deliver(&extended([0, 0, 0, 0, 0, 0, 1, 90], 1111, 0x78));
        channel.deliver(&extended([0, 0, 0, 0, 0, 0, 1, 120], 2222, 0xF8));
        channel.deliver(&extended([0x10, 1, 0xFF, 80, 0, 0, 0, 0], 3333, 0x0B));
        channel.deliver(&extended([0x50, 0xFF, 0xFF, 1, 69, 0, 1, 0], 3333, 0x0B));
        channel.deliver(&extended([0, 0, 0, 0, 0, 0, 0, 0], 4444, 0x79));

        assert_eq!(core.read().unwrap().reading().heart_rate, Some(90));

        let background = scanner.background_devices();
        assert_eq!(background.len(), 2);
        assert_eq!(
            background[&DeviceIdentity::new(2222, 0x78)].heart_rate,
            Some(120)
        );
        let meter = &background[&DeviceIdentity::new(3333, 0x0B)];
        assert_eq!(meter.power, Some(0.0));
        assert_eq!(meter.manufacturer_name, Some("stages_cycling"));

        assert!(scanner.stop_scan(Duration::ZERO));
        assert!(!scanner.is_scanning());
        assert!(!node.extended_messages());
        assert!(!scanner.stop());
    }
}
