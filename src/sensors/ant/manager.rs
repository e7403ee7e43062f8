//! ANT+ sensor manager.
//!
//! Owns every paired device, the background scanner and the pairing
//! searcher, and exposes the operations the rest of the application uses:
//! pairing, scanning, searching, polling readings, reset and shutdown.

use super::accumulator::DecodeEnv;
use super::backend::{RadioBackend, WaitMode};
use super::device::AntDevice;
use super::scanner::{BackgroundDeviceMap, DeviceRegistry, Scanner};
use super::searcher::{SearchResult, Searcher};
use super::simulated::{simulated_pairing, SimulatedSample};
use super::{AntError, AntEvent, EventSink, MessageRate};
use crate::sensors::types::{DeviceIdentity, RecordingFlag, SensorKind, SensorReading};
use crate::storage::config::{AntSettings, SharedPairing};
use crossbeam::channel::Receiver;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Facade over the ANT+ radio: paired devices, scan and search.
pub struct AntSensorManager {
    backend: RadioBackend,
    pairing: SharedPairing,
    env: DecodeEnv,
    message_rate: MessageRate,
    settle: Duration,
    sensor_interval: f64,
    dummy_output: bool,
    /// One device per identity, kept until shutdown so channels are reused
    devices: BTreeMap<DeviceIdentity, AntDevice>,
    registry: DeviceRegistry,
    scanner: Scanner,
    searcher: Searcher,
    events: EventSink,
}

impl AntSensorManager {
    /// Create a manager over `backend`.
    ///
    /// The pairing table is taken from `settings`. Without a radio it is
    /// replaced by the simulated devices when dummy output is on, and
    /// cleared otherwise.
    pub fn new(backend: RadioBackend, settings: &AntSettings, recording: RecordingFlag) -> Self {
        let mut table = settings.pairing.clone();
        let dummy_output = backend.is_simulated() && settings.dummy_output;
        if backend.is_simulated() {
            if dummy_output {
                simulated_pairing(&mut table);
            } else {
                table.clear_all();
            }
        }
        let pairing = table.into_shared();

        let env = DecodeEnv::new(
            settings.wheel_circumference(),
            recording,
            settings.stall_policy(),
        );
        let events = EventSink::default();
        let registry = DeviceRegistry::default();
        let scanner = Scanner::new(
            &backend,
            Arc::clone(&pairing),
            Arc::clone(&registry),
            env.clone(),
        );
        let searcher = Searcher::new(
            &backend,
            Arc::clone(&pairing),
            events.clone(),
            settings.settle_delay(),
        );

        let mut manager = Self {
            backend,
            pairing,
            env,
            message_rate: settings.message_rate,
            settle: settings.settle_delay(),
            sensor_interval: settings.sensor_interval(),
            dummy_output,
            devices: BTreeMap::new(),
            registry,
            scanner,
            searcher,
            events,
        };

        if manager.dummy_output {
            for kind in SensorKind::ALL {
                if let Some(identity) = manager.paired_identity(kind) {
                    manager.devices.entry(identity).or_insert_with(|| {
                        AntDevice::simulated(
                            kind,
                            identity,
                            manager.env.clone(),
                            Arc::clone(&manager.pairing),
                        )
                    });
                }
            }
        }

        manager
    }

    /// Get an event receiver for ANT+ events.
    pub fn event_receiver(&self) -> Receiver<AntEvent> {
        self.events.attach()
    }

    pub fn is_simulated(&self) -> bool {
        self.backend.is_simulated()
    }

    /// Shared pairing table, for persisting changes.
    pub fn pairing(&self) -> SharedPairing {
        Arc::clone(&self.pairing)
    }

    fn set_wait_mode(&self, mode: WaitMode) {
        if let Some(node) = self.backend.node() {
            node.set_wait_mode(mode);
        }
    }

    /// Identity bound to `kind` with its use flag set.
    fn paired_identity(&self, kind: SensorKind) -> Option<DeviceIdentity> {
        let pairing = self.pairing.read().ok()?;
        if pairing.in_use(kind) {
            pairing.bound_identity(kind)
        } else {
            None
        }
    }

    /// Connect every kind whose use flag is set, then start the radio.
    pub fn start(&mut self) {
        self.events.send(AntEvent::BackendSelected {
            simulated: self.is_simulated(),
        });
        let Some(node) = self.backend.node().cloned() else {
            tracing::info!("ANT+ running without radio (dummy output: {})", self.dummy_output);
            return;
        };

        for kind in SensorKind::ALL {
            if let Some(identity) = self.paired_identity(kind) {
                if let Err(e) = self.connect(kind, identity.id, identity.device_type) {
                    tracing::warn!("ANT+ auto-connect {} {}: {}", kind, identity, e);
                }
            }
        }

        if let Err(e) = node.start() {
            tracing::warn!("ANT+ node start: {}", e);
        }
    }

    /// Pair `kind` with the device `(id, device_type)` and open its channel.
    ///
    /// A different device already bound to `kind` is unpaired first. A
    /// device seen before reuses its channel.
    pub fn connect(&mut self, kind: SensorKind, id: u16, device_type: u8) -> Result<(), AntError> {
        if !kind.accepts(device_type) {
            return Err(AntError::UnsupportedDeviceType { kind, device_type });
        }
        let identity = DeviceIdentity::new(id, device_type);

        self.searcher.stop_search(false);

        let previous = self
            .pairing
            .read()
            .ok()
            .and_then(|p| p.bound_identity(kind));
        if let Some(previous) = previous.filter(|p| *p != identity) {
            tracing::info!("ANT+ {} rebinding from {}", kind, previous);
            self.unbind(kind, previous);
        }

        if let Ok(mut pairing) = self.pairing.write() {
            pairing.bind(kind, identity);
            pairing.set_use(kind, true);
        }

        if let Some(device) = self.devices.get(&identity) {
            device.connect(false, false);
        } else {
            let device = match self.backend.node() {
                Some(node) => AntDevice::new(
                    node,
                    kind,
                    identity,
                    self.env.clone(),
                    self.message_rate,
                    Arc::clone(&self.pairing),
                    self.events.clone(),
                ),
                None => Ok(AntDevice::simulated(
                    kind,
                    identity,
                    self.env.clone(),
                    Arc::clone(&self.pairing),
                )),
            };
            let device = match device {
                Ok(device) => device,
                Err(e) => {
                    if let Ok(mut pairing) = self.pairing.write() {
                        pairing.clear(kind);
                    }
                    return Err(e);
                }
            };
            if let Ok(mut registry) = self.registry.write() {
                registry.insert(identity, Arc::clone(device.core()));
            }
            self.devices.insert(identity, device);
        }
        self.scanner.forget(identity);

        self.set_wait_mode(WaitMode::Period);
        tracing::info!("ANT+ {} paired with {}", kind, identity);
        self.events.send(AntEvent::DevicePaired { kind, identity });
        Ok(())
    }

    /// Unpair `kind`, stopping any search and closing its channel first.
    ///
    /// The channel stays open while another in-use kind shares the device.
    pub fn disconnect(&mut self, kind: SensorKind) -> Result<(), AntError> {
        let identity = self
            .pairing
            .read()
            .map_err(|_| AntError::NotPaired(kind))?
            .bound_identity(kind)
            .ok_or(AntError::NotPaired(kind))?;
        self.searcher.stop_search(true);
        self.unbind(kind, identity);
        Ok(())
    }

    fn unbind(&self, kind: SensorKind, identity: DeviceIdentity) {
        let shared = self
            .pairing
            .read()
            .map(|p| p.kinds_using(identity).into_iter().any(|k| k != kind))
            .unwrap_or(false);
        if !shared {
            if let Some(device) = self.devices.get(&identity) {
                device.disconnect(false, false, self.settle);
            }
        }

        if let Ok(mut pairing) = self.pairing.write() {
            pairing.clear(kind);
        }
        tracing::info!("ANT+ {} unpaired from {}", kind, identity);
        self.events.send(AntEvent::DeviceUnpaired { kind, identity });
    }

    /// Devices bound to at least one in-use kind.
    fn paired_identities(&self) -> BTreeSet<DeviceIdentity> {
        SensorKind::ALL
            .into_iter()
            .filter_map(|kind| self.paired_identity(kind))
            .collect()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Close every paired channel and start the background scan.
    pub fn start_scan(&self) -> bool {
        if self.backend.node().is_none() || self.scanner.is_scanning() {
            return false;
        }
        self.set_wait_mode(WaitMode::Action);
        for device in self.devices.values() {
            device.disconnect(false, false, self.settle);
        }
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }

        self.scanner.reset();
        let started = self.scanner.scan();
        if started {
            self.set_wait_mode(WaitMode::Scan);
            self.events.send(AntEvent::ScanStarted);
        } else {
            self.reopen_paired();
            self.set_wait_mode(WaitMode::Period);
        }
        started
    }

    /// Stop the background scan and reopen every paired channel.
    pub fn stop_scan(&self) -> bool {
        if !self.scanner.is_scanning() {
            return false;
        }
        self.set_wait_mode(WaitMode::Action);
        let stopped = self.scanner.stop_scan(self.settle);
        self.reopen_paired();
        self.set_wait_mode(WaitMode::Period);
        if stopped {
            self.events.send(AntEvent::ScanStopped);
        }
        stopped
    }

    fn reopen_paired(&self) {
        for identity in self.paired_identities() {
            if let Some(device) = self.devices.get(&identity) {
                device.connect(false, false);
            }
        }
    }

    /// Search for devices pairable as `kind`.
    pub fn search(&self, kind: SensorKind) -> bool {
        self.searcher.search(kind)
    }

    pub fn stop_search(&self) -> bool {
        self.searcher.stop_search(true)
    }

    pub fn is_searching(&self) -> bool {
        self.searcher.is_searching()
    }

    /// Devices found by the current search.
    pub fn search_results(&self) -> SearchResult {
        self.searcher.results()
    }

    /// Reading of the device paired as `kind`.
    pub fn reading(&self, kind: SensorKind) -> Option<SensorReading> {
        let identity = self.paired_identity(kind)?;
        self.devices.get(&identity)?.reading()
    }

    /// Readings of every paired kind.
    pub fn readings(&self) -> BTreeMap<SensorKind, SensorReading> {
        SensorKind::ALL
            .into_iter()
            .filter_map(|kind| self.reading(kind).map(|reading| (kind, reading)))
            .collect()
    }

    /// Devices seen by the background scan.
    pub fn background_devices(&self) -> BackgroundDeviceMap {
        self.scanner.background_devices()
    }

    /// Refresh simulated readings. Does nothing with a radio.
    pub fn update(&self) {
        if !self.dummy_output {
            return;
        }
        let sample = SimulatedSample::generate(&mut rand::rng());
        let recording = self.env.recording.get();
        let now = Instant::now();
        for device in self.devices.values() {
            if let Ok(mut core) = device.core().write() {
                sample.apply(core.reading_mut(), recording, self.sensor_interval, now);
            }
        }
    }

    /// Clear accumulators of every device and forget background devices.
    pub fn reset(&self) {
        for device in self.devices.values() {
            device.reset_value();
        }
        self.scanner.reset();
        tracing::info!("ANT+ readings reset");
    }

    /// Shut the radio down.
    pub fn quit(&self) {
        let Some(node) = self.backend.node() else {
            return;
        };
        node.set_wait_mode(WaitMode::Action);
        if !self.scanner.stop() {
            for device in self.devices.values() {
                device.disconnect(false, false, Duration::ZERO);
            }
            self.searcher.stop_search(false);
        }
        if let Err(e) = node.stop() {
            tracing::warn!("ANT+ node stop: {}", e);
        }
        tracing::info!("ANT+ stopped");
    }
}
