//! Channel lifecycle, scanning and searching against the mock radio.

use antride::sensors::ant::{AntEvent, AntNode, AntSensorManager, MockNode, RadioBackend};
use antride::sensors::{DeviceIdentity, RecordingFlag, RecordingStatus, SensorKind};
use antride::storage::{AntSettings, PairingTable};
use std::sync::Arc;

fn extended(page: [u8; 8], id: u16, device_type: u8) -> Vec<u8> {
    let mut data = page.to_vec();
    data.push(0x80);
    data.extend_from_slice(&id.to_le_bytes());
    data.push(device_type);
    data.push(0x01);
    data
}

fn manager_with(pairing: PairingTable, recording: RecordingFlag) -> (Arc<MockNode>, AntSensorManager) {
    let node = Arc::new(MockNode::new());
    let backend = RadioBackend::Real(Arc::clone(&node) as Arc<dyn AntNode>);
    let settings = AntSettings {
        settle_delay_ms: 0,
        pairing,
        ..AntSettings::default()
    };
    let manager = AntSensorManager::new(backend, &settings, recording);
    (node, manager)
}

#[test]
fn test_connect_twice_is_idempotent() {
    let (node, mut manager) = manager_with(PairingTable::default(), RecordingFlag::default());
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();

    let handle = node.channel_for(1111, 0x78).unwrap();
    assert_eq!(handle.open_count(), 1);
    assert!(handle.status().is_open());
}

#[test]
fn test_disconnect_closed_is_noop() {
    let (node, mut manager) = manager_with(PairingTable::default(), RecordingFlag::default());
    manager.connect(SensorKind::Power, 42, 0x0B).unwrap();
    manager.disconnect(SensorKind::Power).unwrap();
    assert!(manager.disconnect(SensorKind::Power).is_err());

    let handle = node.channel_for(42, 0x0B).unwrap();
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_pairing_events() {
    let (_, mut manager) = manager_with(PairingTable::default(), RecordingFlag::default());
    let rx = manager.event_receiver();
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();
    manager.disconnect(SensorKind::HeartRate).unwrap();

    let identity = DeviceIdentity::new(1111, 0x78);
    let events: Vec<AntEvent> = rx.try_iter().collect();
    assert!(events.contains(&AntEvent::ChannelOpened { identity }));
    assert!(events.contains(&AntEvent::DevicePaired {
        kind: SensorKind::HeartRate,
        identity
    }));
    assert!(events.contains(&AntEvent::ChannelClosed { identity }));
    assert_eq!(
        events.last(),
        Some(&AntEvent::DeviceUnpaired {
            kind: SensorKind::HeartRate,
            identity
        })
    );
}

#[test]
fn test_failed_open_leaves_state_consistent() {
    let (node, mut manager) = manager_with(PairingTable::default(), RecordingFlag::default());
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();
    manager.disconnect(SensorKind::HeartRate).unwrap();

    node.set_fail_commands(true);
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();
    let handle = node.channel_for(1111, 0x78).unwrap();
    assert!(handle.status().is_closed());

    node.set_fail_commands(false);
    manager.connect(SensorKind::HeartRate, 1111, 0x78).unwrap();
    assert!(handle.status().is_open());
}

#[test]
fn test_allocation_failure_clears_pairing() {
    let (node, mut manager) = manager_with(PairingTable::default(), RecordingFlag::default());
    node.set_fail_allocation(true);
    assert!(manager.connect(SensorKind::Speed, 7, 0x7B).is_err());
    assert!(manager
        .pairing()
        .read()
        .unwrap()
        .bound_identity(SensorKind::Speed)
        .is_none());
}

#[test]
fn test_scan_routes_main_and_background_devices() {
    let recording = RecordingFlag::new(RecordingStatus::Start);
    let (node, mut manager) = manager_with(PairingTable::default(), recording);
    manager.connect(SensorKind::Speed, 300, 0x7B).unwrap();
    assert!(manager.start_scan());

    let scan = node.scan_channel().unwrap();
    scan.deliver(&extended([0, 0, 0, 0, 0, 0, 0, 0], 300, 0x7B));
    scan.deliver(&extended([0, 0, 0, 0, 0x00, 0x04, 3, 0], 300, 0x7B));
    scan.deliver(&extended([0, 0, 0, 0, 0, 0, 5, 150], 8888, 0x78));
    // speed sensors that are not paired are ignored
    scan.deliver(&extended([0, 0, 0, 0, 0x00, 0x04, 3, 0], 301, 0x7B));

    let speed = manager.reading(SensorKind::Speed).unwrap();
    assert!((speed.speed.unwrap() - 6.315).abs() < 1e-9);
    assert!((speed.distance - 6.315).abs() < 1e-9);

    let background = manager.background_devices();
    assert_eq!(background.len(), 1);
    let hr = &background[&DeviceIdentity::new(8888, 0x78)];
    assert_eq!(hr.heart_rate, Some(150));
    assert!(hr.last_seen.is_some());

    assert!(manager.stop_scan());
    assert!(node.channel_for(300, 0x7B).unwrap().status().is_open());
}

#[test]
fn test_search_marks_paired_devices() {
    let mut pairing = PairingTable::default();
    pairing.bind(SensorKind::HeartRate, DeviceIdentity::new(1111, 0x78));
    pairing.set_use(SensorKind::HeartRate, true);
    let (node, mut manager) = manager_with(pairing, RecordingFlag::default());
    manager.start();

    assert!(manager.search(SensorKind::HeartRate));
    let search = node.search_channel().unwrap();
    search.deliver(&extended([0; 8], 1111, 0x78));
    search.deliver(&extended([0; 8], 2222, 0x78));

    let results = manager.search_results();
    assert_eq!(results.len(), 2);
    assert!(results[&1111].already_paired);
    assert!(!results[&2222].already_paired);
    assert_eq!(results[&2222].device_type, 0x78);

    assert!(manager.stop_search());
    assert!(!manager.stop_search());
    assert!(manager.search_results().is_empty());
}

#[test]
fn test_reset_clears_accumulators() {
    let recording = RecordingFlag::new(RecordingStatus::Start);
    let (node, mut manager) = manager_with(PairingTable::default(), recording);
    manager.connect(SensorKind::Speed, 300, 0x7B).unwrap();

    let channel = node.channel_for(300, 0x7B).unwrap();
    channel.deliver(&[0, 0, 0, 0, 0, 0, 0, 0]);
    channel.deliver(&[0, 0, 0, 0, 0x00, 0x04, 3, 0]);
    assert!(manager.reading(SensorKind::Speed).unwrap().distance > 0.0);

    manager.reset();
    assert_eq!(manager.reading(SensorKind::Speed).unwrap().distance, 0.0);
}
