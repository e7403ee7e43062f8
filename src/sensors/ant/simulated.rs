//! Simulated readings for running without a radio.

use super::accumulator::accumulate;
use super::searcher::{SearchHit, SearchResult};
use super::{
    DEVICE_TYPE_BIKE_CADENCE, DEVICE_TYPE_BIKE_POWER, DEVICE_TYPE_BIKE_SPEED,
    DEVICE_TYPE_BIKE_SPEED_CADENCE, DEVICE_TYPE_HEART_RATE,
};
use crate::sensors::types::{DeviceIdentity, RecordingStatus, SensorKind, SensorReading};
use crate::storage::config::PairingTable;
use rand::Rng;
use std::time::Instant;

/// Kinds bound in simulated mode. Speed and cadence share one device.
pub const SIMULATED_PAIRING: [(SensorKind, u8); 4] = [
    (SensorKind::HeartRate, DEVICE_TYPE_HEART_RATE),
    (SensorKind::Speed, DEVICE_TYPE_BIKE_SPEED_CADENCE),
    (SensorKind::Cadence, DEVICE_TYPE_BIKE_SPEED_CADENCE),
    (SensorKind::Power, DEVICE_TYPE_BIKE_POWER),
];

/// Replace the pairing table with the simulated devices (device number 0).
pub fn simulated_pairing(table: &mut PairingTable) {
    table.clear_all();
    for (kind, device_type) in SIMULATED_PAIRING {
        table.bind(kind, DeviceIdentity::new(0, device_type));
        table.set_use(kind, true);
    }
}

/// One round of random sensor values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedSample {
    pub heart_rate: u8,
    /// m/s
    pub speed: f64,
    pub cadence: f64,
    pub power: f64,
}

impl SimulatedSample {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            heart_rate: rng.random_range(70..=130),
            speed: rng.random_range(5..=30) as f64 / 3.6,
            cadence: rng.random_range(0..=80) as f64,
            power: rng.random_range(0..=250) as f64,
        }
    }

    /// Write the values the device behind `reading` would report, and
    /// integrate distance and work over `interval` seconds while recording.
    pub fn apply(
        &self,
        reading: &mut SensorReading,
        recording: RecordingStatus,
        interval: f64,
        now: Instant,
    ) {
        match reading.identity.device_type {
            DEVICE_TYPE_HEART_RATE => reading.heart_rate = Some(self.heart_rate),
            DEVICE_TYPE_BIKE_SPEED_CADENCE | DEVICE_TYPE_BIKE_SPEED | DEVICE_TYPE_BIKE_CADENCE => {
                reading.speed = Some(self.speed);
                reading.cadence = Some(self.cadence);
                accumulate(&mut reading.distance, self.speed * interval, recording);
            }
            DEVICE_TYPE_BIKE_POWER => {
                let sp = &mut reading.standard_power;
                sp.power = Some(self.power);
                sp.timestamp = Some(now);
                accumulate(&mut sp.accumulated_power, self.power * interval, recording);
            }
            _ => return,
        }
        reading.timestamp = Some(now);
        reading.last_data_at = Some(now);
    }
}

/// Search results shown without a radio, rotating every 15 seconds.
pub fn search_results(now_secs: u64) -> SearchResult {
    let second = now_secs % 30;
    let hits: &[(u16, u8, bool)] = match second {
        1..=14 => &[(12345, 0x79, false), (23456, 0x7A, false), (6789, 0x78, false)],
        16..=29 => &[
            (12345, 0x79, false),
            (23456, 0x7A, false),
            (34567, 0x7B, false),
            (45678, 0x0B, false),
            (45679, 0x0B, true),
            (56789, 0x78, false),
            (6789, 0x78, false),
        ],
        _ => &[],
    };
    hits.iter()
        .map(|&(id, device_type, already_paired)| {
            (
                id,
                SearchHit {
                    device_type,
                    already_paired,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_simulated_pairing() {
        let mut table = PairingTable::default();
        table.bind(SensorKind::Light, DeviceIdentity::new(9, 0x23));
        simulated_pairing(&mut table);

        assert!(table.bound_identity(SensorKind::Light).is_none());
        assert_eq!(
            table.bound_identity(SensorKind::Cadence),
            Some(DeviceIdentity::new(0, 0x79))
        );
        assert!(table.in_use(SensorKind::Power));
        assert!(table.sanitize().is_empty());
    }

    #[test]
    fn test_sample_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let sample = SimulatedSample::generate(&mut rng);
            assert!((70..=130).contains(&sample.heart_rate));
            assert!(sample.speed >= 5.0 / 3.6 && sample.speed <= 30.0 / 3.6);
            assert!((0.0..=80.0).contains(&sample.cadence));
            assert!((0.0..=250.0).contains(&sample.power));
        }
    }

    #[test]
    fn test_apply_integrates_while_recording() {
        let sample = SimulatedSample {
            heart_rate: 100,
            speed: 5.0,
            cadence: 80.0,
            power: 200.0,
        };
        let now = Instant::now();

        let mut sc = SensorReading::new(DeviceIdentity::new(0, 0x79));
        sample.apply(&mut sc, RecordingStatus::Stop, 1.0, now);
        assert_eq!(sc.speed, Some(5.0));
        assert_eq!(sc.distance, 0.0);
        sample.apply(&mut sc, RecordingStatus::Start, 2.0, now);
        assert_eq!(sc.distance, 10.0);

        let mut power = SensorReading::new(DeviceIdentity::new(0, 0x0B));
        sample.apply(&mut power, RecordingStatus::Start, 1.0, now);
        assert_eq!(power.power(), Some(200.0));
        assert_eq!(power.accumulated_power(), 200.0);
        assert_eq!(power.heart_rate, None);
    }

    #[test]
    fn test_search_results_rotate() {
        assert_eq!(search_results(30).len(), 0);
        assert_eq!(search_results(5).len(), 3);
        assert_eq!(search_results(15).len(), 0);
        let late = search_results(47);
        assert_eq!(late.len(), 7);
        assert!(late[&45679].already_paired);
    }
}
