//! ANT+ Bike Speed and Cadence Profiles
//!
//! Device Types: 121 (combined), 122 (cadence only), 123 (speed only).
//! Event times are in 1/1024 s and both times and counts are 16-bit
//! rolling counters.

use super::{apply_battery, manufacturer_name, reject};
use crate::sensors::ant::accumulator::{
    accumulate, gate_rate, CounterSnapshot, DecodeContext, Metric, RateOutcome, MAX_EVENT_DELTA,
    MODULUS_U16,
};
use crate::sensors::types::SensorReading;
use std::time::Instant;

/// Combined page layout: cadence time, cadence count, speed time, speed count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedCadencePage {
    pub cadence_event_time: u16,
    pub cadence_revolutions: u16,
    pub speed_event_time: u16,
    pub wheel_revolutions: u16,
}

impl SpeedCadencePage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        Some(Self {
            cadence_event_time: u16::from_le_bytes([data[0], data[1]]),
            cadence_revolutions: u16::from_le_bytes([data[2], data[3]]),
            speed_event_time: u16::from_le_bytes([data[4], data[5]]),
            wheel_revolutions: u16::from_le_bytes([data[6], data[7]]),
        })
    }

    fn counters(&self) -> [i64; 4] {
        [
            self.cadence_event_time as i64,
            self.cadence_revolutions as i64,
            self.speed_event_time as i64,
            self.wheel_revolutions as i64,
        ]
    }
}

/// Decode state of a combined speed and cadence sensor
#[derive(Debug, Clone)]
pub struct SpeedCadenceState {
    snapshot: CounterSnapshot<4>,
}

impl Default for SpeedCadenceState {
    fn default() -> Self {
        Self {
            snapshot: CounterSnapshot::new([MODULUS_U16; 4]),
        }
    }
}

impl SpeedCadenceState {
    pub fn decode(
        &mut self,
        data: &[u8],
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        let Some(page) = SpeedCadencePage::parse(data) else {
            return;
        };
        reading.last_data_at = Some(now);

        let Some([cad_time, cad_count, speed_time, speed_count]) =
            self.snapshot.advance(page.counters())
        else {
            reading.speed = Some(0.0);
            reading.cadence = Some(0.0);
            return;
        };

        let circumference = ctx.wheel_circumference;
        match gate_rate(
            Metric::Speed,
            speed_time,
            speed_count,
            MAX_EVENT_DELTA,
            reading.speed,
            |t, v| circumference * v * 1024.0 / t,
        ) {
            RateOutcome::Idle => reading.speed = Some(0.0),
            RateOutcome::Accepted(speed) => {
                reading.speed = Some(speed);
                accumulate(
                    &mut reading.distance,
                    circumference * speed_count as f64,
                    ctx.recording,
                );
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }

        match gate_rate(
            Metric::Cadence,
            cad_time,
            cad_count,
            MAX_EVENT_DELTA,
            reading.cadence,
            |t, v| 60.0 * v * 1024.0 / t,
        ) {
            RateOutcome::Idle => reading.cadence = Some(0.0),
            RateOutcome::Accepted(cadence) => {
                reading.cadence = Some(cadence);
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }
    }

    pub fn reset(&mut self) {
        self.snapshot.reset();
    }
}

/// Decode state of a speed-only or cadence-only sensor.
///
/// Both share one layout: bytes 4-7 hold event time and revolution count,
/// and the low 3 bits of byte 0 select a background page.
#[derive(Debug, Clone)]
pub struct EventCounterState {
    metric: Metric,
    snapshot: CounterSnapshot<2>,
}

impl EventCounterState {
    pub fn cadence() -> Self {
        Self {
            metric: Metric::Cadence,
            snapshot: CounterSnapshot::new([MODULUS_U16; 2]),
        }
    }

    pub fn speed() -> Self {
        Self {
            metric: Metric::Speed,
            snapshot: CounterSnapshot::new([MODULUS_U16; 2]),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    fn value_mut<'a>(&self, reading: &'a mut SensorReading) -> &'a mut Option<f64> {
        match self.metric {
            Metric::Speed => &mut reading.speed,
            _ => &mut reading.cadence,
        }
    }

    pub fn decode(
        &mut self,
        data: &[u8],
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        if data.len() < 8 {
            return;
        }
        reading.last_data_at = Some(now);

        let counters = [
            u16::from_le_bytes([data[4], data[5]]) as i64,
            u16::from_le_bytes([data[6], data[7]]) as i64,
        ];
        match self.snapshot.advance(counters) {
            None => *self.value_mut(reading) = Some(0.0),
            Some([time_delta, count_delta]) => {
                let constant = match self.metric {
                    Metric::Speed => ctx.wheel_circumference,
                    _ => 60.0,
                };
                let previous = *self.value_mut(reading);
                match gate_rate(
                    self.metric,
                    time_delta,
                    count_delta,
                    MAX_EVENT_DELTA,
                    previous,
                    |t, v| constant * v * 1024.0 / t,
                ) {
                    RateOutcome::Idle => *self.value_mut(reading) = Some(0.0),
                    RateOutcome::Accepted(value) => {
                        *self.value_mut(reading) = Some(value);
                        if self.metric == Metric::Speed {
                            accumulate(
                                &mut reading.distance,
                                ctx.wheel_circumference * count_delta as f64,
                                ctx.recording,
                            );
                        }
                        reading.timestamp = Some(now);
                    }
                    RateOutcome::Rejected(sample) => reject(reading, sample),
                }
            }
        }

        let info = &mut reading.info;
        match data[0] & 0b111 {
            // Manufacturer ID
            2 => {
                let id = data[1] as u16;
                info.manufacturer_id = Some(id);
                if let Some(name) = manufacturer_name(id) {
                    info.manufacturer_name = Some(name);
                }
                info.serial_number = Some(u16::from_le_bytes([data[2], data[3]]) as u32);
            }
            // Product ID
            3 => {
                info.hardware_version = Some(data[1]);
                info.software_version = Some(data[2] as f64);
                info.model_number = Some(data[3] as u16);
            }
            // Battery status
            4 => apply_battery([data[2], data[3]], info),
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.snapshot.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ant::accumulator::StallPolicy;
    use crate::sensors::types::{BatteryStatus, DeviceIdentity, RecordingStatus};

    fn ctx(recording: RecordingStatus) -> DecodeContext {
        DecodeContext {
            wheel_circumference: 2.105,
            recording,
            stall: StallPolicy::default(),
        }
    }

    fn sc_page(cad_time: u16, cad: u16, speed_time: u16, speed: u16) -> [u8; 8] {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&cad_time.to_le_bytes());
        data[2..4].copy_from_slice(&cad.to_le_bytes());
        data[4..6].copy_from_slice(&speed_time.to_le_bytes());
        data[6..8].copy_from_slice(&speed.to_le_bytes());
        data
    }

    fn counter_page(page: u8, time: u16, count: u16) -> [u8; 8] {
        let mut data = [page, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        data[4..6].copy_from_slice(&time.to_le_bytes());
        data[6..8].copy_from_slice(&count.to_le_bytes());
        data
    }

    #[test]
    fn test_speed_cadence_page_parse() {
        let page = SpeedCadencePage::parse(&sc_page(1, 2, 3, 4)).unwrap();
        assert_eq!(page.cadence_event_time, 1);
        assert_eq!(page.cadence_revolutions, 2);
        assert_eq!(page.speed_event_time, 3);
        assert_eq!(page.wheel_revolutions, 4);
    }

    #[test]
    fn test_combined_first_sample_is_baseline() {
        let mut state = SpeedCadenceState::default();
        let mut reading = SensorReading::new(DeviceIdentity::new(2, 0x79));
        let now = Instant::now();

        state.decode(&sc_page(1000, 10, 1000, 50), &mut reading, &ctx(RecordingStatus::Start), now);
        assert_eq!(reading.speed, Some(0.0));
        assert_eq!(reading.cadence, Some(0.0));
        assert_eq!(reading.distance, 0.0);
        assert_eq!(reading.timestamp, None);
    }

    #[test]
    fn test_combined_rates() {
        let mut state = SpeedCadenceState::default();
        let mut reading = SensorReading::new(DeviceIdentity::new(2, 0x79));
        let ctx = ctx(RecordingStatus::Start);
        let now = Instant::now();

        state.decode(&sc_page(65000, 10, 65000, 50), &mut reading, &ctx, now);
        // both times wrap: 65000 + 1024 = 488 (mod 65536)
        state.decode(&sc_page(488, 12, 488, 53), &mut reading, &ctx, now);

        assert!((reading.speed.unwrap() - 6.315).abs() < 1e-9);
        assert!((reading.cadence.unwrap() - 120.0).abs() < 1e-9);
        assert!((reading.distance - 6.315).abs() < 1e-9);
        assert_eq!(reading.timestamp, Some(now));
    }

    #[test]
    fn test_combined_idle_reports_zero() {
        let mut state = SpeedCadenceState::default();
        let mut reading = SensorReading::new(DeviceIdentity::new(2, 0x79));
        let ctx = ctx(RecordingStatus::Start);
        let now = Instant::now();

        state.decode(&sc_page(0, 0, 0, 0), &mut reading, &ctx, now);
        state.decode(&sc_page(1024, 2, 1024, 3), &mut reading, &ctx, now);
        state.decode(&sc_page(1024, 2, 1024, 3), &mut reading, &ctx, now);
        assert_eq!(reading.speed, Some(0.0));
        assert_eq!(reading.cadence, Some(0.0));
    }

    #[test]
    fn test_combined_rejects_corrupt_deltas() {
        let mut state = SpeedCadenceState::default();
        let mut reading = SensorReading::new(DeviceIdentity::new(2, 0x79));
        let ctx = ctx(RecordingStatus::Start);
        let now = Instant::now();

        state.decode(&sc_page(0, 0, 0, 0), &mut reading, &ctx, now);
        state.decode(&sc_page(1024, 2, 1024, 3), &mut reading, &ctx, now);
        let distance = reading.distance;

        // revolution count jumps by 7000 in one second
        state.decode(&sc_page(2048, 4, 2048, 7003), &mut reading, &ctx, now);
        assert!((reading.speed.unwrap() - 6.315).abs() < 1e-9);
        assert_eq!(reading.distance, distance);
        assert_eq!(reading.rejected_samples, 1);
    }

    #[test]
    fn test_distance_only_while_recording() {
        let mut state = SpeedCadenceState::default();
        let mut reading = SensorReading::new(DeviceIdentity::new(2, 0x79));
        let now = Instant::now();

        state.decode(&sc_page(0, 0, 0, 0), &mut reading, &ctx(RecordingStatus::Init), now);
        state.decode(&sc_page(0, 0, 1024, 3), &mut reading, &ctx(RecordingStatus::Init), now);
        assert_eq!(reading.distance, 0.0);
        assert!(reading.speed.unwrap() > 0.0);

        state.decode(&sc_page(0, 0, 2048, 6), &mut reading, &ctx(RecordingStatus::Stop), now);
        assert_eq!(reading.distance, 0.0);
    }

    #[test]
    fn test_cadence_only() {
        let mut state = EventCounterState::cadence();
        let mut reading = SensorReading::new(DeviceIdentity::new(3, 0x7A));
        let ctx = ctx(RecordingStatus::Start);
        let now = Instant::now();

        state.decode(&counter_page(0, 100, 5), &mut reading, &ctx, now);
        assert_eq!(reading.cadence, Some(0.0));
        state.decode(&counter_page(0, 1124, 7), &mut reading, &ctx, now);
        assert!((reading.cadence.unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(reading.speed, None);
        assert_eq!(reading.distance, 0.0);
    }

    #[test]
    fn test_speed_only_distance() {
        let mut state = EventCounterState::speed();
        let mut reading = SensorReading::new(DeviceIdentity::new(4, 0x7B));
        let ctx = ctx(RecordingStatus::Start);
        let now = Instant::now();

        state.decode(&counter_page(0, 65535, 65535), &mut reading, &ctx, now);
        state.decode(&counter_page(0, 1023, 2), &mut reading, &ctx, now);
        assert!((reading.speed.unwrap() - 2.105 * 3.0).abs() < 1e-9);
        assert!((reading.distance - 2.105 * 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_background_pages() {
        let mut state = EventCounterState::speed();
        let mut reading = SensorReading::new(DeviceIdentity::new(4, 0x7B));
        let ctx = ctx(RecordingStatus::Init);
        let now = Instant::now();

        state.decode(&[0x82, 89, 0x34, 0x12, 0, 0, 0, 0], &mut reading, &ctx, now);
        assert_eq!(reading.info.manufacturer_id, Some(89));
        assert_eq!(reading.info.manufacturer_name, Some("tacx"));
        assert_eq!(reading.info.serial_number, Some(0x1234));

        state.decode(&[0x83, 2, 15, 9, 0, 0, 0, 0], &mut reading, &ctx, now);
        assert_eq!(reading.info.hardware_version, Some(2));
        assert_eq!(reading.info.software_version, Some(15.0));
        assert_eq!(reading.info.model_number, Some(9));

        state.decode(&[0x84, 0xFF, 0x00, 0x43, 0, 0, 0, 0], &mut reading, &ctx, now);
        assert_eq!(reading.info.battery_status, Some(BatteryStatus::Low));
        assert_eq!(reading.info.battery_voltage, Some(3.0));
    }
}
