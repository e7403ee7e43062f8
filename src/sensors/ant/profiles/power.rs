//! ANT+ Cycling Power Profile
//!
//! Implements the ANT+ Cycling Power device profile for power meters.
//! Device Type: 11

use super::{decode_common_page, reject, AntProfilePage, PAGE_LEN};
use crate::sensors::ant::accumulator::{
    accumulate, gate_rate, CounterSnapshot, DecodeContext, MalformedSample, Metric, RateOutcome,
    MODULUS_U16, MODULUS_U8,
};
use crate::sensors::types::SensorReading;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

pub const PAGE_STANDARD_POWER: u8 = 0x10;
pub const PAGE_WHEEL_TORQUE: u8 = 0x11;
pub const PAGE_CRANK_TORQUE: u8 = 0x12;
pub const PAGE_TORQUE_EFFECTIVENESS: u8 = 0x13;

/// Pioneer SGY-PM910Z keeps counting accumulated power while coasting in
/// power-meter mode, so its out-of-range crank samples are expected.
const PIONEER_MANUFACTURER_ID: u16 = 48;
const PIONEER_PM910Z_MODEL: u16 = 910;

/// Power-only data page (Page 0x10 / 16)
#[derive(Debug, Clone)]
pub struct PowerOnlyPage {
    /// Update event count (wraps at 255)
    pub event_count: u8,
    /// Raw pedal power balance byte
    pub balance: u8,
    /// Instantaneous cadence
    pub cadence: u8,
    /// Accumulated power (wraps at 65535)
    pub accumulated_power: u16,
    /// Instantaneous power in watts
    pub instantaneous_power: u16,
}

impl PowerOnlyPage {
    /// Right pedal percentage, when the meter reports a balance.
    pub fn right_balance(&self) -> Option<u8> {
        if self.balance < 0xFF && self.balance & 0x80 != 0 {
            Some(self.balance & 0x7F)
        } else {
            None
        }
    }
}

impl AntProfilePage for PowerOnlyPage {
    fn page_number(&self) -> u8 {
        PAGE_STANDARD_POWER
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_STANDARD_POWER {
            return None;
        }

        Some(Self {
            event_count: data[1],
            balance: data[2],
            cadence: data[3],
            accumulated_power: u16::from_le_bytes([data[4], data[5]]),
            instantaneous_power: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

/// Wheel torque data page (Page 0x11 / 17)
#[derive(Debug, Clone)]
pub struct WheelTorquePage {
    /// Update event count
    pub event_count: u8,
    /// Wheel ticks (revolutions)
    pub wheel_ticks: u8,
    /// Accumulated wheel period (1/2048 second units)
    pub wheel_period: u16,
    /// Accumulated power term (1/32 Nm units)
    pub accumulated_power: u16,
}

impl AntProfilePage for WheelTorquePage {
    fn page_number(&self) -> u8 {
        PAGE_WHEEL_TORQUE
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_WHEEL_TORQUE {
            return None;
        }

        Some(Self {
            event_count: data[1],
            wheel_ticks: data[2],
            wheel_period: u16::from_le_bytes([data[4], data[5]]),
            accumulated_power: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

/// Crank torque data page (Page 0x12 / 18)
#[derive(Debug, Clone)]
pub struct CrankTorquePage {
    /// Instantaneous cadence
    pub cadence: u8,
    /// Accumulated crank period (1/2048 second units)
    pub crank_period: u16,
    /// Accumulated power term (1/32 Nm units)
    pub accumulated_power: u16,
}

impl AntProfilePage for CrankTorquePage {
    fn page_number(&self) -> u8 {
        PAGE_CRANK_TORQUE
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_CRANK_TORQUE {
            return None;
        }

        Some(Self {
            cadence: data[3],
            crank_period: u16::from_le_bytes([data[4], data[5]]),
            accumulated_power: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

/// Torque effectiveness and pedal smoothness page (Page 0x13 / 19)
#[derive(Debug, Clone)]
pub struct TorqueEffectivenessPage {
    /// Left torque effectiveness (0-100%)
    pub left_torque_effectiveness: Option<f64>,
    /// Right torque effectiveness (0-100%)
    pub right_torque_effectiveness: Option<f64>,
    /// Left pedal smoothness (0-100%)
    pub left_pedal_smoothness: Option<f64>,
    /// Right pedal smoothness (0-100%)
    pub right_pedal_smoothness: Option<f64>,
}

impl AntProfilePage for TorqueEffectivenessPage {
    fn page_number(&self) -> u8 {
        PAGE_TORQUE_EFFECTIVENESS
    }

    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PAGE_LEN || data[0] != PAGE_TORQUE_EFFECTIVENESS {
            return None;
        }

        let parse_percent = |b: u8| -> Option<f64> {
            if b == 0xFF {
                None
            } else {
                Some(b as f64 / 2.0)
            }
        };

        Some(Self {
            left_torque_effectiveness: parse_percent(data[2]),
            right_torque_effectiveness: parse_percent(data[3]),
            left_pedal_smoothness: parse_percent(data[4]),
            right_pedal_smoothness: parse_percent(data[5]),
        })
    }
}

/// Rolling state of one power page
#[derive(Debug, Clone)]
struct PageTracker<const N: usize> {
    snapshot: CounterSnapshot<N>,
    last_payload: Option<Instant>,
}

impl<const N: usize> PageTracker<N> {
    fn new(moduli: [i64; N]) -> Self {
        Self {
            snapshot: CounterSnapshot::new(moduli),
            last_payload: None,
        }
    }

    /// Advance to `current`, returning the deltas and the time since the
    /// previous payload of this page.
    fn advance(&mut self, current: [i64; N], now: Instant) -> Option<([i64; N], Duration)> {
        let elapsed = self
            .last_payload
            .map(|last| now.saturating_duration_since(last));
        self.last_payload = Some(now);
        let deltas = self.snapshot.advance(current)?;
        Some((deltas, elapsed.unwrap_or_default()))
    }

    fn reset(&mut self) {
        self.snapshot.reset();
        self.last_payload = None;
    }
}

/// A non-idle sample arriving after the stall cutoff spans an unknown
/// stretch of counting and is discarded.
fn stale_sample(metric: Metric, deltas: &[i64], elapsed: Duration, ctx: &DecodeContext) -> Option<MalformedSample> {
    if elapsed >= ctx.stall.cutoff && deltas.iter().any(|d| *d != 0) {
        Some(MalformedSample::Stale {
            metric,
            elapsed_secs: elapsed.as_secs_f64(),
        })
    } else {
        None
    }
}

/// Power meter decode state, one tracker per main data page
#[derive(Debug, Clone)]
pub struct PowerState {
    /// event count, accumulated power
    standard: PageTracker<2>,
    /// wheel period, accumulated power, event count, wheel ticks
    wheel: PageTracker<4>,
    /// crank period, accumulated power
    crank: PageTracker<2>,
}

impl Default for PowerState {
    fn default() -> Self {
        Self {
            standard: PageTracker::new([MODULUS_U8, MODULUS_U16]),
            wheel: PageTracker::new([MODULUS_U16, MODULUS_U16, MODULUS_U8, MODULUS_U8]),
            crank: PageTracker::new([MODULUS_U16, MODULUS_U16]),
        }
    }
}

impl PowerState {
    pub fn decode(
        &mut self,
        data: &[u8],
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        reading.last_data_at = Some(now);
        match data.first().copied() {
            Some(PAGE_STANDARD_POWER) => {
                if let Some(page) = PowerOnlyPage::parse(data) {
                    self.decode_standard(&page, reading, ctx, now);
                }
            }
            Some(PAGE_WHEEL_TORQUE) => {
                if let Some(page) = WheelTorquePage::parse(data) {
                    self.decode_wheel_torque(&page, reading, ctx, now);
                }
            }
            Some(PAGE_CRANK_TORQUE) => {
                if let Some(page) = CrankTorquePage::parse(data) {
                    self.decode_crank_torque(&page, reading, ctx, now);
                }
            }
            Some(PAGE_TORQUE_EFFECTIVENESS) => {
                if let Some(page) = TorqueEffectivenessPage::parse(data) {
                    let pedal = &mut reading.pedal;
                    pedal.torque_effectiveness_left = page.left_torque_effectiveness;
                    pedal.torque_effectiveness_right = page.right_torque_effectiveness;
                    pedal.pedal_smoothness_left = page.left_pedal_smoothness;
                    pedal.pedal_smoothness_right = page.right_pedal_smoothness;
                }
            }
            Some(page) => {
                if !decode_common_page(data, &mut reading.info) {
                    tracing::trace!("ANT+ {} power page 0x{:02X} ignored", reading.identity, page);
                }
            }
            None => {}
        }
    }

    fn decode_standard(
        &mut self,
        page: &PowerOnlyPage,
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        let current = [page.event_count as i64, page.accumulated_power as i64];
        let Some(([event_delta, power_delta], elapsed)) = self.standard.advance(current, now) else {
            reading.standard_power.power = Some(0.0);
            return;
        };

        if let Some(sample) = stale_sample(Metric::Power, &[event_delta, power_delta], elapsed, ctx) {
            reject(reading, sample);
            return;
        }

        let previous = reading.standard_power.power;
        match gate_rate(Metric::Power, event_delta, power_delta, MODULUS_U16, previous, |t, v| {
            v / t
        }) {
            RateOutcome::Idle => {
                let sp = &mut reading.standard_power;
                sp.power = Some(0.0);
                sp.power_16_simple = Some(0);
                sp.cadence = Some(0);
                sp.power_left = Some(0.0);
                sp.power_right = Some(0.0);
                sp.lr_balance = None;
            }
            RateOutcome::Accepted(power) => {
                let sp = &mut reading.standard_power;
                sp.power = Some(power);
                sp.power_16_simple = Some(page.instantaneous_power);
                sp.cadence = Some(page.cadence);
                accumulate(
                    &mut sp.accumulated_power,
                    power * elapsed.as_secs_f64(),
                    ctx.recording,
                );
                if let Some(right) = page.right_balance() {
                    let power_right = power * right as f64 / 100.0;
                    sp.power_right = Some(power_right);
                    sp.power_left = Some(power - power_right);
                    sp.lr_balance = Some((100u8.saturating_sub(right), right));
                }
                sp.timestamp = Some(now);
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }
    }

    fn decode_wheel_torque(
        &mut self,
        page: &WheelTorquePage,
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        let current = [
            page.wheel_period as i64,
            page.accumulated_power as i64,
            page.event_count as i64,
            page.wheel_ticks as i64,
        ];
        let Some((deltas, elapsed)) = self.wheel.advance(current, now) else {
            reading.wheel_torque.power = Some(0.0);
            return;
        };
        let [period_delta, power_delta, _event_delta, tick_delta] = deltas;

        if let Some(sample) = stale_sample(Metric::Power, &deltas, elapsed, ctx) {
            reject(reading, sample);
            return;
        }

        let previous = reading.wheel_torque.power;
        match gate_rate(Metric::Power, period_delta, power_delta, MODULUS_U16, previous, |t, v| {
            128.0 * PI * v / t
        }) {
            RateOutcome::Idle => reading.wheel_torque.power = Some(0.0),
            RateOutcome::Accepted(power) => {
                let wt = &mut reading.wheel_torque;
                wt.power = Some(power);
                accumulate(
                    &mut wt.accumulated_power,
                    128.0 * PI * power_delta as f64 / 2048.0,
                    ctx.recording,
                );
                wt.timestamp = Some(now);
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }

        // Limits are in m/s; the page reports km/h.
        let circumference = ctx.wheel_circumference;
        let previous = reading.wheel_torque.speed_kmh.map(|kmh| kmh / 3.6);
        match gate_rate(Metric::Speed, period_delta, tick_delta, MODULUS_U8, previous, |t, v| {
            circumference * v * 2048.0 / t
        }) {
            RateOutcome::Idle => reading.wheel_torque.speed_kmh = Some(0.0),
            RateOutcome::Accepted(speed) => {
                let wt = &mut reading.wheel_torque;
                wt.speed_kmh = Some(speed * 3.6);
                accumulate(
                    &mut wt.distance,
                    circumference * tick_delta as f64,
                    ctx.recording,
                );
                wt.timestamp = Some(now);
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }
    }

    fn decode_crank_torque(
        &mut self,
        page: &CrankTorquePage,
        reading: &mut SensorReading,
        ctx: &DecodeContext,
        now: Instant,
    ) {
        let current = [page.crank_period as i64, page.accumulated_power as i64];
        let Some(([period_delta, power_delta], elapsed)) = self.crank.advance(current, now) else {
            reading.crank_torque.power = Some(0.0);
            return;
        };

        if let Some(sample) = stale_sample(Metric::Power, &[period_delta, power_delta], elapsed, ctx) {
            reject(reading, sample);
            return;
        }

        let previous = reading.crank_torque.power;
        match gate_rate(Metric::Power, period_delta, power_delta, MODULUS_U16, previous, |t, v| {
            128.0 * PI * v / t
        }) {
            RateOutcome::Idle => {
                reading.crank_torque.power = Some(0.0);
                reading.crank_torque.cadence = Some(0);
            }
            RateOutcome::Accepted(power) => {
                let ct = &mut reading.crank_torque;
                ct.power = Some(power);
                ct.cadence = Some(page.cadence);
                accumulate(
                    &mut ct.accumulated_power,
                    128.0 * PI * power_delta as f64 / 2048.0,
                    ctx.recording,
                );
                ct.timestamp = Some(now);
                reading.timestamp = Some(now);
            }
            RateOutcome::Rejected(MalformedSample::OutOfRange { .. }) if is_pioneer_pm910z(reading) => {
                tracing::trace!("ANT+ {} coasting counters ignored", reading.identity);
            }
            RateOutcome::Rejected(sample) => reject(reading, sample),
        }
    }

    pub fn reset(&mut self) {
        self.standard.reset();
        self.wheel.reset();
        self.crank.reset();
    }
}

fn is_pioneer_pm910z(reading: &SensorReading) -> bool {
    reading.info.manufacturer_id == Some(PIONEER_MANUFACTURER_ID)
        && reading.info.model_number == Some(PIONEER_PM910Z_MODEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ant::accumulator::StallPolicy;
    use crate::sensors::types::{DeviceIdentity, RecordingStatus};

    fn ctx(recording: RecordingStatus) -> DecodeContext {
        DecodeContext {
            wheel_circumference: 2.105,
            recording,
            stall: StallPolicy::default(),
        }
    }

    fn reading() -> SensorReading {
        SensorReading::new(DeviceIdentity::new(1111, 0x0B))
    }

    fn standard(event: u8, balance: u8, cadence: u8, acc: u16, inst: u16) -> [u8; 8] {
        let mut data = [0x10, event, balance, cadence, 0, 0, 0, 0];
        data[4..6].copy_from_slice(&acc.to_le_bytes());
        data[6..8].copy_from_slice(&inst.to_le_bytes());
        data
    }

    fn crank(cadence: u8, period: u16, acc: u16) -> [u8; 8] {
        let mut data = [0x12, 0, 0, cadence, 0, 0, 0, 0];
        data[4..6].copy_from_slice(&period.to_le_bytes());
        data[6..8].copy_from_slice(&acc.to_le_bytes());
        data
    }

    fn wheel(event: u8, ticks: u8, period: u16, acc: u16) -> [u8; 8] {
        let mut data = [0x11, event, ticks, 0xFF, 0, 0, 0, 0];
        data[4..6].copy_from_slice(&period.to_le_bytes());
        data[6..8].copy_from_slice(&acc.to_le_bytes());
        data
    }

    #[test]
    fn test_power_only_page_parse() {
        let page = PowerOnlyPage::parse(&standard(5, 0xB2, 90, 0x1234, 250)).unwrap();
        assert_eq!(page.event_count, 5);
        assert_eq!(page.right_balance(), Some(50));
        assert_eq!(page.cadence, 90);
        assert_eq!(page.accumulated_power, 0x1234);
        assert_eq!(page.instantaneous_power, 250);

        assert_eq!(PowerOnlyPage::parse(&standard(5, 0xFF, 0, 0, 0)).unwrap().right_balance(), None);
        assert_eq!(PowerOnlyPage::parse(&standard(5, 0x32, 0, 0, 0)).unwrap().right_balance(), None);
    }

    #[test]
    fn test_standard_power_and_work() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&standard(1, 0xFF, 80, 100, 0), &mut reading, &ctx, t0);
        assert_eq!(reading.standard_power.power, Some(0.0));

        state.decode(&standard(2, 0xFF, 85, 120, 21), &mut reading, &ctx, t0 + Duration::from_secs(1));
        assert_eq!(reading.standard_power.power, Some(20.0));
        assert_eq!(reading.standard_power.power_16_simple, Some(21));
        assert_eq!(reading.standard_power.cadence, Some(85));
        assert!((reading.standard_power.accumulated_power - 20.0).abs() < 1e-9);
        assert_eq!(reading.power(), Some(20.0));
        assert_eq!(reading.standard_power.lr_balance_label(), ":");
    }

    #[test]
    fn test_standard_power_balance() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Init);
        let t0 = Instant::now();

        state.decode(&standard(255, 0xFF, 80, 65500, 0), &mut reading, &ctx, t0);
        // event count and accumulated power both roll over
        state.decode(&standard(1, 0x80 | 40, 80, 164, 200), &mut reading, &ctx, t0 + Duration::from_millis(500));
        assert_eq!(reading.standard_power.power, Some(100.0));
        assert_eq!(reading.standard_power.power_right, Some(40.0));
        assert_eq!(reading.standard_power.power_left, Some(60.0));
        assert_eq!(reading.standard_power.lr_balance_label(), "60:40");
        assert_eq!(reading.standard_power.accumulated_power, 0.0);
    }

    #[test]
    fn test_standard_power_spike_keeps_previous() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&standard(0, 0xFF, 80, 0, 0), &mut reading, &ctx, t0);
        state.decode(&standard(1, 0xFF, 80, 100, 0), &mut reading, &ctx, t0 + Duration::from_secs(1));
        assert_eq!(reading.standard_power.power, Some(100.0));
        let work = reading.standard_power.accumulated_power;

        state.decode(&standard(2, 0xFF, 80, 800, 0), &mut reading, &ctx, t0 + Duration::from_secs(2));
        assert_eq!(reading.standard_power.power, Some(100.0));
        assert_eq!(reading.standard_power.accumulated_power, work);
        assert_eq!(reading.rejected_samples, 1);
    }

    #[test]
    fn test_standard_power_idle() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&standard(0, 0xFF, 80, 0, 0), &mut reading, &ctx, t0);
        state.decode(&standard(1, 0x80 | 50, 80, 100, 0), &mut reading, &ctx, t0 + Duration::from_secs(1));
        state.decode(&standard(1, 0x80 | 50, 80, 100, 0), &mut reading, &ctx, t0 + Duration::from_secs(2));
        assert_eq!(reading.standard_power.power, Some(0.0));
        assert_eq!(reading.standard_power.cadence, Some(0));
        assert_eq!(reading.standard_power.lr_balance, None);
    }

    #[test]
    fn test_stale_sample_rejected() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&standard(0, 0xFF, 80, 0, 0), &mut reading, &ctx, t0);
        state.decode(&standard(1, 0xFF, 80, 100, 0), &mut reading, &ctx, t0 + Duration::from_secs(90));
        assert_eq!(reading.standard_power.power, Some(0.0));
        assert_eq!(reading.standard_power.accumulated_power, 0.0);
        assert_eq!(reading.rejected_samples, 1);

        // the stale payload became the new baseline
        state.decode(&standard(2, 0xFF, 80, 150, 0), &mut reading, &ctx, t0 + Duration::from_secs(91));
        assert_eq!(reading.standard_power.power, Some(50.0));
    }

    #[test]
    fn test_crank_torque() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&crank(90, 0, 0), &mut reading, &ctx, t0);
        state.decode(&crank(90, 2048, 1), &mut reading, &ctx, t0 + Duration::from_secs(1));
        let expected = 128.0 * PI / 2048.0;
        assert!((reading.crank_torque.power.unwrap() - expected).abs() < 1e-9);
        assert_eq!(reading.crank_torque.cadence, Some(90));
        assert!((reading.crank_torque.accumulated_power - expected).abs() < 1e-9);
    }

    #[test]
    fn test_pioneer_out_of_range_not_counted() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        // period stands still while accumulated power grows
        state.decode(&crank(0, 100, 0), &mut reading, &ctx, t0);
        state.decode(&crank(0, 100, 10), &mut reading, &ctx, t0);
        assert_eq!(reading.rejected_samples, 1);

        state.decode(&[0x50, 0xFF, 0xFF, 1, 48, 0, 0x8E, 0x03], &mut reading, &ctx, t0);
        assert_eq!(reading.info.manufacturer_name, Some("pioneer"));
        state.decode(&crank(0, 100, 20), &mut reading, &ctx, t0);
        assert_eq!(reading.rejected_samples, 1);
    }

    #[test]
    fn test_wheel_torque_speed_and_distance() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Start);
        let t0 = Instant::now();

        state.decode(&wheel(0, 0, 0, 0), &mut reading, &ctx, t0);
        state.decode(&wheel(1, 3, 2048, 16), &mut reading, &ctx, t0 + Duration::from_secs(1));

        let wt = &reading.wheel_torque;
        assert!((wt.speed_kmh.unwrap() - 3.6 * 2.105 * 3.0).abs() < 1e-9);
        assert!((wt.distance - 2.105 * 3.0).abs() < 1e-9);
        assert!((wt.power.unwrap() - 128.0 * PI * 16.0 / 2048.0).abs() < 1e-9);
        assert!((wt.accumulated_power - 128.0 * PI * 16.0 / 2048.0).abs() < 1e-9);
    }

    #[test]
    fn test_torque_effectiveness() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let ctx = ctx(RecordingStatus::Init);

        state.decode(&[0x13, 1, 100, 0xFF, 61, 80, 0xFF, 0xFF], &mut reading, &ctx, Instant::now());
        assert_eq!(reading.pedal.torque_effectiveness_label(), "50%/--%");
        assert_eq!(reading.pedal.pedal_smoothness_label(), "30%/40%");
    }

    #[test]
    fn test_unknown_page_ignored() {
        let mut state = PowerState::default();
        let mut reading = reading();
        let before = reading.clone();
        let now = Instant::now();

        state.decode(&[0x20, 1, 2, 3, 4, 5, 6, 7], &mut reading, &ctx(RecordingStatus::Start), now);
        assert_eq!(reading.last_data_at, Some(now));
        assert_eq!(reading.standard_power, before.standard_power);
        assert_eq!(reading.info, before.info);
    }
}
