//! Rolling hardware counters to calibrated rates.
//!
//! ANT+ sensors report free-running 8-bit and 16-bit counters. Rates come
//! from the difference of two consecutive samples, corrected for rollover,
//! then pass a sanity ceiling and a spike check before they reach a reading.

use crate::sensors::types::{RecordingFlag, RecordingStatus};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Modulus of an 8-bit counter
pub const MODULUS_U8: i64 = 256;

/// Modulus of a 16-bit counter
pub const MODULUS_U16: i64 = 65536;

/// Largest plausible revolution-count delta on speed/cadence pages
pub const MAX_EVENT_DELTA: i64 = 6552;

/// Default idle interval after which a rate is considered stalled
pub const DEFAULT_STALL_CUTOFF: Duration = Duration::from_secs(60);

/// Wraparound-corrected difference between two counter samples.
pub fn wrapping_delta(current: i64, previous: i64, modulus: i64) -> i64 {
    let delta = current - previous;
    if delta < 0 {
        delta + modulus
    } else {
        delta
    }
}

/// Last raw counters reported by a device.
///
/// `None` until the first sample establishes the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot<const N: usize> {
    moduli: [i64; N],
    previous: Option<[i64; N]>,
}

impl<const N: usize> CounterSnapshot<N> {
    pub fn new(moduli: [i64; N]) -> Self {
        Self {
            moduli,
            previous: None,
        }
    }

    /// Store `current` and return the deltas against the previous sample,
    /// or `None` when this sample only sets the baseline.
    pub fn advance(&mut self, current: [i64; N]) -> Option<[i64; N]> {
        let deltas = self.previous.map(|previous| {
            let mut deltas = [0i64; N];
            for i in 0..N {
                deltas[i] = wrapping_delta(current[i], previous[i], self.moduli[i]);
            }
            deltas
        });
        self.previous = Some(current);
        deltas
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Rate kinds with their own plausibility limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// m/s
    Speed,
    /// rpm
    Cadence,
    /// W
    Power,
}

impl Metric {
    /// Upper bound of the persisted activity format.
    pub fn ceiling(&self) -> f64 {
        match self {
            Metric::Speed => 65.0,
            Metric::Cadence => 255.0,
            Metric::Power => 65535.0,
        }
    }

    /// Largest accepted increase over the previous value.
    pub fn spike_threshold(&self) -> f64 {
        match self {
            Metric::Speed => 15.0,
            Metric::Cadence => 255.0,
            Metric::Power => 500.0,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Speed => write!(f, "speed"),
            Metric::Cadence => write!(f, "cadence"),
            Metric::Power => write!(f, "power"),
        }
    }
}

/// A sample discarded before it could reach a reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedSample {
    #[error("{metric} deltas out of range: time {time_delta}, value {value_delta}")]
    OutOfRange {
        metric: Metric,
        time_delta: i64,
        value_delta: i64,
    },

    #[error("{metric} {value:.2} above ceiling {ceiling}")]
    AboveCeiling {
        metric: Metric,
        value: f64,
        ceiling: f64,
    },

    #[error("{metric} spike: value {value:.0}, previous {previous:.0}")]
    Spike {
        metric: Metric,
        value: f64,
        previous: f64,
    },

    #[error("{metric} sample after {elapsed_secs:.1}s idle")]
    Stale { metric: Metric, elapsed_secs: f64 },
}

/// Result of gating one computed rate.
#[derive(Debug, Clone, PartialEq)]
pub enum RateOutcome {
    /// Both counters unchanged; the sensor is idle and the rate is zero
    Idle,
    /// Rate passed every check
    Accepted(f64),
    /// Previous value must be kept
    Rejected(MalformedSample),
}

/// Check a computed rate against the ceiling and the spike threshold.
///
/// Only increases are compared with the threshold; drops always pass.
pub fn check_rate(metric: Metric, value: f64, previous: Option<f64>) -> RateOutcome {
    if !value.is_finite() || value > metric.ceiling() {
        return RateOutcome::Rejected(MalformedSample::AboveCeiling {
            metric,
            value,
            ceiling: metric.ceiling(),
        });
    }

    let previous = previous.unwrap_or(0.0);
    if value - previous >= metric.spike_threshold() {
        return RateOutcome::Rejected(MalformedSample::Spike {
            metric,
            value,
            previous,
        });
    }

    RateOutcome::Accepted(value)
}

/// Gate a counter pair and compute its rate.
///
/// `rate` receives the time delta and value delta as floats and is only
/// called when both are plausible.
pub fn gate_rate<F>(
    metric: Metric,
    time_delta: i64,
    value_delta: i64,
    max_value_delta: i64,
    previous: Option<f64>,
    rate: F,
) -> RateOutcome
where
    F: FnOnce(f64, f64) -> f64,
{
    if time_delta == 0 && value_delta == 0 {
        return RateOutcome::Idle;
    }

    if time_delta <= 0 || value_delta < 0 || value_delta > max_value_delta {
        return RateOutcome::Rejected(MalformedSample::OutOfRange {
            metric,
            time_delta,
            value_delta,
        });
    }

    check_rate(metric, rate(time_delta as f64, value_delta as f64), previous)
}

/// Add `amount` to `total` only while recording.
pub fn accumulate(total: &mut f64, amount: f64, recording: RecordingStatus) {
    if recording == RecordingStatus::Start && amount.is_finite() && amount > 0.0 {
        *total += amount;
    }
}

/// When a rate whose counters stopped arriving should read as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallPolicy {
    pub cutoff: Duration,
    /// Report stalled rates as zero to pollers
    pub zero_on_stall: bool,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_STALL_CUTOFF,
            zero_on_stall: false,
        }
    }
}

impl StallPolicy {
    /// Whether a sample last seen at `last` is stalled at `now`.
    pub fn is_stalled(&self, last: Option<Instant>, now: Instant) -> bool {
        match last {
            Some(last) => now.saturating_duration_since(last) >= self.cutoff,
            None => false,
        }
    }
}

/// Per-sample inputs that come from outside the device.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// Wheel circumference in meters
    pub wheel_circumference: f64,
    pub recording: RecordingStatus,
    pub stall: StallPolicy,
}

/// Shared, cloneable source of [`DecodeContext`]s.
#[derive(Debug, Clone)]
pub struct DecodeEnv {
    pub wheel_circumference: f64,
    pub recording: RecordingFlag,
    pub stall: StallPolicy,
}

impl DecodeEnv {
    pub fn new(wheel_circumference: f64, recording: RecordingFlag, stall: StallPolicy) -> Self {
        Self {
            wheel_circumference,
            recording,
            stall,
        }
    }

    /// Snapshot for one payload.
    pub fn context(&self) -> DecodeContext {
        DecodeContext {
            wheel_circumference: self.wheel_circumference,
            recording: self.recording.get(),
            stall: self.stall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_delta_16bit() {
        assert_eq!(wrapping_delta(4, 65530, MODULUS_U16), 10);
        assert_eq!(wrapping_delta(100, 40, MODULUS_U16), 60);
    }

    #[test]
    fn test_wrapping_delta_8bit() {
        assert_eq!(wrapping_delta(2, 250, MODULUS_U8), 8);
        assert_eq!(wrapping_delta(0, 0, MODULUS_U8), 0);
    }

    #[test]
    fn test_snapshot_baseline_then_delta() {
        let mut snapshot = CounterSnapshot::new([MODULUS_U8, MODULUS_U16]);
        assert!(!snapshot.has_baseline());
        assert_eq!(snapshot.advance([255, 65000]), None);
        assert_eq!(snapshot.advance([1, 100]), Some([2, 636]));

        snapshot.reset();
        assert_eq!(snapshot.advance([5, 5]), None);
    }

    #[test]
    fn test_spike_rejection() {
        match check_rate(Metric::Power, 700.0, Some(100.0)) {
            RateOutcome::Rejected(MalformedSample::Spike { value, previous, .. }) => {
                assert_eq!(value, 700.0);
                assert_eq!(previous, 100.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_drops_are_not_spikes() {
        assert_eq!(
            check_rate(Metric::Power, 10.0, Some(900.0)),
            RateOutcome::Accepted(10.0)
        );
    }

    #[test]
    fn test_ceiling() {
        assert!(matches!(
            check_rate(Metric::Speed, 70.0, Some(64.0)),
            RateOutcome::Rejected(MalformedSample::AboveCeiling { .. })
        ));
        assert!(matches!(
            check_rate(Metric::Cadence, f64::INFINITY, None),
            RateOutcome::Rejected(MalformedSample::AboveCeiling { .. })
        ));
    }

    #[test]
    fn test_gate_idle_and_out_of_range() {
        let rate = |t: f64, v: f64| v / t;
        assert_eq!(
            gate_rate(Metric::Cadence, 0, 0, MAX_EVENT_DELTA, None, rate),
            RateOutcome::Idle
        );
        assert!(matches!(
            gate_rate(Metric::Cadence, 0, 3, MAX_EVENT_DELTA, None, rate),
            RateOutcome::Rejected(MalformedSample::OutOfRange { .. })
        ));
        assert!(matches!(
            gate_rate(Metric::Cadence, 1024, 7000, MAX_EVENT_DELTA, None, rate),
            RateOutcome::Rejected(MalformedSample::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_gate_speed_example() {
        let outcome = gate_rate(Metric::Speed, 1024, 3, MAX_EVENT_DELTA, None, |t, v| {
            2.105 * v * 1024.0 / t
        });
        match outcome {
            RateOutcome::Accepted(speed) => assert!((speed - 6.315).abs() < 1e-9),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_accumulate_gated() {
        let mut total = 0.0;
        accumulate(&mut total, 10.0, RecordingStatus::Init);
        accumulate(&mut total, 10.0, RecordingStatus::Stop);
        assert_eq!(total, 0.0);
        accumulate(&mut total, 10.0, RecordingStatus::Start);
        accumulate(&mut total, 5.0, RecordingStatus::Start);
        assert_eq!(total, 15.0);
    }

    #[test]
    fn test_stall_policy() {
        let policy = StallPolicy::default();
        let now = Instant::now();
        assert!(!policy.is_stalled(None, now));
        assert!(!policy.is_stalled(Some(now), now));
        assert!(policy.is_stalled(Some(now), now + Duration::from_secs(61)));
    }
}
