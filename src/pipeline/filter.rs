/// Per-(device, measurement-type) reporting decisions.
use crate::models::{Event, MeasurementType, Value};

/// How readings of a measurement type qualify for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    /// Report when any scalar component moved at least `threshold` away
    /// from the last reported value.
    OnChange { threshold: f64 },
    /// Report once per `period`-second bucket, timestamped at the start
    /// of the bucket that just completed.
    OnInterval { period: f64 },
    /// Report state transitions (buttons, binary sensors).
    OnTransition,
}

#[derive(Debug)]
enum FilterState {
    /// Last reported value. Starts as a zero of the value's shape, so the
    /// very first reading is reported when it is at least `threshold`
    /// away from zero. Preserved reference behavior.
    Change { previous: Option<Value> },
    /// Start of the time bucket the latest reading fell into.
    Interval { bucket_start: Option<f64> },
    /// Last binary state, 0 or 1. Starts off.
    Transition { previous: f64 },
}

/// Decides whether readings for one (device, measurement type) pair are
/// significant enough to emit as events.
///
/// Created lazily by the dispatcher on the first reading for the pair and
/// dropped when the device deregisters or a re-announcement no longer
/// accepts the type.
#[derive(Debug)]
pub struct MeasurementFilter {
    device_id: String,
    measurement: MeasurementType,
    policy: Policy,
    state: FilterState,
}

impl MeasurementFilter {
    pub fn new(device_id: &str, measurement: MeasurementType, policy: Policy) -> Self {
        let state = match policy {
            Policy::OnChange { .. } => FilterState::Change { previous: None },
            Policy::OnInterval { .. } => FilterState::Interval { bucket_start: None },
            Policy::OnTransition => FilterState::Transition { previous: 0.0 },
        };
        MeasurementFilter {
            device_id: device_id.to_string(),
            measurement,
            policy,
            state,
        }
    }

    /// Evaluate one normalized reading, returning zero or more events.
    pub fn evaluate(&mut self, timestamp: f64, value: Value) -> Vec<Event> {
        let emissions: Vec<(f64, Value)> = match (&self.policy, &mut self.state) {
            (Policy::OnChange { threshold }, FilterState::Change { previous }) => {
                let reportable = match previous {
                    Some(prev) => exceeds_threshold(prev, &value, *threshold),
                    // No prior report: compare against a zero of the same
                    // shape, as the reference implementation does.
                    None => exceeds_threshold(&zero_like(&value), &value, *threshold),
                };
                if reportable {
                    // All components are reported and replaced together,
                    // even if only one crossed the threshold.
                    *previous = Some(value.clone());
                    vec![(timestamp, value)]
                } else {
                    Vec::new()
                }
            }
            (Policy::OnInterval { period }, FilterState::Interval { bucket_start }) => {
                let bucket = (timestamp / period).floor() * period;
                match *bucket_start {
                    None => {
                        *bucket_start = Some(bucket);
                        Vec::new()
                    }
                    Some(prev) if bucket != prev => {
                        *bucket_start = Some(bucket);
                        // The value that was current through the interval
                        // that just ended, stamped at its start.
                        vec![(prev, value)]
                    }
                    Some(_) => Vec::new(),
                }
            }
            (Policy::OnTransition, FilterState::Transition { previous }) => {
                match &value {
                    // Buttons report every reading.
                    Value::Buttons { .. } => vec![(timestamp, value)],
                    Value::Scalar(state) => {
                        if *state != *previous {
                            let prior = *previous;
                            *previous = *state;
                            // Emit a before/after step so the series shows
                            // the transition edge.
                            vec![(timestamp - 1.0, Value::Scalar(prior)), (timestamp, value)]
                        } else {
                            Vec::new()
                        }
                    }
                    Value::Vector { .. } => Vec::new(),
                }
            }
            // State is constructed from the policy, so the arms above are
            // exhaustive in practice.
            _ => Vec::new(),
        };

        emissions
            .into_iter()
            .map(|(timestamp, value)| Event {
                device_id: self.device_id.clone(),
                measurement: self.measurement,
                timestamp,
                value,
            })
            .collect()
    }
}

/// True when any scalar component of `next` deviates from `prev` by at
/// least `threshold`. Equal to the threshold counts as reportable.
fn exceeds_threshold(prev: &Value, next: &Value, threshold: f64) -> bool {
    match (prev, next) {
        (Value::Scalar(p), Value::Scalar(n)) => (n - p).abs() >= threshold,
        (
            Value::Vector {
                x: px,
                y: py,
                z: pz,
            },
            Value::Vector { x, y, z },
        ) => {
            (x - px).abs() >= threshold
                || (y - py).abs() >= threshold
                || (z - pz).abs() >= threshold
        }
        // A shape change is always significant.
        _ => true,
    }
}

fn zero_like(value: &Value) -> Value {
    match value {
        Value::Scalar(_) => Value::Scalar(0.0),
        Value::Vector { .. } => Value::Vector {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        Value::Buttons { .. } => Value::Buttons {
            left: false,
            right: false,
        },
    }
}
