use serde::{Deserialize, Serialize};

/// The closed set of measurement types the gateway understands.
///
/// Wire names are the snake_case strings used by adaptors; anything
/// outside this set is dropped by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementType {
    Temperature,
    IrTemperature,
    Humidity,
    Luminance,
    Acceleration,
    Gyro,
    Magnetometer,
    Buttons,
    BinarySensor,
}

impl MeasurementType {
    pub const ALL: [MeasurementType; 9] = [
        MeasurementType::Temperature,
        MeasurementType::IrTemperature,
        MeasurementType::Humidity,
        MeasurementType::Luminance,
        MeasurementType::Acceleration,
        MeasurementType::Gyro,
        MeasurementType::Magnetometer,
        MeasurementType::Buttons,
        MeasurementType::BinarySensor,
    ];

    pub fn parse(s: &str) -> Option<MeasurementType> {
        match s {
            "temperature" => Some(MeasurementType::Temperature),
            "ir_temperature" => Some(MeasurementType::IrTemperature),
            "humidity" => Some(MeasurementType::Humidity),
            "luminance" => Some(MeasurementType::Luminance),
            "acceleration" => Some(MeasurementType::Acceleration),
            "gyro" => Some(MeasurementType::Gyro),
            "magnetometer" => Some(MeasurementType::Magnetometer),
            "buttons" => Some(MeasurementType::Buttons),
            "binary_sensor" => Some(MeasurementType::BinarySensor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::Temperature => "temperature",
            MeasurementType::IrTemperature => "ir_temperature",
            MeasurementType::Humidity => "humidity",
            MeasurementType::Luminance => "luminance",
            MeasurementType::Acceleration => "acceleration",
            MeasurementType::Gyro => "gyro",
            MeasurementType::Magnetometer => "magnetometer",
            MeasurementType::Buttons => "buttons",
            MeasurementType::BinarySensor => "binary_sensor",
        }
    }

    /// Metric names for the three axes of a vector type.
    fn axis_names(&self) -> Option<[&'static str; 3]> {
        match self {
            MeasurementType::Acceleration => Some(["accel_x", "accel_y", "accel_z"]),
            MeasurementType::Gyro => Some(["gyro_x", "gyro_y", "gyro_z"]),
            MeasurementType::Magnetometer => Some(["magnet_x", "magnet_y", "magnet_z"]),
            _ => None,
        }
    }

    /// Metric name for a scalar type.
    fn scalar_name(&self) -> Option<&'static str> {
        match self {
            MeasurementType::Temperature => Some("temperature"),
            MeasurementType::IrTemperature => Some("ir_temperature"),
            MeasurementType::Humidity => Some("humidity"),
            MeasurementType::Luminance => Some("luminance"),
            MeasurementType::BinarySensor => Some("binary"),
            _ => None,
        }
    }

    /// Normalize a raw adaptor payload into the value shape this type
    /// expects. Returns None on a shape mismatch, which the dispatcher
    /// treats as a malformed reading and drops.
    pub fn normalize(&self, raw: &RawValue) -> Option<Value> {
        match (self, raw) {
            (
                MeasurementType::Temperature
                | MeasurementType::IrTemperature
                | MeasurementType::Humidity
                | MeasurementType::Luminance,
                RawValue::Scalar(v),
            ) => Some(Value::Scalar(*v)),
            (
                MeasurementType::Acceleration
                | MeasurementType::Gyro
                | MeasurementType::Magnetometer,
                RawValue::Vector { x, y, z },
            ) => Some(Value::Vector {
                x: *x,
                y: *y,
                z: *z,
            }),
            (MeasurementType::Buttons, RawValue::Buttons { left, right }) => {
                Some(Value::Buttons {
                    left: *left,
                    right: *right,
                })
            }
            // Binary sensors report "on"/"off"; some adaptors send 0/1.
            (MeasurementType::BinarySensor, RawValue::State(s)) => {
                Some(Value::Scalar(if s == "on" { 1.0 } else { 0.0 }))
            }
            (MeasurementType::BinarySensor, RawValue::Scalar(v)) => {
                Some(Value::Scalar(if *v != 0.0 { 1.0 } else { 0.0 }))
            }
            _ => None,
        }
    }
}

/// A normalized measurement value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector { x: f64, y: f64, z: f64 },
    Buttons { left: bool, right: bool },
}

/// Raw payload of an adaptor reading, before per-type normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Scalar(f64),
    Vector {
        x: f64,
        y: f64,
        z: f64,
    },
    Buttons {
        #[serde(rename = "leftButton")]
        left: bool,
        #[serde(rename = "rightButton")]
        right: bool,
    },
    State(String),
}

/// A typed reading as delivered by the adaptor registry.
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "measurementType")]
    pub measurement_type: String,
    pub timestamp: f64,
    pub data: RawValue,
}

/// A reportable measurement that passed filter policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub device_id: String,
    pub measurement: MeasurementType,
    pub timestamp: f64,
    pub value: Value,
}

impl Event {
    /// Expand into upstream wire points. Scalar types map to a single
    /// named point, vector types to one point per axis, buttons to
    /// left_button/right_button with 0/1 values.
    pub fn points(&self) -> Vec<Point> {
        match &self.value {
            Value::Scalar(v) => match self.measurement.scalar_name() {
                Some(name) => vec![Point {
                    n: name,
                    v: *v,
                    t: self.timestamp,
                }],
                None => Vec::new(),
            },
            Value::Vector { x, y, z } => match self.measurement.axis_names() {
                Some([nx, ny, nz]) => vec![
                    Point {
                        n: nx,
                        v: *x,
                        t: self.timestamp,
                    },
                    Point {
                        n: ny,
                        v: *y,
                        t: self.timestamp,
                    },
                    Point {
                        n: nz,
                        v: *z,
                        t: self.timestamp,
                    },
                ],
                None => Vec::new(),
            },
            Value::Buttons { left, right } => vec![
                Point {
                    n: "left_button",
                    v: if *left { 1.0 } else { 0.0 },
                    t: self.timestamp,
                },
                Point {
                    n: "right_button",
                    v: if *right { 1.0 } else { 0.0 },
                    t: self.timestamp,
                },
            ],
        }
    }
}

/// One `{n, v, t}` triple in the upstream ingestion envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub n: &'static str,
    pub v: f64,
    pub t: f64,
}

/// One-time capability announcement from an adaptor.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityAnnouncement {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "offeredTypes")]
    pub offered_types: Vec<OfferedType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferedType {
    #[serde(rename = "type")]
    pub name: String,
}

/// Accepted-subscription reply to a capability announcement.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityResponse {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "acceptedTypes")]
    pub accepted_types: Vec<AcceptedType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedType {
    #[serde(rename = "type")]
    pub name: &'static str,
    /// Polling interval in seconds; 0 signals event-driven reporting.
    #[serde(rename = "intervalSeconds")]
    pub interval_seconds: f64,
}

/// Inbound messages from the adaptor registry, tagged by "msg".
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum AdaptorMessage {
    Reading(Reading),
    Services(CapabilityAnnouncement),
    Deregister {
        #[serde(rename = "deviceID")]
        device_id: String,
    },
}
