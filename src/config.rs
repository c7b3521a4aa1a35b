use std::collections::HashMap;
use std::env;

use log::warn;

use crate::error::GatewayError;
use crate::models::MeasurementType;
use crate::pipeline::filter::Policy;

// Reference defaults: which sensors are enabled and how much a value must
// move before it is reported.
const SENSOR_DEFAULTS: &[(MeasurementType, &str, bool, Option<f64>)] = &[
    (MeasurementType::Temperature, "TEMP", true, Some(0.2)),
    (MeasurementType::IrTemperature, "IRTEMP", false, Some(0.5)),
    (MeasurementType::Humidity, "HUMIDITY", false, Some(0.5)),
    (MeasurementType::Luminance, "LUMINANCE", true, Some(1.0)),
    (MeasurementType::Acceleration, "ACCEL", false, Some(0.02)),
    (MeasurementType::Gyro, "GYRO", false, Some(0.5)),
    (MeasurementType::Magnetometer, "MAGNET", false, Some(1.5)),
    (MeasurementType::Buttons, "BUTTONS", false, None),
    (MeasurementType::BinarySensor, "BINARY", true, None),
];

const DEFAULT_SEND_DELAY_SECS: f64 = 20.0;
const DEFAULT_REPORT_INTERVAL_SECS: f64 = 60.0;
const DEFAULT_SLOW_POLLING_INTERVAL_SECS: f64 = 120.0;
const DEFAULT_FAST_POLLING_INTERVAL_SECS: f64 = 3.0;

/// Per-measurement-type reporting configuration.
#[derive(Debug, Clone)]
pub struct TypeConfig {
    pub enabled: bool,
    pub policy: Policy,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the time-series ingestion endpoint; the device ID is
    /// appended per request.
    pub ingest_url: String,
    /// Pre-shared identifier sent as the basic auth username.
    pub api_key: String,
    /// Coalescing window: how long to gather values for a device before
    /// sending them.
    pub send_delay_secs: f64,
    pub slow_polling_interval_secs: f64,
    pub fast_polling_interval_secs: f64,
    types: HashMap<MeasurementType, TypeConfig>,
}

impl GatewayConfig {
    /// Configuration with reference defaults and the given endpoint.
    pub fn with_defaults(ingest_url: &str, api_key: &str) -> Self {
        let mut types = HashMap::new();
        for &(measurement, _, enabled, threshold) in SENSOR_DEFAULTS {
            let policy = match threshold {
                Some(t) => Policy::OnChange { threshold: t },
                None => Policy::OnTransition,
            };
            types.insert(measurement, TypeConfig { enabled, policy });
        }
        GatewayConfig {
            ingest_url: ingest_url.to_string(),
            api_key: api_key.to_string(),
            send_delay_secs: DEFAULT_SEND_DELAY_SECS,
            slow_polling_interval_secs: DEFAULT_SLOW_POLLING_INTERVAL_SECS,
            fast_polling_interval_secs: DEFAULT_FAST_POLLING_INTERVAL_SECS,
            types,
        }
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let ingest_url = env::var("GATEWAY_INGEST_URL").map_err(|_| {
            GatewayError::Config("GATEWAY_INGEST_URL environment variable not set".to_string())
        })?;
        let api_key = env::var("GATEWAY_API_KEY").map_err(|_| {
            GatewayError::Config("GATEWAY_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::with_defaults(&ingest_url, &api_key);
        config.send_delay_secs = env_f64("GATEWAY_SEND_DELAY", DEFAULT_SEND_DELAY_SECS);
        config.slow_polling_interval_secs = env_f64(
            "GATEWAY_SLOW_POLLING_INTERVAL",
            DEFAULT_SLOW_POLLING_INTERVAL_SECS,
        );
        config.fast_polling_interval_secs = env_f64(
            "GATEWAY_FAST_POLLING_INTERVAL",
            DEFAULT_FAST_POLLING_INTERVAL_SECS,
        );
        let report_interval =
            env_f64("GATEWAY_REPORT_INTERVAL", DEFAULT_REPORT_INTERVAL_SECS);

        for &(measurement, key, enabled_default, threshold_default) in SENSOR_DEFAULTS {
            let enabled = env_flag(&format!("GATEWAY_{}", key), enabled_default);
            let policy = match threshold_default {
                // Buttons and binary sensors always report transitions.
                None => Policy::OnTransition,
                Some(default_threshold) => {
                    let threshold = env_f64(
                        &format!("GATEWAY_{}_MIN_CHANGE", key),
                        default_threshold,
                    );
                    match env::var(format!("GATEWAY_{}_REPORT", key)).ok().as_deref() {
                        Some("interval") => Policy::OnInterval {
                            period: report_interval,
                        },
                        Some("change") | None => Policy::OnChange { threshold },
                        Some(other) => {
                            warn!(
                                "Invalid report mode '{}' for {}, using on-change",
                                other,
                                measurement.as_str()
                            );
                            Policy::OnChange { threshold }
                        }
                    }
                }
            };
            config
                .types
                .insert(measurement, TypeConfig { enabled, policy });
        }

        Ok(config)
    }

    /// Reporting policy for a measurement type, or None if the type is
    /// disabled and should not be subscribed to.
    pub fn policy(&self, measurement: MeasurementType) -> Option<Policy> {
        self.types
            .get(&measurement)
            .filter(|t| t.enabled)
            .map(|t| t.policy)
    }

    pub fn set_type(&mut self, measurement: MeasurementType, enabled: bool, policy: Policy) {
        self.types
            .insert(measurement, TypeConfig { enabled, policy });
    }

    /// Polling interval to negotiate with the adaptor for an accepted
    /// type. Polled sensors use the slow or fast interval; event-driven
    /// ones report 0.
    pub fn negotiated_interval(&self, measurement: MeasurementType) -> f64 {
        match measurement {
            MeasurementType::Temperature
            | MeasurementType::IrTemperature
            | MeasurementType::Humidity => self.slow_polling_interval_secs,
            MeasurementType::Acceleration
            | MeasurementType::Gyro
            | MeasurementType::Magnetometer => self.fast_polling_interval_secs,
            MeasurementType::Luminance
            | MeasurementType::Buttons
            | MeasurementType::BinarySensor => 0.0,
        }
    }
}

/// Parse a boolean flag string; accepts true/false, yes/no, 1/0 in any
/// case.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => parse_flag(&value).unwrap_or_else(|| {
            warn!("Invalid boolean '{}' for {}, using {}", value, name, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid number '{}' for {}, using {}", value, name, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn defaults_enable_reference_sensors() {
        let config = GatewayConfig::with_defaults("http://localhost/series/b1", "key");
        assert!(config.policy(MeasurementType::Temperature).is_some());
        assert!(config.policy(MeasurementType::Luminance).is_some());
        assert!(config.policy(MeasurementType::BinarySensor).is_some());
        assert!(config.policy(MeasurementType::Acceleration).is_none());
        assert!(config.policy(MeasurementType::Buttons).is_none());
    }

    #[test]
    fn default_temperature_threshold() {
        let config = GatewayConfig::with_defaults("http://localhost/series/b1", "key");
        match config.policy(MeasurementType::Temperature) {
            Some(Policy::OnChange { threshold }) => assert_eq!(threshold, 0.2),
            other => panic!("unexpected policy: {:?}", other),
        }
    }

    #[test]
    fn negotiated_intervals_by_class() {
        let config = GatewayConfig::with_defaults("http://localhost/series/b1", "key");
        assert_eq!(
            config.negotiated_interval(MeasurementType::Temperature),
            120.0
        );
        assert_eq!(config.negotiated_interval(MeasurementType::Gyro), 3.0);
        assert_eq!(config.negotiated_interval(MeasurementType::Buttons), 0.0);
        assert_eq!(
            config.negotiated_interval(MeasurementType::BinarySensor),
            0.0
        );
    }
}
