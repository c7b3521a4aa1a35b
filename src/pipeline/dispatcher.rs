use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::config::GatewayConfig;
use crate::delivery::client::Delivery;
use crate::delivery::scheduler::BatchScheduler;
use crate::models::{
    AcceptedType, CapabilityAnnouncement, CapabilityResponse, MeasurementType, Reading,
};
use crate::pipeline::filter::MeasurementFilter;

/// The accepted set of measurement types for one device.
#[derive(Debug, Default)]
struct Subscription {
    accepted: HashSet<MeasurementType>,
}

/// Routes adaptor traffic into the filter and batching pipeline.
///
/// Readings resolve to a per-(device, type) filter created lazily from
/// the configured policy; anything unknown or malformed is dropped here
/// so the filters never see it. Capability announcements negotiate the
/// accepted subscription per device.
pub struct Dispatcher<D> {
    config: GatewayConfig,
    subscriptions: HashMap<String, Subscription>,
    filters: HashMap<(String, MeasurementType), MeasurementFilter>,
    scheduler: BatchScheduler<D>,
}

impl<D: Delivery> Dispatcher<D> {
    pub fn new(config: GatewayConfig, scheduler: BatchScheduler<D>) -> Self {
        Dispatcher {
            config,
            subscriptions: HashMap::new(),
            filters: HashMap::new(),
            scheduler,
        }
    }

    /// Feed one reading through filtering into the device batch.
    pub async fn on_reading(&mut self, reading: Reading) {
        let measurement = match MeasurementType::parse(&reading.measurement_type) {
            Some(m) => m,
            None => {
                debug!(
                    "Dropping reading with unknown measurement type '{}' from {}",
                    reading.measurement_type, reading.device_id
                );
                return;
            }
        };

        match self.subscriptions.get(&reading.device_id) {
            Some(sub) if sub.accepted.contains(&measurement) => {}
            Some(_) => {
                debug!(
                    "Dropping {} reading from {}: type not subscribed",
                    measurement.as_str(),
                    reading.device_id
                );
                return;
            }
            None => {
                debug!(
                    "Dropping reading from unknown device {}",
                    reading.device_id
                );
                return;
            }
        }

        let value = match measurement.normalize(&reading.data) {
            Some(value) => value,
            None => {
                debug!(
                    "Dropping malformed {} reading from {}",
                    measurement.as_str(),
                    reading.device_id
                );
                return;
            }
        };

        let policy = match self.config.policy(measurement) {
            Some(policy) => policy,
            // Subscription checks make this unreachable unless config and
            // subscriptions disagree after a re-announcement.
            None => return,
        };

        let key = (reading.device_id.clone(), measurement);
        let filter = self
            .filters
            .entry(key)
            .or_insert_with(|| MeasurementFilter::new(&reading.device_id, measurement, policy));

        for event in filter.evaluate(reading.timestamp, value) {
            self.scheduler.add(event).await;
        }
    }

    /// Negotiate the accepted subscription for a device.
    ///
    /// The accepted set is the offered types intersected with what the
    /// configuration enables. A re-announcement replaces the previous
    /// subscription wholesale: filter state survives for types accepted
    /// both times, types no longer accepted lose theirs, new types start
    /// fresh on their first reading.
    pub fn on_capability_announcement(
        &mut self,
        announcement: CapabilityAnnouncement,
    ) -> CapabilityResponse {
        let mut accepted = HashSet::new();
        let mut accepted_types = Vec::new();

        for offered in &announcement.offered_types {
            let measurement = match MeasurementType::parse(&offered.name) {
                Some(m) => m,
                None => {
                    debug!(
                        "Device {} offered unknown type '{}'",
                        announcement.device_id, offered.name
                    );
                    continue;
                }
            };
            if self.config.policy(measurement).is_none() {
                continue;
            }
            if accepted.insert(measurement) {
                accepted_types.push(AcceptedType {
                    name: measurement.as_str(),
                    interval_seconds: self.config.negotiated_interval(measurement),
                });
            }
        }

        info!(
            "Device {}: accepted {} of {} offered types",
            announcement.device_id,
            accepted_types.len(),
            announcement.offered_types.len()
        );

        self.filters.retain(|(device_id, measurement), _| {
            device_id != &announcement.device_id || accepted.contains(measurement)
        });
        self.subscriptions
            .insert(announcement.device_id.clone(), Subscription { accepted });

        CapabilityResponse {
            device_id: announcement.device_id,
            accepted_types,
        }
    }

    /// Drop a device's subscription and all of its filter state.
    pub fn deregister(&mut self, device_id: &str) {
        if self.subscriptions.remove(device_id).is_some() {
            info!("Deregistered device {}", device_id);
        }
        self.filters.retain(|(id, _), _| id != device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfferedType, RawValue};
    use crate::pipeline::filter::Policy;
    use std::sync::Arc;
    use tokio::time::Duration;

    use crate::error::Result;
    use crate::models::Event;
    use async_trait::async_trait;

    /// Delivery stub; scheduler timers never fire in these tests because
    /// the paused clock is not advanced.
    struct NullDelivery;

    #[async_trait]
    impl Delivery for NullDelivery {
        async fn send(&self, _device_id: &str, _events: &[Event]) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher<NullDelivery> {
        let config = GatewayConfig::with_defaults("http://localhost/series/b1", "key");
        let scheduler = BatchScheduler::new(Duration::from_secs(20), Arc::new(NullDelivery));
        Dispatcher::new(config, scheduler)
    }

    fn announce(d: &mut Dispatcher<NullDelivery>, device_id: &str, types: &[&str]) -> CapabilityResponse {
        d.on_capability_announcement(CapabilityAnnouncement {
            device_id: device_id.to_string(),
            offered_types: types
                .iter()
                .map(|t| OfferedType {
                    name: t.to_string(),
                })
                .collect(),
        })
    }

    fn temp_reading(device_id: &str, timestamp: f64, value: f64) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            measurement_type: "temperature".to_string(),
            timestamp,
            data: RawValue::Scalar(value),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_only_enabled_offered_types() {
        let mut d = dispatcher();
        // Defaults: temperature and binary_sensor enabled, acceleration
        // and buttons not.
        let response = announce(
            &mut d,
            "dev1",
            &["temperature", "acceleration", "buttons", "binary_sensor", "bogus"],
        );
        let mut names: Vec<&str> = response.accepted_types.iter().map(|t| t.name).collect();
        names.sort();
        assert_eq!(names, vec!["binary_sensor", "temperature"]);

        let temp = response
            .accepted_types
            .iter()
            .find(|t| t.name == "temperature")
            .unwrap();
        assert_eq!(temp.interval_seconds, 120.0);
        let binary = response
            .accepted_types
            .iter()
            .find(|t| t.name == "binary_sensor")
            .unwrap();
        assert_eq!(binary.interval_seconds, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_readings_from_unknown_devices_and_types() {
        let mut d = dispatcher();
        // No announcement at all.
        d.on_reading(temp_reading("ghost", 1.0, 21.0)).await;
        assert_eq!(d.scheduler.pending("ghost").await, 0);

        // Announced, but the reading's type was not accepted.
        announce(&mut d, "dev1", &["binary_sensor"]);
        d.on_reading(temp_reading("dev1", 1.0, 21.0)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribed_readings_flow_into_the_batch() {
        let mut d = dispatcher();
        announce(&mut d, "dev1", &["temperature"]);
        // First reading reports (zero-default previous), second is within
        // threshold of the first.
        d.on_reading(temp_reading("dev1", 1.0, 21.0)).await;
        d.on_reading(temp_reading("dev1", 2.0, 21.1)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_dropped() {
        let mut d = dispatcher();
        announce(&mut d, "dev1", &["temperature"]);
        d.on_reading(Reading {
            device_id: "dev1".to_string(),
            measurement_type: "temperature".to_string(),
            timestamp: 1.0,
            data: RawValue::Vector {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
        })
        .await;
        assert_eq!(d.scheduler.pending("dev1").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reannouncement_preserves_retained_filter_state() {
        let mut d = dispatcher();
        announce(&mut d, "dev1", &["temperature", "binary_sensor"]);
        // Establish filter state: previous reported value 21.0.
        d.on_reading(temp_reading("dev1", 1.0, 21.0)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 1);

        // Re-announce with temperature retained.
        announce(&mut d, "dev1", &["temperature"]);
        // Within threshold of the preserved previous value: suppressed.
        d.on_reading(temp_reading("dev1", 2.0, 21.1)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reannouncement_resets_state_of_dropped_types() {
        let mut d = dispatcher();
        announce(&mut d, "dev1", &["temperature"]);
        d.on_reading(temp_reading("dev1", 1.0, 21.0)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 1);

        // Drop temperature, then accept it again: state starts fresh, so
        // the zero-default previous makes the next reading report even
        // though it matches the previously reported value.
        announce(&mut d, "dev1", &["binary_sensor"]);
        announce(&mut d, "dev1", &["temperature"]);
        d.on_reading(temp_reading("dev1", 2.0, 21.0)).await;
        assert_eq!(d.scheduler.pending("dev1").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deregistered_device_is_forgotten() {
        let mut d = dispatcher();
        announce(&mut d, "dev1", &["temperature"]);
        d.on_reading(temp_reading("dev1", 1.0, 21.0)).await;
        d.deregister("dev1");
        d.on_reading(temp_reading("dev1", 2.0, 25.0)).await;
        // Still just the event from before deregistration.
        assert_eq!(d.scheduler.pending("dev1").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_types_use_config_policy_overrides() {
        let mut config = GatewayConfig::with_defaults("http://localhost/series/b1", "key");
        config.set_type(MeasurementType::Buttons, true, Policy::OnTransition);
        let scheduler = BatchScheduler::new(Duration::from_secs(20), Arc::new(NullDelivery));
        let mut d = Dispatcher::new(config, scheduler);

        let response = announce(&mut d, "dev1", &["buttons"]);
        assert_eq!(response.accepted_types.len(), 1);
        d.on_reading(Reading {
            device_id: "dev1".to_string(),
            measurement_type: "buttons".to_string(),
            timestamp: 1.0,
            data: RawValue::Buttons {
                left: true,
                right: false,
            },
        })
        .await;
        assert_eq!(d.scheduler.pending("dev1").await, 1);
    }
}
