use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::delivery::batch::DeviceBatch;
use crate::delivery::client::Delivery;
use crate::models::Event;

#[derive(Debug, Default)]
struct DeviceEntry {
    batch: DeviceBatch,
    /// A flush timer is running for this device. At most one at a time;
    /// adds while armed ride the existing window.
    armed: bool,
}

/// Per-device coalescing of events into rate-limited deliveries.
///
/// The first event added for an idle device arms a one-shot timer for the
/// coalescing window. When it fires the device goes idle again, its batch
/// is drained, and the drained events are handed to the delivery client
/// in the timer task, off the ingestion path. A failed send requeues the
/// events and re-arms the device, so retries ride the next window until
/// they get through.
///
/// Devices are independent: the registry lock is held only for queue
/// bookkeeping, never across the network call.
pub struct BatchScheduler<D> {
    devices: Arc<Mutex<HashMap<String, DeviceEntry>>>,
    window: Duration,
    delivery: Arc<D>,
}

// Manual impl: D itself need not be Clone behind the Arc.
impl<D> Clone for BatchScheduler<D> {
    fn clone(&self) -> Self {
        BatchScheduler {
            devices: Arc::clone(&self.devices),
            window: self.window,
            delivery: Arc::clone(&self.delivery),
        }
    }
}

impl<D: Delivery> BatchScheduler<D> {
    pub fn new(window: Duration, delivery: Arc<D>) -> Self {
        BatchScheduler {
            devices: Arc::new(Mutex::new(HashMap::new())),
            window,
            delivery,
        }
    }

    /// Append a reportable event to its device's batch, arming the flush
    /// timer if the device was idle.
    pub async fn add(&self, event: Event) {
        let device_id = event.device_id.clone();
        let mut devices = self.devices.lock().await;
        let entry = devices.entry(device_id.clone()).or_default();
        entry.batch.add(event);
        if !entry.armed {
            entry.armed = true;
            self.spawn_timer(device_id);
        }
    }

    /// Number of pending events for a device.
    pub async fn pending(&self, device_id: &str) -> usize {
        let devices = self.devices.lock().await;
        devices.get(device_id).map_or(0, |e| e.batch.len())
    }

    fn spawn_timer(&self, device_id: String) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            sleep(scheduler.window).await;
            scheduler.flush(&device_id).await;
        });
    }

    /// Timer-fire path: disarm first so adds during delivery arm a fresh
    /// window, then drain and send.
    async fn flush(&self, device_id: &str) {
        let events = {
            let mut devices = self.devices.lock().await;
            let entry = match devices.get_mut(device_id) {
                Some(entry) => entry,
                None => return,
            };
            entry.armed = false;
            entry.batch.drain()
        };
        if events.is_empty() {
            return;
        }

        debug!("Flushing {} events for device {}", events.len(), device_id);
        if let Err(e) = self.delivery.send(device_id, &events).await {
            warn!(
                "Delivery failed for device {}: {}; requeueing {} events",
                device_id,
                e,
                events.len()
            );
            self.requeue(device_id, events).await;
        }
    }

    /// Put undelivered events back and make sure a retry window is
    /// armed. Requeued events keep their order ahead of later adds.
    async fn requeue(&self, device_id: &str, events: Vec<Event>) {
        let mut devices = self.devices.lock().await;
        let entry = devices.entry(device_id.to_string()).or_default();
        entry.batch.requeue(events);
        if !entry.armed && !entry.batch.is_empty() {
            entry.armed = true;
            self.spawn_timer(device_id.to_string());
        }
    }
}
