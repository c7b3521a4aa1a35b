use std::collections::VecDeque;

use crate::models::Event;

/// Per-device accumulation buffer of reportable events.
///
/// Events leave the buffer only through `drain`; a failed delivery must
/// put them back with `requeue`, so nothing is lost short of a successful
/// send.
#[derive(Debug, Default)]
pub struct DeviceBatch {
    pending: VecDeque<Event>,
}

impl DeviceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    /// Remove and return all pending events, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        self.pending.drain(..).collect()
    }

    /// Put previously drained events back ahead of anything added since,
    /// preserving their original relative order.
    pub fn requeue(&mut self, events: Vec<Event>) {
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasurementType, Value};

    fn event(timestamp: f64) -> Event {
        Event {
            device_id: "dev1".to_string(),
            measurement: MeasurementType::Temperature,
            timestamp,
            value: Value::Scalar(timestamp),
        }
    }

    #[test]
    fn drain_is_idempotent() {
        let mut batch = DeviceBatch::new();
        batch.add(event(1.0));
        batch.add(event(2.0));
        let first = batch.drain();
        assert_eq!(first.len(), 2);
        assert!(batch.drain().is_empty());
        assert!(batch.is_empty());
    }

    #[test]
    fn drain_preserves_insertion_order() {
        let mut batch = DeviceBatch::new();
        for t in [1.0, 2.0, 3.0] {
            batch.add(event(t));
        }
        let drained = batch.drain();
        let times: Vec<f64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn requeued_events_come_before_later_adds() {
        let mut batch = DeviceBatch::new();
        batch.add(event(1.0));
        batch.add(event(2.0));
        let failed = batch.drain();
        // New events arrive while the failed send is outstanding.
        batch.add(event(3.0));
        batch.requeue(failed);
        let times: Vec<f64> = batch.drain().iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }
}
