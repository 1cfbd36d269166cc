//! Per-device monotonic sequence generation.
//!
//! The counter is seeded from the durable queue (`max(sequence_number) + 1`)
//! the first time a device asks for a number, cached in memory, and written
//! through on every enqueue. Time never participates, so the sequence stays
//! monotonic even when the device clock moves backwards.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use repsync_core::SyncResult;

use crate::queue::EventQueue;

pub struct SequenceGenerator {
    queue: Arc<dyn EventQueue>,
    counters: Mutex<HashMap<Uuid, i64>>,
}

impl SequenceGenerator {
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self {
            queue,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next sequence number for a device.
    pub async fn next(&self, device_id: Uuid) -> SyncResult<i64> {
        let mut counters = self.counters.lock().await;
        let next = match counters.get(&device_id) {
            Some(last) => last + 1,
            None => self.queue.max_sequence(device_id).await?.unwrap_or(0) + 1,
        };
        counters.insert(device_id, next);
        Ok(next)
    }
}
