#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use notification_queue_cell::*;

pub fn sample_job(kind: NotificationKind) -> NotificationJob {
    NotificationJob::new(
        1,
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        NotificationPayload {
            kind,
            recipient_id: 10,
            recipient_address: "provider@example.com".to_string(),
            recipient_name: "Dra. Paula".to_string(),
            other_party_name: "João".to_string(),
            formatted_date: "dia 01 de junho, às 10:00h".to_string(),
        },
    )
}

pub fn fast_worker_config(pool_size: usize) -> WorkerConfig {
    WorkerConfig {
        worker_id: "test-worker".to_string(),
        pool_size,
        delivery_timeout_seconds: 5,
        retry_delay_ms: 10,
        dequeue_wait_ms: 20,
        stale_after_ms: 600_000,
        recovery_interval_ms: 60_000,
    }
}

/// Transport that fails the first `failures` deliveries, then records the rest.
#[derive(Default)]
pub struct ScriptedTransport {
    failures: AtomicU32,
    pub delivered: Mutex<Vec<MailMessage>>,
}

impl ScriptedTransport {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotificationQueueError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(NotificationQueueError::DeliveryFailed("smtp unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }
}
