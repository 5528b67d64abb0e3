use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::services::queue::NotificationQueue;
use crate::{NotificationJob, NotificationQueueError};

/// Entry point used by appointment services when an appointment changes state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationQueueError>;
}

pub struct NotificationProducerService {
    queue: Arc<dyn NotificationQueue>,
    max_attempts: u32,
}

impl NotificationProducerService {
    pub fn new(queue: Arc<dyn NotificationQueue>, max_attempts: u32) -> Self {
        Self {
            queue,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl NotificationSink for NotificationProducerService {
    async fn enqueue(&self, mut job: NotificationJob) -> Result<(), NotificationQueueError> {
        job.max_attempts = self.max_attempts;
        let (job_id, kind, appointment_id) = (job.job_id, job.kind(), job.appointment_id);

        self.queue.push(job).await?;

        info!("{:?} notification queued for appointment {} with job ID {}", kind, appointment_id, job_id);
        Ok(())
    }
}
