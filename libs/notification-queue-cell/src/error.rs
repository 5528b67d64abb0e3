use thiserror::Error;

use crate::JobStatus;

#[derive(Error, Debug)]
pub enum NotificationQueueError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Queue is full ({capacity} jobs pending)")]
    QueueFull { capacity: usize },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid job status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: JobStatus, to: JobStatus },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Delivery timeout: transport took longer than {timeout_seconds} seconds")]
    DeliveryTimeout { timeout_seconds: u64 },

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Inbox storage failed: {0}")]
    InboxError(String),

    #[error("Maximum delivery attempts ({max_attempts}) exceeded for job {job_id}")]
    MaxAttemptsExceeded { job_id: String, max_attempts: u32 },
}
