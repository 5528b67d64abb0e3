use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationKind {
    BookingCreated,
    BookingCancelled,
}

/// Wire shape consumed by the delivery worker. Names and addresses are
/// captured when the job is created and never re-fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    #[serde(default)]
    pub recipient_id: i64,
    pub recipient_address: String,
    pub recipient_name: String,
    pub other_party_name: String,
    pub formatted_date: String,
}

impl NotificationPayload {
    pub fn booking_created_text(&self) -> String {
        format!("Novo agendamento de {} para {}", self.other_party_name, self.formatted_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub job_id: Uuid,
    pub appointment_id: i64,
    pub scheduled_for: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InFlight,
    Delivered,
    FailedRetry,
    DeadLetter,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Delivered | JobStatus::DeadLetter)
    }

    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, target),
            (Queued, InFlight)
                | (InFlight, Delivered)
                | (InFlight, FailedRetry)
                | (InFlight, DeadLetter)
                | (FailedRetry, InFlight)
        )
    }
}

impl NotificationJob {
    pub fn new(appointment_id: i64, scheduled_for: DateTime<Utc>, payload: NotificationPayload) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            appointment_id,
            scheduled_for,
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: 3,
            created_at: now,
            updated_at: now,
            last_error: None,
            worker_id: None,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.payload.kind
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Entry in a user's in-app notification inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboxNotification {
    pub id: Uuid,
    pub recipient_id: i64,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl InboxNotification {
    /// Booking confirmations are the only jobs that reach the provider's inbox.
    /// The entry reuses the job id so that retried deliveries record it once.
    pub fn from_job(job: &NotificationJob) -> Option<Self> {
        match job.kind() {
            NotificationKind::BookingCreated => Some(Self {
                id: job.job_id,
                recipient_id: job.payload.recipient_id,
                content: job.payload.booking_created_text(),
                read: false,
                created_at: job.created_at,
            }),
            NotificationKind::BookingCancelled => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queued_jobs: u64,
    pub in_flight_jobs: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub pool_size: usize,
    pub delivery_timeout_seconds: u64,
    pub retry_delay_ms: u64,
    pub dequeue_wait_ms: u64,
    /// In-flight or retry-pending jobs untouched this long are treated as abandoned.
    pub stale_after_ms: u64,
    pub recovery_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("notifier-{}", Uuid::new_v4()),
            pool_size: 2,
            delivery_timeout_seconds: 30,
            retry_delay_ms: 30_000,
            dequeue_wait_ms: 1_000,
            stale_after_ms: 600_000,
            recovery_interval_ms: 60_000,
        }
    }
}

/// Rendered e-mail handed to a `MailTransport`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub text: String,
    pub context: serde_json::Value,
}
