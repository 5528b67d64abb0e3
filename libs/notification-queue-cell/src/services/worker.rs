use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::services::inbox::NotificationInbox;
use crate::services::mail::{MailRenderer, MailTransport};
use crate::services::queue::NotificationQueue;
use crate::{InboxNotification, JobStatus, NotificationJob, NotificationQueueError, WorkerConfig};

/// Fixed-size pool of delivery workers draining a `NotificationQueue`.
pub struct NotificationWorkerService {
    config: WorkerConfig,
    queue: Arc<dyn NotificationQueue>,
    transport: Arc<dyn MailTransport>,
    inbox: Option<Arc<dyn NotificationInbox>>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl NotificationWorkerService {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn NotificationQueue>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            config,
            queue,
            transport,
            inbox: None,
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Booking confirmations are also stored in the recipient's inbox.
    pub fn with_inbox(mut self, inbox: Arc<dyn NotificationInbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Spawns `pool_size` worker loops. They run until `shutdown` is called.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting notification worker {} with {} workers",
            self.config.worker_id, self.config.pool_size
        );

        (0..self.config.pool_size.max(1))
            .map(|i| {
                let worker = Arc::clone(self);
                let worker_name = format!("{}-{}", self.config.worker_id, i);
                // The first worker also sweeps for jobs abandoned by dead workers.
                let recovers = i == 0;
                tokio::spawn(async move { worker.worker_loop(worker_name, recovers).await })
            })
            .collect()
    }

    /// Workers notice the flag after their current wait on the queue elapses.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for worker {}", self.config.worker_id);
        *self.is_shutdown.write().await = true;
    }

    async fn worker_loop(&self, worker_name: String, recovers: bool) {
        debug!("Worker loop started: {}", worker_name);
        let wait = Duration::from_millis(self.config.dequeue_wait_ms);
        let recovery_interval = Duration::from_millis(self.config.recovery_interval_ms);
        let mut last_recovery: Option<Instant> = None;

        loop {
            if *self.is_shutdown.read().await {
                debug!("Worker {} received shutdown signal", worker_name);
                break;
            }

            if recovers && last_recovery.map_or(true, |at| at.elapsed() >= recovery_interval) {
                self.recover_stale_jobs().await;
                last_recovery = Some(Instant::now());
            }

            match self.queue.pop(&worker_name, wait).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        error!("Worker {} failed to process job: {}", worker_name, e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Returns abandoned jobs to the queue; returns how many were recovered.
    pub async fn recover_stale_jobs(&self) -> usize {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        match self.queue.recover_stale(stale_after).await {
            Ok(recovered) => recovered,
            Err(e) => {
                error!("Stale job recovery failed: {}", e);
                0
            }
        }
    }

    /// Delivers one in-flight job and returns the status it ends this attempt in.
    #[instrument(skip(self, job), fields(job_id = %job.job_id, attempt = job.attempts))]
    pub async fn process_job(&self, job: NotificationJob) -> Result<JobStatus, NotificationQueueError> {
        // Inbox first: a retry after a failed send must not lose the entry.
        let outcome = match self.record_in_inbox(&job).await {
            Ok(()) => self.deliver(&job).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.queue.complete(job.job_id).await?;
                info!("{:?} notification for appointment {} delivered", job.kind(), job.appointment_id);
                Ok(JobStatus::Delivered)
            }
            Err(e) => {
                let failed = self.queue.fail(job.job_id, e.to_string()).await?;

                if failed.status == JobStatus::DeadLetter {
                    let exhausted = NotificationQueueError::MaxAttemptsExceeded {
                        job_id: failed.job_id.to_string(),
                        max_attempts: failed.max_attempts,
                    };
                    error!("{}; moved to dead-letter ({})", exhausted, e);
                } else {
                    let delay = Duration::from_millis(self.config.retry_delay_ms * u64::from(failed.attempts));
                    warn!(
                        "Job {} will be retried in {:?} (attempt {}/{}): {}",
                        failed.job_id, delay, failed.attempts, failed.max_attempts, e
                    );
                    self.schedule_requeue(failed.job_id, delay);
                }

                Ok(failed.status)
            }
        }
    }

    async fn record_in_inbox(&self, job: &NotificationJob) -> Result<(), NotificationQueueError> {
        let (Some(inbox), Some(entry)) = (&self.inbox, InboxNotification::from_job(job)) else {
            return Ok(());
        };
        inbox.record(entry).await
    }

    async fn deliver(&self, job: &NotificationJob) -> Result<(), NotificationQueueError> {
        let message = MailRenderer::render(job);
        let delivery_timeout = Duration::from_secs(self.config.delivery_timeout_seconds);

        match timeout(delivery_timeout, self.transport.deliver(&message)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationQueueError::DeliveryTimeout {
                timeout_seconds: self.config.delivery_timeout_seconds,
            }),
        }
    }

    fn schedule_requeue(&self, job_id: uuid::Uuid, delay: Duration) {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.requeue(job_id).await {
                error!("Failed to requeue job {}: {}", job_id, e);
            }
        });
    }
}
