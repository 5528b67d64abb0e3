use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{JobStatus, NotificationJob, NotificationQueueError, QueueStats};

/// Dead-lettered jobs kept by the in-memory queue; the oldest are dropped first.
pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 1_000;

/// Broker contract shared by producers and the delivery worker pool.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Admits a `Queued` job. Never waits for room.
    async fn push(&self, job: NotificationJob) -> Result<(), NotificationQueueError>;

    /// Takes the next job and marks it `InFlight`, waiting up to `wait` when empty.
    async fn pop(&self, worker_id: &str, wait: Duration) -> Result<Option<NotificationJob>, NotificationQueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), NotificationQueueError>;

    /// Records a failed attempt. The returned job is either `FailedRetry`
    /// (awaiting `requeue`) or `DeadLetter` when attempts are exhausted.
    async fn fail(&self, job_id: Uuid, error: String) -> Result<NotificationJob, NotificationQueueError>;

    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationQueueError>;

    async fn dead_letters(&self) -> Result<Vec<NotificationJob>, NotificationQueueError>;

    async fn stats(&self) -> QueueStats;

    /// Puts jobs abandoned by a dead worker back on the pending list.
    ///
    /// A job untouched for `stale_after` while `InFlight` counts as a failed
    /// attempt; one left in `FailedRetry` is requeued. Returns how many jobs
    /// became pending again.
    async fn recover_stale(&self, stale_after: Duration) -> Result<usize, NotificationQueueError>;
}

/// Last `updated_at` that counts as stale, or `None` when nothing can be.
pub(crate) fn stale_cutoff(stale_after: Duration) -> Option<DateTime<Utc>> {
    let stale_after = chrono::Duration::from_std(stale_after).ok()?;
    Utc::now().checked_sub_signed(stale_after)
}

/// Applies a failed attempt: `FailedRetry` while attempts remain, else `DeadLetter`.
pub(crate) fn record_failure(job: &mut NotificationJob, error: String) -> Result<JobStatus, NotificationQueueError> {
    let target = if job.can_retry() { JobStatus::FailedRetry } else { JobStatus::DeadLetter };
    transition(job, target)?;
    job.last_error = Some(error);
    job.worker_id = None;
    Ok(target)
}

pub(crate) fn transition(job: &mut NotificationJob, to: JobStatus) -> Result<(), NotificationQueueError> {
    if !job.status.can_transition_to(&to) {
        return Err(NotificationQueueError::InvalidStatusTransition { from: job.status, to });
    }
    job.status = to;
    job.updated_at = Utc::now();
    Ok(())
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Uuid>,
    jobs: HashMap<Uuid, NotificationJob>,
    dead_letter: VecDeque<NotificationJob>,
    stats: QueueStats,
}

impl QueueState {
    fn bury(&mut self, job: NotificationJob, limit: usize) {
        self.jobs.remove(&job.job_id);
        while self.dead_letter.len() >= limit.max(1) {
            if let Some(dropped) = self.dead_letter.pop_front() {
                warn!("Dead-letter list full, dropping job {}", dropped.job_id);
            }
        }
        self.dead_letter.push_back(job);
        self.stats.dead_lettered += 1;
    }
}

/// Bounded in-process queue. Jobs are lost on restart.
pub struct InMemoryNotificationQueue {
    capacity: usize,
    dead_letter_limit: usize,
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryNotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            dead_letter_limit: DEFAULT_DEAD_LETTER_LIMIT,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    pub fn with_dead_letter_limit(mut self, limit: usize) -> Self {
        self.dead_letter_limit = limit.max(1);
        self
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    async fn take_next(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationQueueError> {
        let mut state = self.state.lock().await;

        let Some(job_id) = state.pending.pop_front() else {
            return Ok(None);
        };

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| NotificationQueueError::JobNotFound(job_id.to_string()))?;

        transition(job, JobStatus::InFlight)?;
        job.attempts += 1;
        job.worker_id = Some(worker_id.to_string());
        let job = job.clone();

        state.stats.queued_jobs = state.stats.queued_jobs.saturating_sub(1);
        state.stats.in_flight_jobs += 1;

        debug!("Job {} dequeued by worker {}", job.job_id, worker_id);
        Ok(Some(job))
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn push(&self, job: NotificationJob) -> Result<(), NotificationQueueError> {
        if job.status != JobStatus::Queued {
            return Err(NotificationQueueError::InvalidStatusTransition {
                from: job.status,
                to: JobStatus::Queued,
            });
        }

        {
            let mut state = self.state.lock().await;
            if state.pending.len() >= self.capacity {
                return Err(NotificationQueueError::QueueFull { capacity: self.capacity });
            }

            state.pending.push_back(job.job_id);
            state.jobs.insert(job.job_id, job);
            state.stats.queued_jobs += 1;
        }

        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self, worker_id: &str, wait: Duration) -> Result<Option<NotificationJob>, NotificationQueueError> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(job) = self.take_next(worker_id).await? {
                return Ok(Some(job));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // A push between take_next and here leaves a stored permit, so no wakeup is lost.
            let _ = tokio::time::timeout(remaining, self.available.notified()).await;
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), NotificationQueueError> {
        let mut state = self.state.lock().await;

        let mut job = state
            .jobs
            .remove(&job_id)
            .ok_or_else(|| NotificationQueueError::JobNotFound(job_id.to_string()))?;

        if let Err(e) = transition(&mut job, JobStatus::Delivered) {
            state.jobs.insert(job_id, job);
            return Err(e);
        }

        state.stats.in_flight_jobs = state.stats.in_flight_jobs.saturating_sub(1);
        state.stats.delivered += 1;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: String) -> Result<NotificationJob, NotificationQueueError> {
        let mut state = self.state.lock().await;

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| NotificationQueueError::JobNotFound(job_id.to_string()))?;

        let target = record_failure(job, error)?;
        let job = job.clone();

        state.stats.in_flight_jobs = state.stats.in_flight_jobs.saturating_sub(1);
        if target == JobStatus::DeadLetter {
            state.bury(job.clone(), self.dead_letter_limit);
        } else {
            state.stats.retried += 1;
        }

        Ok(job)
    }

    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationQueueError> {
        {
            let mut state = self.state.lock().await;

            let job = state
                .jobs
                .get(&job_id)
                .ok_or_else(|| NotificationQueueError::JobNotFound(job_id.to_string()))?;

            if job.status != JobStatus::FailedRetry {
                return Err(NotificationQueueError::InvalidStatusTransition {
                    from: job.status,
                    to: JobStatus::InFlight,
                });
            }

            // Already put back by `recover_stale`.
            if state.pending.contains(&job_id) {
                return Ok(());
            }

            state.pending.push_back(job_id);
            state.stats.queued_jobs += 1;
        }

        self.available.notify_one();
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<NotificationJob>, NotificationQueueError> {
        Ok(self.state.lock().await.dead_letter.iter().cloned().collect())
    }

    async fn stats(&self) -> QueueStats {
        self.state.lock().await.stats.clone()
    }

    async fn recover_stale(&self, stale_after: Duration) -> Result<usize, NotificationQueueError> {
        let Some(cutoff) = stale_cutoff(stale_after) else {
            return Ok(0);
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let stale: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|job| matches!(job.status, JobStatus::InFlight | JobStatus::FailedRetry))
            .filter(|job| job.updated_at <= cutoff && !state.pending.contains(&job.job_id))
            .map(|job| job.job_id)
            .collect();

        let mut recovered = 0;
        for job_id in stale {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };

            if job.status == JobStatus::InFlight {
                let abandoned_by = job.worker_id.clone().unwrap_or_default();
                let target = record_failure(job, format!("Abandoned by worker '{}'", abandoned_by))?;
                let job = job.clone();
                state.stats.in_flight_jobs = state.stats.in_flight_jobs.saturating_sub(1);

                if target == JobStatus::DeadLetter {
                    warn!("Stale job {} exhausted its attempts", job_id);
                    state.bury(job, self.dead_letter_limit);
                    continue;
                }
                state.stats.retried += 1;
            }

            state.pending.push_back(job_id);
            state.stats.queued_jobs += 1;
            recovered += 1;
        }
        drop(guard);

        for _ in 0..recovered {
            self.available.notify_one();
        }
        if recovered > 0 {
            warn!("Recovered {} stale notification jobs", recovered);
        }
        Ok(recovered)
    }
}
