use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::queue::{
    record_failure, stale_cutoff, transition, NotificationQueue, DEFAULT_DEAD_LETTER_LIMIT,
};
use crate::{JobStatus, NotificationJob, NotificationQueueError, QueueStats};

const JOB_TTL_SECONDS: i64 = 604_800;

/// Redis-backed queue: one hash per job plus pending, processing, retry and
/// dead-letter lists. A job id always sits in exactly one list until delivered.
pub struct RedisNotificationQueue {
    pool: Pool,
    prefix: String,
    stats: RwLock<QueueStats>,
}

impl RedisNotificationQueue {
    pub async fn new(redis_url: &str) -> Result<Self, NotificationQueueError> {
        Self::with_prefix(redis_url, "notification").await
    }

    /// Key namespace is configurable so tests can isolate their data.
    pub async fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self, NotificationQueueError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| NotificationQueueError::QueueError(format!("Failed to create Redis pool: {}", e)))?;

        let queue = Self {
            pool,
            prefix: prefix.to_string(),
            stats: RwLock::new(QueueStats::default()),
        };

        let mut conn = queue.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification queue initialized (prefix '{}')", prefix);

        Ok(queue)
    }

    fn job_key(&self, job_id: Uuid) -> String {
        format!("{}_job:{}", self.prefix, job_id)
    }

    fn list_key(&self, list: &str) -> String {
        format!("{}_queue:{}", self.prefix, list)
    }

    async fn get_connection(&self) -> Result<Connection, NotificationQueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| NotificationQueueError::QueueError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn load_job(&self, conn: &mut Connection, job_id: Uuid) -> Result<NotificationJob, NotificationQueueError> {
        let data: Option<String> = conn.hget(self.job_key(job_id), "data").await?;
        let data = data.ok_or_else(|| NotificationQueueError::JobNotFound(job_id.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Atomically moves `job_id` from `from` to the tail end of `to`. Any copy
    /// already in `to` is replaced, so repeating a move is harmless.
    async fn move_id(
        &self,
        conn: &mut Connection,
        job_id: &str,
        from: &str,
        to: &str,
    ) -> Result<(), NotificationQueueError> {
        let _: () = redis::pipe()
            .atomic()
            .lrem(self.list_key(from), 0, job_id)
            .ignore()
            .lrem(self.list_key(to), 0, job_id)
            .ignore()
            .lpush(self.list_key(to), job_id)
            .ignore()
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn bury_id(&self, conn: &mut Connection, job_id: &str, from: &str) -> Result<(), NotificationQueueError> {
        self.move_id(conn, job_id, from, "dead_letter").await?;
        let _: () = conn
            .ltrim(self.list_key("dead_letter"), 0, DEFAULT_DEAD_LETTER_LIMIT as isize - 1)
            .await?;
        Ok(())
    }

    /// Recovers one list entry; returns whether it went back to pending.
    async fn recover_entry(
        &self,
        conn: &mut Connection,
        list: &str,
        raw_id: &str,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, NotificationQueueError> {
        let Ok(job_id) = Uuid::parse_str(raw_id) else {
            warn!("Dropping corrupt job id '{}' from {} list", raw_id, list);
            let _: () = conn.lrem(self.list_key(list), 0, raw_id).await?;
            return Ok(false);
        };

        let mut job = match self.load_job(conn, job_id).await {
            Ok(job) => job,
            Err(NotificationQueueError::JobNotFound(_)) => {
                warn!("Dropping job {} from {} list: its data has expired", job_id, list);
                let _: () = conn.lrem(self.list_key(list), 0, raw_id).await?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if job.status.is_terminal() {
            let _: () = conn.lrem(self.list_key(list), 0, raw_id).await?;
            return Ok(false);
        }
        if job.updated_at > cutoff {
            return Ok(false);
        }

        if job.status == JobStatus::InFlight {
            let abandoned_by = job.worker_id.clone().unwrap_or_default();
            let target = record_failure(&mut job, format!("Abandoned by worker '{}'", abandoned_by))?;
            self.store_job(conn, &job).await?;

            if target == JobStatus::DeadLetter {
                warn!("Stale job {} exhausted its attempts", job_id);
                self.bury_id(conn, raw_id, list).await?;
                self.stats.write().await.dead_lettered += 1;
                return Ok(false);
            }
            self.stats.write().await.retried += 1;
        }

        // Queued: popped by a worker that died before marking it in flight.
        self.move_id(conn, raw_id, list, "pending").await?;
        self.stats.write().await.queued_jobs += 1;
        Ok(true)
    }

    async fn store_job(&self, conn: &mut Connection, job: &NotificationJob) -> Result<(), NotificationQueueError> {
        let job_key = self.job_key(job.job_id);
        let data = serde_json::to_string(job)?;
        let status = serde_json::to_string(&job.status)?;
        let updated_at = job.updated_at.to_rfc3339();

        let _: () = conn
            .hset_multiple(
                &job_key,
                &[
                    ("data", data.as_str()),
                    ("status", status.as_str()),
                    ("updated_at", updated_at.as_str()),
                ],
            )
            .await?;
        let _: () = conn.expire(&job_key, JOB_TTL_SECONDS).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn push(&self, job: NotificationJob) -> Result<(), NotificationQueueError> {
        if job.status != JobStatus::Queued {
            return Err(NotificationQueueError::InvalidStatusTransition {
                from: job.status,
                to: JobStatus::Queued,
            });
        }

        let mut conn = self.get_connection().await?;
        self.store_job(&mut conn, &job).await?;
        let _: () = conn.lpush(self.list_key("pending"), job.job_id.to_string()).await?;

        self.stats.write().await.queued_jobs += 1;
        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn pop(&self, worker_id: &str, wait: Duration) -> Result<Option<NotificationJob>, NotificationQueueError> {
        let mut conn = self.get_connection().await?;

        // A zero timeout would block forever in BRPOPLPUSH.
        let wait_seconds = wait.as_secs_f64().max(0.1);
        let job_id: Option<String> = conn
            .brpoplpush(self.list_key("pending"), self.list_key("processing"), wait_seconds)
            .await?;

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let job_id = Uuid::parse_str(&job_id)
            .map_err(|e| NotificationQueueError::QueueError(format!("Corrupt job id '{}': {}", job_id, e)))?;

        let mut job = self.load_job(&mut conn, job_id).await?;
        transition(&mut job, JobStatus::InFlight)?;
        job.attempts += 1;
        job.worker_id = Some(worker_id.to_string());
        self.store_job(&mut conn, &job).await?;

        {
            let mut stats = self.stats.write().await;
            stats.queued_jobs = stats.queued_jobs.saturating_sub(1);
            stats.in_flight_jobs += 1;
        }

        debug!("Job {} dequeued by worker {}", job.job_id, worker_id);
        Ok(Some(job))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), NotificationQueueError> {
        let mut conn = self.get_connection().await?;

        let mut job = self.load_job(&mut conn, job_id).await?;
        transition(&mut job, JobStatus::Delivered)?;
        self.store_job(&mut conn, &job).await?;
        let _: () = conn.lrem(self.list_key("processing"), 1, job_id.to_string()).await?;

        let mut stats = self.stats.write().await;
        stats.in_flight_jobs = stats.in_flight_jobs.saturating_sub(1);
        stats.delivered += 1;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: String) -> Result<NotificationJob, NotificationQueueError> {
        let mut conn = self.get_connection().await?;

        let mut job = self.load_job(&mut conn, job_id).await?;
        let target = record_failure(&mut job, error)?;
        self.store_job(&mut conn, &job).await?;

        let raw_id = job_id.to_string();
        if target == JobStatus::DeadLetter {
            self.bury_id(&mut conn, &raw_id, "processing").await?;
        } else {
            self.move_id(&mut conn, &raw_id, "processing", "retry").await?;
        }

        let mut stats = self.stats.write().await;
        stats.in_flight_jobs = stats.in_flight_jobs.saturating_sub(1);
        if target == JobStatus::DeadLetter {
            stats.dead_lettered += 1;
        } else {
            stats.retried += 1;
        }

        Ok(job)
    }

    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationQueueError> {
        let mut conn = self.get_connection().await?;

        let job = self.load_job(&mut conn, job_id).await?;
        if job.status != JobStatus::FailedRetry {
            return Err(NotificationQueueError::InvalidStatusTransition {
                from: job.status,
                to: JobStatus::InFlight,
            });
        }

        self.move_id(&mut conn, &job_id.to_string(), "retry", "pending").await?;
        self.stats.write().await.queued_jobs += 1;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<NotificationJob>, NotificationQueueError> {
        let mut conn = self.get_connection().await?;

        let ids: Vec<String> = conn.lrange(self.list_key("dead_letter"), 0, -1).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(job_id) = Uuid::parse_str(&id) else {
                continue;
            };
            // Expired hashes leave dangling ids behind.
            match self.load_job(&mut conn, job_id).await {
                Ok(job) => jobs.push(job),
                Err(NotificationQueueError::JobNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    async fn stats(&self) -> QueueStats {
        self.stats.read().await.clone()
    }

    async fn recover_stale(&self, stale_after: Duration) -> Result<usize, NotificationQueueError> {
        let Some(cutoff) = stale_cutoff(stale_after) else {
            return Ok(0);
        };
        let mut conn = self.get_connection().await?;

        let mut recovered = 0;
        for list in ["processing", "retry"] {
            let ids: Vec<String> = conn.lrange(self.list_key(list), 0, -1).await?;
            for raw_id in ids {
                if self.recover_entry(&mut conn, list, &raw_id, cutoff).await? {
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            warn!("Recovered {} stale notification jobs", recovered);
        }
        Ok(recovered)
    }
}
