//! Redis-backed work queue
//!
//! Priority tiers, the processing set and the dead-letter set are sorted sets keyed by
//! job id with a millisecond score. Moving an entry out of a tier and into the processing
//! set happens inside a single Lua script so two workers can never pop the same id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobflow_core::config::WorkQueueConfig;
use jobflow_core::models::{JobId, JobMetadata, QueueDepths, QueueTier, WorkerStat, WorkerStats};
use jobflow_core::traits::{queue_score, WorkQueue};
use jobflow_core::{JobQueueError, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::queue_keys::QueueKeys;

/// KEYS[1] = tier, KEYS[2] = processing set, ARGV[1] = now (ms)
const ACQUIRE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
    return false
end
redis.call('ZREM', KEYS[1], ids[1])
redis.call('ZADD', KEYS[2], ARGV[1], ids[1])
return ids[1]
"#;

fn queue_error(e: RedisError) -> JobQueueError {
    JobQueueError::Queue(e.to_string())
}

pub struct RedisWorkQueue {
    connection: ConnectionManager,
    keys: QueueKeys,
    poll_interval: Duration,
    acquire_script: Script,
}

impl RedisWorkQueue {
    /// Connect to Redis and verify the connection with PING
    pub async fn new(config: &WorkQueueConfig) -> Result<Self> {
        let redis_url = config.redis.build_url();
        let client = redis::Client::open(redis_url).map_err(|e| {
            JobQueueError::Queue(format!("Failed to create Redis client: {e}"))
        })?;

        let mut connection = Self::connect_with_retry(&client, config).await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(queue_error)?;
        if pong != "PONG" {
            return Err(JobQueueError::Queue(format!(
                "Unexpected PING response: {pong}"
            )));
        }

        info!(
            "Connected to Redis work queue at {}:{}/{}",
            config.redis.host, config.redis.port, config.redis.database
        );

        Ok(Self {
            connection,
            keys: QueueKeys::new(config.key_prefix.clone()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            acquire_script: Script::new(ACQUIRE_SCRIPT),
        })
    }

    async fn connect_with_retry(
        client: &redis::Client,
        config: &WorkQueueConfig,
    ) -> Result<ConnectionManager> {
        let redis = &config.redis;
        let attempts = redis.max_retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let connect = tokio::time::timeout(
                Duration::from_secs(redis.connection_timeout_seconds),
                client.get_connection_manager(),
            )
            .await;

            match connect {
                Ok(Ok(connection)) => {
                    if attempt > 0 {
                        debug!("Connected to Redis after {} attempts", attempt + 1);
                    }
                    return Ok(connection);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "timed out after {}s",
                        redis.connection_timeout_seconds
                    )
                }
            }

            if attempt + 1 < attempts {
                warn!(
                    "Redis connection attempt {}/{} to {}:{} failed: {}, retrying in {}s",
                    attempt + 1,
                    attempts,
                    redis.host,
                    redis.port,
                    last_error,
                    redis.retry_delay_seconds
                );
                tokio::time::sleep(Duration::from_secs(redis.retry_delay_seconds)).await;
            }
        }

        Err(JobQueueError::Queue(format!(
            "Failed to connect to Redis at {}:{} after {} attempts: {}",
            redis.host, redis.port, attempts, last_error
        )))
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    async fn try_acquire(&self, tier: QueueTier) -> Result<Option<JobId>> {
        let mut conn = self.connection.clone();
        let popped: Option<String> = self
            .acquire_script
            .key(self.keys.tier(tier))
            .key(self.keys.processing())
            .arg(queue_score(Utc::now()))
            .invoke_async(&mut conn)
            .await
            .map_err(queue_error)?;

        let Some(raw) = popped else {
            return Ok(None);
        };

        match JobId::parse(&raw) {
            Ok(job_id) => Ok(Some(job_id)),
            Err(e) => {
                // Drop entries that are not job ids so they are not popped again forever
                warn!("Dropping malformed entry {} from {}: {}", raw, tier, e);
                let _: i64 = conn
                    .zrem(self.keys.processing(), &raw)
                    .await
                    .map_err(queue_error)?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    #[instrument(skip(self), fields(job_id = %job_id, tier = %tier))]
    async fn enqueue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .zadd(self.keys.tier(tier), job_id.to_string(), score)
            .await
            .map_err(queue_error)?;
        debug!("Enqueued with score {}", score);
        Ok(())
    }

    async fn acquire(&self, tier: QueueTier, wait: Duration) -> Result<Option<JobId>> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(job_id) = self.try_acquire(tier).await? {
                debug!("Acquired job {} from {}", job_id, tier);
                return Ok(Some(job_id));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release(&self, job_id: &JobId) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn
            .zrem(self.keys.processing(), job_id.to_string())
            .await
            .map_err(queue_error)?;
        Ok(removed > 0)
    }

    async fn requeue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let member = job_id.to_string();
        redis::pipe()
            .atomic()
            .zrem(self.keys.processing(), &member)
            .ignore()
            .zadd(self.keys.tier(tier), &member, score)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    async fn move_to_dead_letter(&self, job_id: &JobId, score: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let member = job_id.to_string();
        redis::pipe()
            .atomic()
            .zrem(self.keys.processing(), &member)
            .ignore()
            .zadd(self.keys.dead_letter(), &member, score)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    async fn is_tracked(&self, job_id: &JobId) -> Result<bool> {
        let mut conn = self.connection.clone();
        let member = job_id.to_string();
        let scores: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) = redis::pipe()
            .zscore(self.keys.tier(QueueTier::High), &member)
            .zscore(self.keys.tier(QueueTier::Medium), &member)
            .zscore(self.keys.tier(QueueTier::Low), &member)
            .zscore(self.keys.processing(), &member)
            .query_async(&mut conn)
            .await
            .map_err(queue_error)?;
        Ok(scores.0.is_some() || scores.1.is_some() || scores.2.is_some() || scores.3.is_some())
    }

    async fn put_metadata(
        &self,
        job_id: &JobId,
        metadata: &JobMetadata,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.connection.clone();
        let key = self.keys.job(job_id);
        let fields = metadata.to_fields()?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore();
        match ttl {
            Some(ttl) => pipe.expire(&key, ttl.as_secs().max(1) as i64).ignore(),
            None => pipe.persist(&key).ignore(),
        };
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    async fn get_metadata(&self, job_id: &JobId) -> Result<Option<JobMetadata>> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.keys.job(job_id))
            .await
            .map_err(queue_error)?;
        if fields.is_empty() {
            return Ok(None);
        }
        JobMetadata::from_fields(&fields).map(Some)
    }

    async fn increment_worker_stat(&self, worker_id: &str, stat: WorkerStat) -> Result<u64> {
        let mut conn = self.connection.clone();
        let value: i64 = conn
            .hincr(self.keys.worker_stats(worker_id), stat.field_name(), 1)
            .await
            .map_err(queue_error)?;
        Ok(value.max(0) as u64)
    }

    async fn worker_stats(&self, worker_id: &str) -> Result<WorkerStats> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, u64> = conn
            .hgetall(self.keys.worker_stats(worker_id))
            .await
            .map_err(queue_error)?;
        Ok(WorkerStats {
            jobs_completed: fields
                .get(WorkerStat::JobsCompleted.field_name())
                .copied()
                .unwrap_or(0),
            jobs_failed: fields
                .get(WorkerStat::JobsFailed.field_name())
                .copied()
                .unwrap_or(0),
        })
    }

    async fn depths(&self) -> Result<QueueDepths> {
        let mut conn = self.connection.clone();
        let (high, medium, low, processing, dead_letter): (u64, u64, u64, u64, u64) =
            redis::pipe()
                .zcard(self.keys.tier(QueueTier::High))
                .zcard(self.keys.tier(QueueTier::Medium))
                .zcard(self.keys.tier(QueueTier::Low))
                .zcard(self.keys.processing())
                .zcard(self.keys.dead_letter())
                .query_async(&mut conn)
                .await
                .map_err(queue_error)?;
        Ok(QueueDepths {
            high,
            medium,
            low,
            processing,
            dead_letter,
        })
    }
}
