//! Redis Manager - Centralized Redis connection and operations
//!
//! This module handles all Redis-related operations including:
//! - Job queue operations (BLPOP)
//! - Result storage and publishing

use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::jobs::{GradeResult, WorkerJob};

/// Redis key constants
pub mod keys {
    /// Grade job queue key
    pub const GRADE_QUEUE: &str = "grade:queue";

    /// Grade result key prefix (for polling)
    pub const GRADE_RESULT_PREFIX: &str = "grade:result:";

    /// Grade result channel (for pub/sub)
    pub const GRADE_RESULT_CHANNEL: &str = "grade:results";
}

/// Configuration constants
const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour
const POP_TIMEOUT_SECS: f64 = 5.0;

/// Key a submission's result is stored under
pub fn result_key(submission_id: i64) -> String {
    format!("{}{}", keys::GRADE_RESULT_PREFIX, submission_id)
}

/// Owns the queue connection. Results go through a [`ResultPublisher`].
pub struct RedisManager {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisManager {
    async fn with_url(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self { client, conn })
    }

    /// Create a new RedisManager using the REDIS_URL environment variable.
    /// Defaults to "redis://localhost:6379" if not set.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        Self::with_url(&url).await
    }

    /// Wait up to a few seconds for the next job.
    ///
    /// Returns `None` when the queue stayed empty so callers can check for
    /// shutdown. Unparseable jobs are logged and skipped. Automatically
    /// reconnects on connection failure.
    pub async fn pop_job(&mut self) -> Result<Option<WorkerJob>> {
        let result: Option<(String, String)> =
            match self.conn.blpop(keys::GRADE_QUEUE, POP_TIMEOUT_SECS).await {
                Ok(res) => res,
                Err(e) => {
                    warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                    self.reconnect().await?;
                    return Ok(None);
                }
            };

        let Some((_, job_data)) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<WorkerJob>(&job_data) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!("Failed to parse job data: {}. Data: {}", e, job_data);
                Ok(None)
            }
        }
    }

    /// Open a separate connection for storing results from concurrent tasks
    pub async fn publisher(&self) -> Result<ResultPublisher> {
        let conn = get_connection_with_retry(&self.client).await?;
        Ok(ResultPublisher {
            client: self.client.clone(),
            conn,
        })
    }

    /// Reconnect to Redis
    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

/// Clonable handle that stores and publishes grade results
#[derive(Clone)]
pub struct ResultPublisher {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl ResultPublisher {
    /// Store a grade result in Redis.
    ///
    /// The result is stored with a 1-hour expiration and also published
    /// to a channel for real-time subscribers.
    pub async fn store_grade_result(&self, result: &GradeResult) -> Result<()> {
        let json = serde_json::to_string(result)?;
        let key = result_key(result.submission_id);
        let mut conn = self.conn.clone();

        // Try to store, retry once on a fresh connection
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store result: {}. Reconnecting...", e);
            conn = get_connection_with_retry(&self.client).await?;
            conn.set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
                .await?;
        }

        // Publish to channel (ignore errors as there may be no subscribers)
        let _ = conn
            .publish::<_, _, ()>(keys::GRADE_RESULT_CHANNEL, &json)
            .await;

        Ok(())
    }
}

/// Get a Redis connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in 3 seconds...",
                    e
                );
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
        }
    }
}
