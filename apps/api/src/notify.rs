//! Eligible-list events for the external email dispatcher.
//!
//! When a round opens, the engine publishes who is eligible. Delivery is not
//! our concern: events are pushed onto a Redis list and a separate worker
//! sends the mail. Publishing never blocks or fails a pipeline operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Client as RedisClient;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::student::StudentRef;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibleListEvent {
    pub company_id: Uuid,
    pub company_name: String,
    pub college: String,
    pub round_index: usize,
    pub round_name: String,
    pub students: Vec<StudentRef>,
    pub emitted_at: DateTime<Utc>,
}

/// Carried in `AppState` as `Arc<dyn EligibleListNotifier>`.
#[async_trait]
pub trait EligibleListNotifier: Send + Sync {
    async fn publish(&self, event: &EligibleListEvent) -> Result<(), NotifyError>;
}

/// Pushes events as JSON onto a Redis list (`RPUSH`).
pub struct RedisQueueNotifier {
    client: RedisClient,
    queue: String,
}

impl RedisQueueNotifier {
    pub fn new(client: RedisClient, queue: impl Into<String>) -> Self {
        Self {
            client,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl EligibleListNotifier for RedisQueueNotifier {
    async fn publish(&self, event: &EligibleListEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("RPUSH")
            .arg(&self.queue)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(
            "Queued eligible list for company {} round {} on {}",
            event.company_id, event.round_index, self.queue
        );
        Ok(())
    }
}

/// Used when no Redis is configured: the event is only logged.
pub struct LogOnlyNotifier;

#[async_trait]
impl EligibleListNotifier for LogOnlyNotifier {
    async fn publish(&self, event: &EligibleListEvent) -> Result<(), NotifyError> {
        info!(
            company_id = %event.company_id,
            round_index = event.round_index,
            students = event.students.len(),
            "Eligible list ready for '{}' (no dispatcher queue configured)",
            event.round_name
        );
        Ok(())
    }
}
