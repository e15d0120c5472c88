//! Idempotency replay for mutating routes.
//!
//! Keyed by `userId:Idempotency-Key`. A request in flight returns 409; a
//! completed request replays the stored response until the TTL passes.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ApiError, ErrorCode};

/// A finished response eligible for replay.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Debug, Clone)]
enum Entry {
    InProgress { expires_at: DateTime<Utc> },
    Completed {
        response: StoredResponse,
        expires_at: DateTime<Utc>,
    },
}

/// Outcome of `begin`.
pub enum IdempotencyGate {
    /// First time seeing this key: run the handler, then call `complete`.
    Proceed(IdempotencyTicket),
    /// Identical request already completed: return this.
    Replay(StoredResponse),
}

/// Hands the composite key back to `complete`/`abandon`.
pub struct IdempotencyTicket {
    key: String,
}

/// In-memory idempotency store.
pub struct IdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    fn composite_key(user_id: &str, idempotency_key: &str) -> String {
        format!("{user_id}:{idempotency_key}")
    }

    /// Mark in progress, store, return: atomic under one lock.
    pub fn begin(
        &self,
        user_id: &str,
        idempotency_key: &str,
        correlation_id: &str,
        metrics: &concord_observability::MetricsRegistry,
    ) -> Result<IdempotencyGate, ApiError> {
        let key = Self::composite_key(user_id, idempotency_key);
        let now = Utc::now();
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(Entry::InProgress { expires_at }) if *expires_at > now => {
                return Err(ApiError::new(
                    ErrorCode::Conflict,
                    "a request with this Idempotency-Key is still in progress",
                    correlation_id,
                ));
            }
            Some(Entry::Completed { response, expires_at }) if *expires_at > now => {
                metrics.inc_counter("idempotency_replays_total", &[]);
                return Ok(IdempotencyGate::Replay(response.clone()));
            }
            _ => {}
        }

        entries.insert(
            key.clone(),
            Entry::InProgress {
                expires_at: now + self.ttl,
            },
        );
        Ok(IdempotencyGate::Proceed(IdempotencyTicket { key }))
    }

    /// Store the finished response for replay.
    pub fn complete(&self, ticket: IdempotencyTicket, status: StatusCode, body: Value) {
        self.entries.lock().insert(
            ticket.key,
            Entry::Completed {
                response: StoredResponse { status, body },
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    /// Drop the in-progress marker after a handler error, so the caller can
    /// retry with the same key.
    pub fn abandon(&self, ticket: IdempotencyTicket) {
        self.entries.lock().remove(&ticket.key);
    }

    /// Test hook.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
