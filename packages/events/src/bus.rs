//! Subscribe/dispatch plumbing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::event::DomainEvent;

/// A subscriber to domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// In-process event bus. Handlers run in subscription order and dispatch
/// awaits every handler before returning.
pub struct EventBus {
    by_type: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    all: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            by_type: RwLock::new(HashMap::new()),
            all: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe a handler to one event type.
    pub async fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let mut by_type = self.by_type.write().await;
        by_type.entry(event_type.into()).or_default().push(handler);
    }

    /// Subscribe a handler to every event (audit trails, test recorders).
    pub async fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        self.all.write().await.push(handler);
    }

    /// Dispatch an event to all matching handlers, in subscription order.
    pub async fn dispatch(&self, event: DomainEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "dispatching domain event"
        );

        let typed: Vec<Arc<dyn EventHandler>> = {
            let by_type = self.by_type.read().await;
            by_type.get(&event.event_type).cloned().unwrap_or_default()
        };
        for handler in typed {
            handler.handle(&event).await;
        }

        let all: Vec<Arc<dyn EventHandler>> = self.all.read().await.clone();
        for handler in all {
            handler.handle(&event).await;
        }
    }
}

/// Test double that records every event it sees.
#[derive(Default)]
pub struct RecordingHandler {
    events: parking_lot::Mutex<Vec<DomainEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &DomainEvent) {
        self.events.lock().push(event.clone());
    }
}
