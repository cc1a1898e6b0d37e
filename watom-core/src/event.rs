//! Event system for observing the autosave controller

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ErrorSeverity, Result};

/// Everything the autosave controller reports while it works
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutosaveEvent {
    /// A save was armed to fire after the quiet window
    SaveScheduled {
        delay_ms: u64,
        timestamp: SystemTime,
    },
    /// A save request left the client
    SaveSent {
        request_id: Uuid,
        bytes: usize,
        timestamp: SystemTime,
    },
    /// A save found nothing to send
    SaveSkipped { timestamp: SystemTime },
    /// A save was held back behind an in-flight request
    SaveDeferred { timestamp: SystemTime },
    /// The server accepted the content as-is
    Saved {
        request_id: Uuid,
        timestamp: SystemTime,
    },
    /// The server merged with a conflict and its version replaced the local edit
    Conflict {
        request_id: Uuid,
        timestamp: SystemTime,
    },
    /// The request failed or the server refused it
    SaveFailed {
        request_id: Uuid,
        message: String,
        severity: ErrorSeverity,
        timestamp: SystemTime,
    },
    /// The preview surface was asked to reload
    PreviewReloaded { timestamp: SystemTime },
    /// Navigation was neutralized on a freshly loaded preview
    LinksDisabled { count: usize, timestamp: SystemTime },
    /// The saving marker changed
    SavingIndicator { active: bool, timestamp: SystemTime },
    /// The edit form was submitted through the navigational path
    FormSubmitted { timestamp: SystemTime },
}

impl AutosaveEvent {
    pub fn save_scheduled(delay_ms: u64) -> Self {
        Self::SaveScheduled {
            delay_ms,
            timestamp: SystemTime::now(),
        }
    }

    pub fn save_sent(request_id: Uuid, bytes: usize) -> Self {
        Self::SaveSent {
            request_id,
            bytes,
            timestamp: SystemTime::now(),
        }
    }

    pub fn save_skipped() -> Self {
        Self::SaveSkipped {
            timestamp: SystemTime::now(),
        }
    }

    pub fn save_deferred() -> Self {
        Self::SaveDeferred {
            timestamp: SystemTime::now(),
        }
    }

    pub fn saved(request_id: Uuid) -> Self {
        Self::Saved {
            request_id,
            timestamp: SystemTime::now(),
        }
    }

    pub fn conflict(request_id: Uuid) -> Self {
        Self::Conflict {
            request_id,
            timestamp: SystemTime::now(),
        }
    }

    pub fn save_failed(request_id: Uuid, message: String, severity: ErrorSeverity) -> Self {
        Self::SaveFailed {
            request_id,
            message,
            severity,
            timestamp: SystemTime::now(),
        }
    }

    pub fn preview_reloaded() -> Self {
        Self::PreviewReloaded {
            timestamp: SystemTime::now(),
        }
    }

    pub fn links_disabled(count: usize) -> Self {
        Self::LinksDisabled {
            count,
            timestamp: SystemTime::now(),
        }
    }

    pub fn saving_indicator(active: bool) -> Self {
        Self::SavingIndicator {
            active,
            timestamp: SystemTime::now(),
        }
    }

    pub fn form_submitted() -> Self {
        Self::FormSubmitted {
            timestamp: SystemTime::now(),
        }
    }

    /// Get the event type identifier
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SaveScheduled { .. } => "save_scheduled",
            Self::SaveSent { .. } => "save_sent",
            Self::SaveSkipped { .. } => "save_skipped",
            Self::SaveDeferred { .. } => "save_deferred",
            Self::Saved { .. } => "saved",
            Self::Conflict { .. } => "conflict",
            Self::SaveFailed { .. } => "save_failed",
            Self::PreviewReloaded { .. } => "preview_reloaded",
            Self::LinksDisabled { .. } => "links_disabled",
            Self::SavingIndicator { .. } => "saving_indicator",
            Self::FormSubmitted { .. } => "form_submitted",
        }
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::SaveScheduled { timestamp, .. }
            | Self::SaveSent { timestamp, .. }
            | Self::SaveSkipped { timestamp }
            | Self::SaveDeferred { timestamp }
            | Self::Saved { timestamp, .. }
            | Self::Conflict { timestamp, .. }
            | Self::SaveFailed { timestamp, .. }
            | Self::PreviewReloaded { timestamp }
            | Self::LinksDisabled { timestamp, .. }
            | Self::SavingIndicator { timestamp, .. }
            | Self::FormSubmitted { timestamp } => *timestamp,
        }
    }

    /// Human-readable one-line description
    pub fn description(&self) -> String {
        match self {
            Self::SaveScheduled { delay_ms, .. } => format!("save scheduled in {}ms", delay_ms),
            Self::SaveSent { bytes, .. } => format!("save request sent ({} bytes)", bytes),
            Self::SaveSkipped { .. } => "content unchanged, nothing to save".to_string(),
            Self::SaveDeferred { .. } => "save deferred behind in-flight request".to_string(),
            Self::Saved { .. } => "content saved".to_string(),
            Self::Conflict { .. } => "conflict: server version replaced local edits".to_string(),
            Self::SaveFailed { message, .. } => format!("save failed: {}", message),
            Self::PreviewReloaded { .. } => "preview reloaded".to_string(),
            Self::LinksDisabled { count, .. } => format!("{} preview links disabled", count),
            Self::SavingIndicator { active: true, .. } => "saving".to_string(),
            Self::SavingIndicator { active: false, .. } => "saved".to_string(),
            Self::FormSubmitted { .. } => "form submitted".to_string(),
        }
    }
}

/// Handler for autosave events
#[async_trait]
pub trait AutosaveEventHandler: Send + Sync {
    /// Handle an autosave event
    async fn handle_event(&self, event: &AutosaveEvent) -> Result<()>;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str {
        "UnnamedAutosaveEventHandler"
    }
}

/// Unique identifier for event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Event bus for publishing and subscribing to autosave events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers
    async fn publish(&self, event: AutosaveEvent) -> Result<()>;

    /// Subscribe to events
    async fn subscribe(&self, handler: Arc<dyn AutosaveEventHandler>) -> Result<SubscriptionId>;

    /// Unsubscribe from events
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Get the number of active subscriptions
    async fn subscription_count(&self) -> usize;
}

/// In-memory event bus implementation
pub struct InMemoryEventBus {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<dyn AutosaveEventHandler>>>,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: AutosaveEvent) -> Result<()> {
        tracing::trace!("Publishing event: {}", event.event_type());

        // Handlers may publish or subscribe, so the lock is not held while they run
        let handlers: Vec<Arc<dyn AutosaveEventHandler>> =
            self.subscriptions.read().await.values().cloned().collect();

        for handler in handlers {
            if let Err(e) = handler.handle_event(&event).await {
                tracing::warn!(
                    "Event handler {} failed on {}: {}",
                    handler.handler_name(),
                    event.event_type(),
                    e
                );
            }
        }

        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn AutosaveEventHandler>) -> Result<SubscriptionId> {
        let id = SubscriptionId::new();
        tracing::debug!(
            "Created subscription {:?} for handler {}",
            id,
            handler.handler_name()
        );
        self.subscriptions.write().await.insert(id, handler);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.subscriptions.write().await.remove(&id).is_some() {
            tracing::debug!("Removed subscription: {:?}", id);
        } else {
            tracing::warn!("Attempted to remove non-existent subscription: {:?}", id);
        }
        Ok(())
    }

    async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}
