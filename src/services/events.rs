//! Event system for board operations
//!
//! Services emit an event after every committed write. The daemon attaches
//! a logging listener; tests subscribe directly.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::models::Direction;

/// Events emitted by services
#[derive(Debug, Clone)]
pub enum BoardEvent {
    FeedbackCreated {
        id: i64,
        author_id: String,
    },
    FeedbackEdited {
        id: i64,
    },
    VoteApplied {
        feedback_id: i64,
        voter_id: String,
        direction: Direction,
        changed: bool,
        vote_count: usize,
    },
    IdentityRecorded {
        voter_id: String,
        name: String,
    },
    SnapshotImported {
        feedback_count: u64,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &BoardEvent);
}

/// Event bus for broadcasting board events
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: BoardEvent) {
        trace!(event = ?event, "Emitting board event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &BoardEvent) {
        match event {
            BoardEvent::FeedbackCreated { id, author_id } => {
                debug!(id, author = %author_id, "Feedback created");
            }
            BoardEvent::VoteApplied {
                feedback_id,
                voter_id,
                direction,
                changed,
                vote_count,
            } => {
                debug!(
                    id = feedback_id,
                    voter = %voter_id,
                    direction = %direction,
                    changed,
                    votes = vote_count,
                    "Vote applied"
                );
            }
            _ => {
                trace!(event = ?event, "Board event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
