//! Clipboard history collaborator
//!
//! The history database belongs to the menu bar UI process. This daemon only
//! needs to ask it to clear everything.

use tokio::sync::broadcast;
use tracing::info;

use crate::events::AppEvent;

/// Something holding clipboard history that can be wiped
pub trait HistoryStore: Send + Sync {
    /// Remove every entry. Idempotent.
    fn clear_all(&self);
}

/// Forwards clear requests to the UI process as an [`AppEvent`]
///
/// Delivery is fire-and-forget: a client that is not subscribed when the
/// request goes out never sees it.
pub struct RemoteHistory {
    events: broadcast::Sender<AppEvent>,
}

impl RemoteHistory {
    pub fn new(events: broadcast::Sender<AppEvent>) -> Self {
        Self { events }
    }
}

impl HistoryStore for RemoteHistory {
    fn clear_all(&self) {
        let _ = self.events.send(AppEvent::ClearHistoryRequested);
        info!("clear history requested");
    }
}
