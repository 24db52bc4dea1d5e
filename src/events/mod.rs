//! Application-wide events
//!
//! Broadcast to every interested component (and to subscribed IPC clients)
//! over a `tokio::sync::broadcast` channel.

use serde::{Deserialize, Serialize};

/// Events published by the hotkey and settings components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// The global hotkey was pressed
    ShowHistoryRequested,

    /// The configured binding changed
    BindingChanged {
        /// New label, e.g. "⌥V"
        description: String,
    },

    /// The user asked for the clipboard history to be cleared
    ClearHistoryRequested,
}

impl std::fmt::Display for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppEvent::ShowHistoryRequested => write!(f, "SHOW_HISTORY_REQUESTED"),
            AppEvent::BindingChanged { description } => {
                write!(f, "BINDING_CHANGED ({})", description)
            }
            AppEvent::ClearHistoryRequested => write!(f, "CLEAR_HISTORY_REQUESTED"),
        }
    }
}
