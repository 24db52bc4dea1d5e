//! Ownership of the application's single global hotkey
//!
//! The registrar holds at most one live OS registration. Re-registering
//! always tears the previous one down first, and dropping the registrar
//! releases whatever it still holds.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::AppEvent;

use super::backend::{BackendError, BindingHandle, HotKeyId, HotkeyBackend, ListenerHandle};
use super::keys::KeyBinding;

/// Four-character code "clip"
pub const APP_SIGNATURE: u32 = 0x636C_6970;

/// Id of the show-history hotkey under [`APP_SIGNATURE`]
pub const SHOW_HISTORY_ID: HotKeyId = HotKeyId {
    signature: APP_SIGNATURE,
    id: 1,
};

/// Registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarState {
    Unregistered,
    Registered(KeyBinding),
}

/// Errors from registering the hotkey
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("{binding} is already in use by another application")]
    BindingConflict { binding: KeyBinding },

    #[error("key code {0} cannot be registered as a hotkey")]
    UnsupportedKey(u32),

    #[error("failed to install hotkey listener: {0}")]
    ListenerUnavailable(String),

    #[error("hotkey registration failed: {0}")]
    Os(String),
}

impl HotkeyError {
    fn from_bind(err: BackendError, binding: KeyBinding) -> Self {
        match err {
            BackendError::Conflict => HotkeyError::BindingConflict { binding },
            BackendError::UnsupportedKey(code) => HotkeyError::UnsupportedKey(code),
            BackendError::ListenerBusy | BackendError::UnknownListener => {
                HotkeyError::ListenerUnavailable(err.to_string())
            }
            BackendError::Os(msg) => HotkeyError::Os(msg),
        }
    }
}

struct ActiveHotKey {
    binding: KeyBinding,
    listener: ListenerHandle,
    handle: BindingHandle,
}

/// Owns the live OS registration of the show-history hotkey
pub struct HotKeyRegistrar {
    backend: Box<dyn HotkeyBackend>,
    events: broadcast::Sender<AppEvent>,
    active: Option<ActiveHotKey>,
}

impl HotKeyRegistrar {
    /// Create an unregistered registrar. Fired hotkeys are published on
    /// `events` as [`AppEvent::ShowHistoryRequested`].
    pub fn new(backend: Box<dyn HotkeyBackend>, events: broadcast::Sender<AppEvent>) -> Self {
        Self {
            backend,
            events,
            active: None,
        }
    }

    pub fn state(&self) -> RegistrarState {
        match &self.active {
            Some(active) => RegistrarState::Registered(active.binding),
            None => RegistrarState::Unregistered,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    /// The binding currently armed, if any
    pub fn binding(&self) -> Option<KeyBinding> {
        self.active.as_ref().map(|a| a.binding)
    }

    /// Arm `binding`, replacing any previous registration.
    ///
    /// On failure nothing is left registered.
    pub fn register(&mut self, binding: KeyBinding) -> Result<(), HotkeyError> {
        self.unregister();

        let events = self.events.clone();
        let on_fire = Arc::new(move |id: HotKeyId| {
            debug!(id = id.id, "hotkey fired");
            // No receivers is fine; nobody is showing history right now.
            let _ = events.send(AppEvent::ShowHistoryRequested);
        });

        let listener = self
            .backend
            .install_listener(APP_SIGNATURE, on_fire)
            .map_err(|e| HotkeyError::ListenerUnavailable(e.to_string()))?;

        match self.backend.bind(binding, SHOW_HISTORY_ID, listener) {
            Ok(handle) => {
                self.active = Some(ActiveHotKey {
                    binding,
                    listener,
                    handle,
                });
                info!(key_code = binding.key_code, modifiers = binding.modifiers.bits(), %binding, "hotkey registered");
                Ok(())
            }
            Err(e) => {
                self.backend.remove_listener(listener);
                warn!(?e, %binding, "hotkey registration failed");
                Err(HotkeyError::from_bind(e, binding))
            }
        }
    }

    /// Release the OS registration and listener. No-op when unregistered.
    pub fn unregister(&mut self) {
        if let Some(active) = self.active.take() {
            self.backend.unbind(active.handle);
            self.backend.remove_listener(active.listener);
            info!(binding = %active.binding, "hotkey unregistered");
        }
    }
}

impl Drop for HotKeyRegistrar {
    fn drop(&mut self) {
        self.unregister();
    }
}
