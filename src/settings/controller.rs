//! Settings orchestration
//!
//! Ties the stored binding to the live registration and keeps observers
//! informed of the displayed label. Every operation either completes or
//! leaves storage and registration as they were.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::AppEvent;
use crate::history::HistoryStore;
use crate::hotkey::{format_binding, HotKeyRegistrar, HotkeyError, KeyBinding, RegistrarState};

use super::store::{KeyBindingStore, StoreError};

/// Errors from settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Hotkey(#[from] HotkeyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettingsError {
    /// Stable identifier for IPC error responses
    pub fn code(&self) -> &'static str {
        match self {
            SettingsError::Hotkey(HotkeyError::BindingConflict { .. }) => "binding_conflict",
            SettingsError::Hotkey(HotkeyError::UnsupportedKey(_)) => "unsupported_key",
            SettingsError::Hotkey(HotkeyError::ListenerUnavailable(_)) => "listener_unavailable",
            SettingsError::Hotkey(HotkeyError::Os(_)) => "os_error",
            SettingsError::Store(StoreError::PersistenceUnavailable(_)) => "persistence_unavailable",
        }
    }
}

/// Snapshot of the configured and live binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingStatus {
    pub binding: KeyBinding,
    pub description: String,
    pub registered: bool,
}

pub struct SettingsController {
    store: KeyBindingStore,
    registrar: HotKeyRegistrar,
    history: Arc<dyn HistoryStore>,
    events: broadcast::Sender<AppEvent>,
}

impl SettingsController {
    pub fn new(
        store: KeyBindingStore,
        registrar: HotKeyRegistrar,
        history: Arc<dyn HistoryStore>,
        events: broadcast::Sender<AppEvent>,
    ) -> Self {
        Self {
            store,
            registrar,
            history,
            events,
        }
    }

    /// Arm the stored binding, typically at startup
    pub fn activate(&mut self) -> Result<(), SettingsError> {
        let binding = self.store.get_binding();
        self.registrar.register(binding)?;
        Ok(())
    }

    pub fn current_description(&self) -> String {
        self.store.format_description()
    }

    pub fn status(&self) -> BindingStatus {
        let binding = self.store.get_binding();
        BindingStatus {
            binding,
            description: format_binding(&binding),
            registered: self.registrar.state() == RegistrarState::Registered(binding),
        }
    }

    /// Restore the default binding and re-arm it.
    ///
    /// If the default cannot be registered, the previous override is put
    /// back and re-armed before the error is returned.
    pub fn reset_binding(&mut self) -> Result<String, SettingsError> {
        let previous = self.store.stored_binding()?;
        self.store.reset_to_default()?;

        if let Err(e) = self.registrar.register(KeyBinding::DEFAULT) {
            warn!(?e, "default hotkey unavailable, rolling back reset");
            if let Some(previous) = previous {
                if let Err(e) = self.store.set_binding(previous) {
                    warn!(?e, "failed to restore previous hotkey binding");
                }
                self.rearm(Some(previous));
            }
            return Err(e.into());
        }

        info!("default hotkey re-armed");
        Ok(self.publish_description())
    }

    /// Switch to `binding`. It is persisted only once the OS accepted it.
    pub fn change_binding(&mut self, binding: KeyBinding) -> Result<String, SettingsError> {
        let previous = self.registrar.binding();

        if let Err(e) = self.registrar.register(binding) {
            self.rearm(previous);
            return Err(e.into());
        }

        if let Err(e) = self.store.set_binding(binding) {
            warn!(?e, "failed to persist hotkey binding, reverting registration");
            match previous {
                Some(_) => self.rearm(previous),
                None => self.registrar.unregister(),
            }
            return Err(e.into());
        }

        Ok(self.publish_description())
    }

    /// Ask the history owner to drop every entry
    pub fn clear_history(&self) {
        debug!("clearing clipboard history");
        self.history.clear_all();
    }

    /// Release the OS registration ahead of shutdown
    pub fn deactivate(&mut self) {
        if self.registrar.is_registered() {
            debug!("releasing show-history hotkey");
        }
        self.registrar.unregister();
    }

    /// Best-effort re-registration of a previously armed binding
    fn rearm(&mut self, previous: Option<KeyBinding>) {
        if let Some(previous) = previous {
            if let Err(e) = self.registrar.register(previous) {
                warn!(?e, binding = %previous, "failed to re-arm previous hotkey");
            }
        }
    }

    fn publish_description(&self) -> String {
        let description = self.current_description();
        let _ = self.events.send(AppEvent::BindingChanged {
            description: description.clone(),
        });
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::{tempdir, TempDir};

    use crate::hotkey::fake::FakeBackend;
    use crate::hotkey::{key_code, ModifierMask};
    use crate::settings::prefs::Preferences;

    #[derive(Default)]
    struct CountingHistory {
        clears: AtomicUsize,
    }

    impl HistoryStore for CountingHistory {
        fn clear_all(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        controller: SettingsController,
        backend: FakeBackend,
        store: KeyBindingStore,
        history: Arc<CountingHistory>,
        events: broadcast::Receiver<AppEvent>,
        _dir: TempDir,
    }

    fn fixture_at(dir: TempDir, prefs_dir: &Path) -> Fixture {
        let store = KeyBindingStore::new(Preferences::new(prefs_dir.join("preferences.json")));
        let backend = FakeBackend::default();
        let (tx, rx) = broadcast::channel(16);
        let registrar = HotKeyRegistrar::new(Box::new(backend.clone()), tx.clone());
        let history = Arc::new(CountingHistory::default());
        let controller =
            SettingsController::new(store.clone(), registrar, history.clone(), tx);
        Fixture {
            controller,
            backend,
            store,
            history,
            events: rx,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fixture_at(dir, &path)
    }

    fn command_c() -> KeyBinding {
        KeyBinding::new(key_code::C, ModifierMask::COMMAND)
    }

    #[test]
    fn test_activate_registers_stored_binding() {
        let mut f = fixture();
        f.store.set_binding(command_c()).unwrap();

        f.controller.activate().unwrap();

        assert_eq!(f.backend.live_bindings(), vec![command_c()]);
        assert_eq!(f.controller.current_description(), "⌘C");
        assert!(f.controller.status().registered);
    }

    #[test]
    fn test_reset_binding() {
        let mut f = fixture();
        f.store.set_binding(command_c()).unwrap();
        f.controller.activate().unwrap();

        let description = f.controller.reset_binding().unwrap();

        assert_eq!(description, "⌥V");
        assert_eq!(f.store.stored_binding().unwrap(), None);
        assert_eq!(f.backend.live_bindings(), vec![KeyBinding::DEFAULT]);
        assert_eq!(
            f.events.try_recv().unwrap(),
            AppEvent::BindingChanged {
                description: "⌥V".to_string()
            }
        );
    }

    #[test]
    fn test_reset_conflict_rolls_back() {
        let mut f = fixture();
        f.store.set_binding(command_c()).unwrap();
        f.controller.activate().unwrap();
        f.backend.claim_elsewhere(KeyBinding::DEFAULT);

        let err = f.controller.reset_binding().unwrap_err();

        assert_eq!(err.code(), "binding_conflict");
        assert_eq!(f.store.stored_binding().unwrap(), Some(command_c()));
        assert_eq!(f.backend.live_bindings(), vec![command_c()]);
        assert!(f.events.try_recv().is_err());
    }

    #[test]
    fn test_change_binding() {
        let mut f = fixture();
        f.controller.activate().unwrap();

        let description = f.controller.change_binding(command_c()).unwrap();

        assert_eq!(description, "⌘C");
        assert_eq!(f.store.get_binding(), command_c());
        assert_eq!(f.backend.live_bindings(), vec![command_c()]);
        assert!(f.backend.press(command_c()));
    }

    #[test]
    fn test_change_binding_conflict_keeps_previous() {
        let mut f = fixture();
        f.controller.activate().unwrap();
        f.backend.claim_elsewhere(command_c());

        let err = f.controller.change_binding(command_c()).unwrap_err();

        assert!(matches!(err, SettingsError::Hotkey(HotkeyError::BindingConflict { .. })));
        assert_eq!(f.store.stored_binding().unwrap(), None);
        assert_eq!(f.backend.live_bindings(), vec![KeyBinding::DEFAULT]);
    }

    #[test]
    fn test_change_binding_persist_failure_reverts() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut f = fixture_at(dir, &blocker);
        f.controller.activate().unwrap();

        let err = f.controller.change_binding(command_c()).unwrap_err();

        assert_eq!(err.code(), "persistence_unavailable");
        assert_eq!(f.backend.live_bindings(), vec![KeyBinding::DEFAULT]);
    }

    #[test]
    fn test_clear_history_delegates() {
        let f = fixture();
        f.controller.clear_history();
        f.controller.clear_history();
        assert_eq!(f.history.clears.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_deactivate_releases_hotkey() {
        let mut f = fixture();
        f.controller.activate().unwrap();
        f.controller.deactivate();
        assert_eq!(f.backend.live_bindings(), vec![]);
        assert!(!f.controller.status().registered);
    }
}
