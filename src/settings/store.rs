//! Persistence of the configured hotkey binding

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::hotkey::{format_binding, KeyBinding, ModifierMask};

use super::prefs::{Preferences, PrefsError};

/// Preference key for the virtual key code
pub const HOT_KEY_CODE: &str = "hotKeyCode";
/// Preference key for the modifier mask
pub const HOT_KEY_MODIFIERS: &str = "hotKeyModifiers";

/// Errors from writing the binding
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration storage unavailable: {0}")]
    PersistenceUnavailable(#[from] PrefsError),
}

/// Reads and writes the hotkey binding. Nothing is cached; every read goes
/// to the preferences file.
#[derive(Debug, Clone)]
pub struct KeyBindingStore {
    prefs: Preferences,
}

impl KeyBindingStore {
    pub fn new(prefs: Preferences) -> Self {
        Self { prefs }
    }

    /// The stored binding, or the default when none is stored or storage
    /// cannot be read.
    pub fn get_binding(&self) -> KeyBinding {
        match self.stored_binding() {
            Ok(Some(binding)) => binding,
            Ok(None) => KeyBinding::DEFAULT,
            Err(e) => {
                warn!(?e, "failed to read hotkey binding, using default");
                KeyBinding::DEFAULT
            }
        }
    }

    /// The stored override, distinguishing "nothing stored" from the default
    pub fn stored_binding(&self) -> Result<Option<KeyBinding>, StoreError> {
        let doc = self.prefs.load()?;
        let key_code = read_u32(&doc, HOT_KEY_CODE);
        let modifiers = read_u32(&doc, HOT_KEY_MODIFIERS);

        match (key_code, modifiers) {
            (Some(key_code), Some(modifiers)) => Ok(Some(KeyBinding::new(
                key_code,
                ModifierMask::from_bits(modifiers),
            ))),
            (None, None) => Ok(None),
            _ => {
                warn!("stored hotkey binding is incomplete, using default");
                Ok(None)
            }
        }
    }

    /// Persist both fields in one write
    pub fn set_binding(&self, binding: KeyBinding) -> Result<(), StoreError> {
        self.prefs.update(|doc| {
            doc.insert(HOT_KEY_CODE.to_string(), Value::from(binding.key_code));
            doc.insert(HOT_KEY_MODIFIERS.to_string(), Value::from(binding.modifiers.bits()));
        })?;
        info!(key_code = binding.key_code, modifiers = binding.modifiers.bits(), "hotkey binding saved");
        Ok(())
    }

    /// Forget any stored binding so the default applies again
    pub fn reset_to_default(&self) -> Result<(), StoreError> {
        self.prefs.update(|doc| {
            doc.remove(HOT_KEY_CODE);
            doc.remove(HOT_KEY_MODIFIERS);
        })?;
        debug!("stored hotkey binding cleared");
        Ok(())
    }

    /// Label for the current binding, e.g. "⌥V"
    pub fn format_description(&self) -> String {
        format_binding(&self.get_binding())
    }
}

/// Read an unsigned 32-bit value; anything else counts as absent
fn read_u32(doc: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = doc.get(key)?;
    let parsed = value.as_u64().and_then(|v| u32::try_from(v).ok());
    if parsed.is_none() {
        warn!(key, %value, "ignoring malformed stored value");
    }
    parsed
}
