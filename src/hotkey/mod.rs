//! Hotkey module for the global show-history shortcut
//!
//! Covers the binding data model, its display label, the OS registration
//! facility and the registrar that owns the single live registration.

mod backend;
#[cfg(test)]
pub(crate) mod fake;
mod format;
mod keys;
mod listener;
mod registrar;

pub use backend::{DisabledBackend, HotkeyBackend};
pub use format::format_binding;
#[cfg(test)]
pub use keys::key_code;
pub use keys::{KeyBinding, ModifierMask};
pub use listener::GlobalHotkeyBackend;
pub use registrar::{HotKeyRegistrar, HotkeyError, RegistrarState};
