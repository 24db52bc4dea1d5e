//! Settings: persisted hotkey binding and the controller that applies it

mod controller;
mod prefs;
mod store;

pub use controller::{BindingStatus, SettingsController, SettingsError};
pub use prefs::Preferences;
pub use store::KeyBindingStore;
