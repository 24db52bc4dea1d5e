//! OS hotkey facility
//!
//! The registrar talks to the operating system only through this trait, so
//! the global registration namespace can be swapped for an in-process fake
//! in tests.

use std::sync::Arc;

use super::keys::KeyBinding;

/// Identifies one hotkey of one application, like Carbon's `EventHotKeyID`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotKeyId {
    pub signature: u32,
    pub id: u32,
}

/// Token for an installed listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

/// Token for a bound key combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingHandle(pub(crate) u64);

/// Invoked from the OS event context when a bound hotkey fires.
/// Must return immediately.
pub type FireCallback = Arc<dyn Fn(HotKeyId) + Send + Sync>;

/// Errors reported by the OS facility
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("key combination is already claimed")]
    Conflict,

    #[error("key code {0} has no OS key mapping")]
    UnsupportedKey(u32),

    #[error("a hotkey listener is already installed in this process")]
    ListenerBusy,

    #[error("unknown listener handle")]
    UnknownListener,

    #[error("OS error: {0}")]
    Os(String),
}

/// Process-wide keyboard hotkey registry
pub trait HotkeyBackend {
    /// Install the event listener that routes fired hotkeys carrying
    /// `signature` to `on_fire`.
    fn install_listener(
        &mut self,
        signature: u32,
        on_fire: FireCallback,
    ) -> Result<ListenerHandle, BackendError>;

    /// Bind a key combination to `id`, delivered through `listener`.
    fn bind(
        &mut self,
        binding: KeyBinding,
        id: HotKeyId,
        listener: ListenerHandle,
    ) -> Result<BindingHandle, BackendError>;

    /// Release a binding. Unknown handles are ignored.
    fn unbind(&mut self, handle: BindingHandle);

    /// Remove a listener. Unknown handles are ignored.
    fn remove_listener(&mut self, handle: ListenerHandle);
}

/// Stand-in used when the OS facility could not be opened. Every
/// registration attempt fails with the original reason.
pub struct DisabledBackend {
    reason: String,
}

impl DisabledBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl HotkeyBackend for DisabledBackend {
    fn install_listener(
        &mut self,
        _signature: u32,
        _on_fire: FireCallback,
    ) -> Result<ListenerHandle, BackendError> {
        Err(BackendError::Os(self.reason.clone()))
    }

    fn bind(
        &mut self,
        _binding: KeyBinding,
        _id: HotKeyId,
        _listener: ListenerHandle,
    ) -> Result<BindingHandle, BackendError> {
        Err(BackendError::Os(self.reason.clone()))
    }

    fn unbind(&mut self, _handle: BindingHandle) {}

    fn remove_listener(&mut self, _handle: ListenerHandle) {}
}
