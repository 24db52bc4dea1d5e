//! Global hotkey backend on top of the `global-hotkey` crate
//!
//! Key combinations are registered with the OS (Carbon `RegisterEventHotKey`
//! on macOS). Fired hotkeys arrive on the crate's process-wide event channel,
//! which a dedicated drain thread empties and routes to the installed
//! listener's callback. The thread lives as long as the backend, so
//! installing or removing a listener never waits on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tracing::{debug, error, info, warn};

use super::backend::{
    BackendError, BindingHandle, FireCallback, HotKeyId, HotkeyBackend, ListenerHandle,
};
use super::keys::{KeyBinding, ModifierMask};

/// Only one listener may receive OS hotkey events per process
static LISTENER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// How often the drain thread checks whether it should stop
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// OS hotkey id -> application hotkey id
type Routes = Arc<Mutex<HashMap<u32, HotKeyId>>>;

/// Signature and callback of the installed listener, if any
type Sink = Arc<Mutex<Option<(u32, FireCallback)>>>;

struct DrainThread {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Hotkey backend backed by the operating system. One per process.
pub struct GlobalHotkeyBackend {
    manager: GlobalHotKeyManager,
    drain: Option<DrainThread>,
    listener: Option<ListenerHandle>,
    sink: Sink,
    bound: HashMap<BindingHandle, HotKey>,
    routes: Routes,
    next_handle: u64,
}

impl GlobalHotkeyBackend {
    /// Connect to the OS hotkey facility.
    ///
    /// On macOS this must run on the main thread, which also has to pump
    /// its run loop for hotkey events to be delivered.
    pub fn new() -> Result<Self, BackendError> {
        let manager = GlobalHotKeyManager::new().map_err(|e| BackendError::Os(e.to_string()))?;
        Ok(Self {
            manager,
            drain: None,
            listener: None,
            sink: Arc::new(Mutex::new(None)),
            bound: HashMap::new(),
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_handle: 1,
        })
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Start the drain thread on first use
    fn ensure_drain_thread(&mut self) -> Result<(), BackendError> {
        if self.drain.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let sink = Arc::clone(&self.sink);
        let routes = Arc::clone(&self.routes);
        let thread_running = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                debug!("hotkey drain thread started");
                run_drain(sink, routes, thread_running);
                debug!("hotkey drain thread stopped");
            })
            .map_err(|e| BackendError::Os(format!("failed to spawn listener thread: {e}")))?;

        self.drain = Some(DrainThread {
            running,
            thread: Some(thread),
        });
        Ok(())
    }

    fn set_sink(&self, value: Option<(u32, FireCallback)>) {
        *self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
    }
}

impl HotkeyBackend for GlobalHotkeyBackend {
    fn install_listener(
        &mut self,
        signature: u32,
        on_fire: FireCallback,
    ) -> Result<ListenerHandle, BackendError> {
        if LISTENER_INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(BackendError::ListenerBusy);
        }

        if let Err(e) = self.ensure_drain_thread() {
            LISTENER_INSTALLED.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.set_sink(Some((signature, on_fire)));
        let handle = ListenerHandle(self.next_handle());
        self.listener = Some(handle);
        info!(signature, "hotkey listener installed");
        Ok(handle)
    }

    fn bind(
        &mut self,
        binding: KeyBinding,
        id: HotKeyId,
        listener: ListenerHandle,
    ) -> Result<BindingHandle, BackendError> {
        if self.listener != Some(listener) {
            return Err(BackendError::UnknownListener);
        }

        let hotkey = to_os_hotkey(binding)?;
        self.manager.register(hotkey).map_err(|e| match e {
            global_hotkey::Error::AlreadyRegistered(_) | global_hotkey::Error::FailedToRegister(_) => {
                BackendError::Conflict
            }
            other => BackendError::Os(other.to_string()),
        })?;

        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(hotkey.id(), id);
        }
        let handle = BindingHandle(self.next_handle());
        self.bound.insert(handle, hotkey);
        debug!(os_id = hotkey.id(), ?binding, "hotkey bound");
        Ok(handle)
    }

    fn unbind(&mut self, handle: BindingHandle) {
        let Some(hotkey) = self.bound.remove(&handle) else {
            return;
        };
        if let Ok(mut routes) = self.routes.lock() {
            routes.remove(&hotkey.id());
        }
        if let Err(e) = self.manager.unregister(hotkey) {
            warn!(?e, os_id = hotkey.id(), "failed to unregister hotkey");
        }
    }

    fn remove_listener(&mut self, handle: ListenerHandle) {
        if self.listener != Some(handle) {
            return;
        }
        self.listener = None;
        self.set_sink(None);
        LISTENER_INSTALLED.store(false, Ordering::SeqCst);
        info!("hotkey listener removed");
    }
}

impl Drop for GlobalHotkeyBackend {
    fn drop(&mut self) {
        let handles: Vec<BindingHandle> = self.bound.keys().copied().collect();
        for handle in handles {
            self.unbind(handle);
        }
        if let Some(handle) = self.listener {
            self.remove_listener(handle);
        }
        if let Some(mut drain) = self.drain.take() {
            drain.running.store(false, Ordering::SeqCst);
            if let Some(thread) = drain.thread.take() {
                if thread.join().is_err() {
                    error!("hotkey drain thread panicked");
                }
            }
        }
    }
}

/// Drain OS hotkey events until `running` is cleared
fn run_drain(sink: Sink, routes: Routes, running: Arc<AtomicBool>) {
    let receiver = GlobalHotKeyEvent::receiver();

    while running.load(Ordering::SeqCst) {
        let event = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(e) if e.is_timeout() => continue,
            Err(_) => {
                warn!("hotkey event channel disconnected");
                break;
            }
        };

        // Resolve under the locks, call back outside them
        let target = {
            let routes = routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let sink = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sink.as_ref().and_then(|(signature, on_fire)| {
                route(&event, &routes, *signature).map(|id| (id, Arc::clone(on_fire)))
            })
        };

        match target {
            Some((id, on_fire)) => on_fire(id),
            None => debug!(os_id = event.id, "hotkey event not routed"),
        }
    }
}

/// Pick the application hotkey an OS event should fire, if any.
///
/// Only presses count, so one trigger fires once. Events for ids that are
/// not bound, or bound under another signature, are dropped.
fn route(
    event: &GlobalHotKeyEvent,
    routes: &HashMap<u32, HotKeyId>,
    signature: u32,
) -> Option<HotKeyId> {
    if event.state != HotKeyState::Pressed {
        return None;
    }
    routes
        .get(&event.id)
        .copied()
        .filter(|id| id.signature == signature)
}

/// Translate a Carbon-style binding to the crate's key representation
fn to_os_hotkey(binding: KeyBinding) -> Result<HotKey, BackendError> {
    let code = os_code(binding.key_code).ok_or(BackendError::UnsupportedKey(binding.key_code))?;

    let mut mods = Modifiers::empty();
    if binding.modifiers.contains(ModifierMask::COMMAND) {
        mods |= Modifiers::META;
    }
    if binding.modifiers.contains(ModifierMask::SHIFT) {
        mods |= Modifiers::SHIFT;
    }
    if binding.modifiers.contains(ModifierMask::OPTION) {
        mods |= Modifiers::ALT;
    }
    if binding.modifiers.contains(ModifierMask::CONTROL) {
        mods |= Modifiers::CONTROL;
    }

    Ok(HotKey::new(Some(mods), code))
}

/// macOS virtual key code -> physical key
fn os_code(key_code: u32) -> Option<Code> {
    let code = match key_code {
        0 => Code::KeyA,
        1 => Code::KeyS,
        2 => Code::KeyD,
        3 => Code::KeyF,
        4 => Code::KeyH,
        5 => Code::KeyG,
        6 => Code::KeyZ,
        7 => Code::KeyX,
        8 => Code::KeyC,
        9 => Code::KeyV,
        11 => Code::KeyB,
        12 => Code::KeyQ,
        13 => Code::KeyW,
        14 => Code::KeyE,
        15 => Code::KeyR,
        16 => Code::KeyY,
        17 => Code::KeyT,
        18 => Code::Digit1,
        19 => Code::Digit2,
        20 => Code::Digit3,
        21 => Code::Digit4,
        22 => Code::Digit6,
        23 => Code::Digit5,
        24 => Code::Equal,
        25 => Code::Digit9,
        26 => Code::Digit7,
        27 => Code::Minus,
        28 => Code::Digit8,
        29 => Code::Digit0,
        30 => Code::BracketRight,
        31 => Code::KeyO,
        32 => Code::KeyU,
        33 => Code::BracketLeft,
        34 => Code::KeyI,
        35 => Code::KeyP,
        36 => Code::Enter,
        37 => Code::KeyL,
        38 => Code::KeyJ,
        39 => Code::Quote,
        40 => Code::KeyK,
        41 => Code::Semicolon,
        42 => Code::Backslash,
        43 => Code::Comma,
        44 => Code::Slash,
        45 => Code::KeyN,
        46 => Code::KeyM,
        47 => Code::Period,
        48 => Code::Tab,
        49 => Code::Space,
        50 => Code::Backquote,
        51 => Code::Backspace,
        53 => Code::Escape,
        96 => Code::F5,
        97 => Code::F6,
        98 => Code::F7,
        99 => Code::F3,
        100 => Code::F8,
        101 => Code::F9,
        103 => Code::F11,
        109 => Code::F10,
        111 => Code::F12,
        118 => Code::F4,
        120 => Code::F2,
        122 => Code::F1,
        123 => Code::ArrowLeft,
        124 => Code::ArrowRight,
        125 => Code::ArrowDown,
        126 => Code::ArrowUp,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::registrar::{APP_SIGNATURE, SHOW_HISTORY_ID};

    #[test]
    fn test_default_binding_translation() {
        let hotkey = to_os_hotkey(KeyBinding::DEFAULT).unwrap();
        assert_eq!(hotkey, HotKey::new(Some(Modifiers::ALT), Code::KeyV));
    }

    #[test]
    fn test_all_modifiers_translation() {
        let mask = ModifierMask::COMMAND
            | ModifierMask::SHIFT
            | ModifierMask::OPTION
            | ModifierMask::CONTROL;
        let hotkey = to_os_hotkey(KeyBinding::new(8, mask)).unwrap();
        let expected = HotKey::new(
            Some(Modifiers::META | Modifiers::SHIFT | Modifiers::ALT | Modifiers::CONTROL),
            Code::KeyC,
        );
        assert_eq!(hotkey.id(), expected.id());
    }

    #[test]
    fn test_unmapped_key_is_rejected() {
        let err = to_os_hotkey(KeyBinding::new(10_000, ModifierMask::OPTION)).unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedKey(10_000)));
    }

    fn show_history_routes() -> (u32, HashMap<u32, HotKeyId>) {
        let os_id = to_os_hotkey(KeyBinding::DEFAULT).unwrap().id();
        let routes = HashMap::from([(os_id, SHOW_HISTORY_ID)]);
        (os_id, routes)
    }

    #[test]
    fn test_route_press() {
        let (os_id, routes) = show_history_routes();
        let event = GlobalHotKeyEvent {
            id: os_id,
            state: HotKeyState::Pressed,
        };
        assert_eq!(route(&event, &routes, APP_SIGNATURE), Some(SHOW_HISTORY_ID));
    }

    #[test]
    fn test_route_ignores_release() {
        let (os_id, routes) = show_history_routes();
        let event = GlobalHotKeyEvent {
            id: os_id,
            state: HotKeyState::Released,
        };
        assert_eq!(route(&event, &routes, APP_SIGNATURE), None);
    }

    #[test]
    fn test_route_ignores_foreign_signature() {
        let (os_id, routes) = show_history_routes();
        let event = GlobalHotKeyEvent {
            id: os_id,
            state: HotKeyState::Pressed,
        };
        assert_eq!(route(&event, &routes, 0x7465_7374), None);
    }

    #[test]
    fn test_route_ignores_unknown_id() {
        let (os_id, routes) = show_history_routes();
        let event = GlobalHotKeyEvent {
            id: os_id.wrapping_add(1),
            state: HotKeyState::Pressed,
        };
        assert_eq!(route(&event, &routes, APP_SIGNATURE), None);
        assert_eq!(route(&event, &HashMap::new(), APP_SIGNATURE), None);
    }

    #[test]
    fn test_labelled_keys_have_os_codes() {
        for code in (0..=53).filter(|c| crate::hotkey::format::key_label(*c).is_some()) {
            assert!(os_code(code).is_some(), "key code {code} should map");
        }
    }
}
