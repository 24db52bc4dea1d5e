//! In-process stand-in for the OS hotkey facility, for tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::backend::{
    BackendError, BindingHandle, FireCallback, HotKeyId, HotkeyBackend, ListenerHandle,
};
use super::keys::KeyBinding;

#[derive(Default)]
struct FakeOs {
    listeners: HashMap<ListenerHandle, (u32, FireCallback)>,
    bindings: HashMap<BindingHandle, (KeyBinding, HotKeyId, ListenerHandle)>,
    claimed_elsewhere: HashSet<KeyBinding>,
    next_handle: u64,
}

/// Clones share the same simulated OS state
#[derive(Clone, Default)]
pub struct FakeBackend {
    os: Arc<Mutex<FakeOs>>,
}

impl FakeBackend {
    /// Pretend another process owns `binding`
    pub fn claim_elsewhere(&self, binding: KeyBinding) {
        self.os.lock().unwrap().claimed_elsewhere.insert(binding);
    }

    pub fn live_bindings(&self) -> Vec<KeyBinding> {
        let os = self.os.lock().unwrap();
        os.bindings.values().map(|(b, _, _)| *b).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.os.lock().unwrap().listeners.len()
    }

    /// Simulate the user pressing `binding`. Returns whether anything fired.
    pub fn press(&self, binding: KeyBinding) -> bool {
        let targets: Vec<(HotKeyId, FireCallback)> = {
            let os = self.os.lock().unwrap();
            os.bindings
                .values()
                .filter(|(b, _, _)| *b == binding)
                .filter_map(|(_, id, listener)| {
                    os.listeners
                        .get(listener)
                        .filter(|(signature, _)| *signature == id.signature)
                        .map(|(_, cb)| (*id, Arc::clone(cb)))
                })
                .collect()
        };
        for (id, callback) in &targets {
            callback(*id);
        }
        !targets.is_empty()
    }
}

impl HotkeyBackend for FakeBackend {
    fn install_listener(
        &mut self,
        signature: u32,
        on_fire: FireCallback,
    ) -> Result<ListenerHandle, BackendError> {
        let mut os = self.os.lock().unwrap();
        if !os.listeners.is_empty() {
            return Err(BackendError::ListenerBusy);
        }
        os.next_handle += 1;
        let handle = ListenerHandle(os.next_handle);
        os.listeners.insert(handle, (signature, on_fire));
        Ok(handle)
    }

    fn bind(
        &mut self,
        binding: KeyBinding,
        id: HotKeyId,
        listener: ListenerHandle,
    ) -> Result<BindingHandle, BackendError> {
        let mut os = self.os.lock().unwrap();
        if !os.listeners.contains_key(&listener) {
            return Err(BackendError::UnknownListener);
        }
        let taken = os.claimed_elsewhere.contains(&binding)
            || os.bindings.values().any(|(b, _, _)| *b == binding);
        if taken {
            return Err(BackendError::Conflict);
        }
        os.next_handle += 1;
        let handle = BindingHandle(os.next_handle);
        os.bindings.insert(handle, (binding, id, listener));
        Ok(handle)
    }

    fn unbind(&mut self, handle: BindingHandle) {
        self.os.lock().unwrap().bindings.remove(&handle);
    }

    fn remove_listener(&mut self, handle: ListenerHandle) {
        self.os.lock().unwrap().listeners.remove(&handle);
    }
}
