use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{Change, ChangeHandler, RegistrationId};

/// The change handlers registered on one object, grouped by key path.
///
/// Embed one in a type and forward [`super::KeyValueObservable`] to it.
#[derive(Default)]
pub struct ObservationRegistry {
    handlers: RwLock<HashMap<String, BTreeMap<RegistrationId, ChangeHandler>>>,
    next_id: AtomicUsize,
}

impl ObservationRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn add(&self, key_path: &str, handler: ChangeHandler) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).entry(key_path.to_string()).or_default().insert(id, handler);
        id
    }

    /// Returns false if no such registration exists
    pub fn remove(&self, key_path: &str, registration: RegistrationId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(for_key) = handlers.get_mut(key_path) else { return false };
        let removed = for_key.remove(&registration).is_some();
        if for_key.is_empty() {
            handlers.remove(key_path);
        }
        removed
    }

    /// Calls every handler registered for `key_path`, in registration order, without holding the lock
    pub fn notify(&self, key_path: &str, change: &Change) {
        let handlers: Vec<ChangeHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(key_path) {
                Some(for_key) => for_key.values().cloned().collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(change);
        }
    }

    pub fn observer_count(&self, key_path: &str) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).get(key_path).map_or(0, BTreeMap::len)
    }
}
