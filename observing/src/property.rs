//! Property (key path) change observation.
//!
//! Objects that want to be observable implement [`KeyValueObservable`], usually by
//! embedding an [`ObservationRegistry`] and calling [`ObservationRegistry::notify`]
//! whenever a property changes. [`Properties`] is a ready-made observable property bag.

mod registry;

pub use registry::ObservationRegistry;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::object::AnyValue;

/// Identifies one registered change handler on an object
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistrationId(pub(crate) usize);

/// Called with each change of an observed key path
pub type ChangeHandler = Arc<dyn Fn(&Change) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The value was replaced as a whole
    Setting,
    /// Elements were inserted into a collection property
    Insertion,
    /// Elements were removed from a collection property
    Removal,
    /// Elements of a collection property were replaced
    Replacement,
}

/// A single property change, reporting both the old and the new value.
#[derive(Clone)]
pub struct Change {
    kind: ChangeKind,
    old: Option<AnyValue>,
    new: Option<AnyValue>,
}

impl Change {
    pub fn new(kind: ChangeKind, old: Option<AnyValue>, new: Option<AnyValue>) -> Self { Self { kind, old, new } }

    pub fn setting(old: Option<AnyValue>, new: Option<AnyValue>) -> Self { Self::new(ChangeKind::Setting, old, new) }

    pub fn kind(&self) -> ChangeKind { self.kind }

    /// The previous value, if there was one and it is a `T`
    pub fn old<T: Any>(&self) -> Option<&T> { self.old.as_deref().and_then(|value| value.downcast_ref::<T>()) }

    /// The new value, if there is one and it is a `T`
    pub fn new_value<T: Any>(&self) -> Option<&T> { self.new.as_deref().and_then(|value| value.downcast_ref::<T>()) }

    pub fn old_any(&self) -> Option<&AnyValue> { self.old.as_ref() }

    pub fn new_any(&self) -> Option<&AnyValue> { self.new.as_ref() }
}

impl std::fmt::Debug for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Change").field("kind", &self.kind).field("old", &self.old.is_some()).field("new", &self.new.is_some()).finish()
    }
}

/// An object whose properties can be observed by key path.
///
/// Implementations must accept `stop_observing` from any thread, including from
/// inside a handler, and must not hold internal locks while invoking handlers.
pub trait KeyValueObservable: Send + Sync {
    fn observe(&self, key_path: &str, handler: ChangeHandler) -> RegistrationId;

    fn stop_observing(&self, key_path: &str, registration: RegistrationId);
}

/// A thread-safe bag of named, observable values
#[derive(Default)]
pub struct Properties {
    values: RwLock<HashMap<String, AnyValue>>,
    registry: ObservationRegistry,
}

impl Properties {
    pub fn new() -> Self { Self::default() }

    /// Store `value` under `key` and notify observers of `key`
    ///
    /// Observers are called after the store lock is released. Each change's old value is the
    /// value this write replaced, but changes from concurrent `set` calls on the same key may
    /// be reported in a different order than they were stored; compare with [`Properties::get`]
    /// when the latest value matters. Changes made from one thread are reported in order.
    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let new: AnyValue = Arc::new(value);
        let old = self.values.write().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), new.clone());
        self.registry.notify(key, &Change::setting(old, Some(new)));
    }

    /// Remove the value under `key`, notifying observers if there was one
    pub fn remove(&self, key: &str) {
        let old = self.values.write().unwrap_or_else(PoisonError::into_inner).remove(key);
        if old.is_some() {
            self.registry.notify(key, &Change::setting(old, None));
        }
    }

    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).and_then(|value| (**value).downcast_ref::<T>()).cloned()
    }

    pub fn contains(&self, key: &str) -> bool { self.values.read().unwrap_or_else(PoisonError::into_inner).contains_key(key) }

    pub fn observer_count(&self, key: &str) -> usize { self.registry.observer_count(key) }
}

impl KeyValueObservable for Properties {
    fn observe(&self, key_path: &str, handler: ChangeHandler) -> RegistrationId { self.registry.add(key_path, handler) }

    fn stop_observing(&self, key_path: &str, registration: RegistrationId) { self.registry.remove(key_path, registration); }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Properties").field("keys", &values.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_set_reports_old_and_new() {
        let properties = Properties::new();
        properties.set("value", 1i32);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        properties.observe(
            "value",
            Arc::new(move |change: &Change| {
                seen_clone.lock().unwrap().push((change.kind(), change.old::<i32>().copied(), change.new_value::<i32>().copied()))
            }),
        );

        properties.set("value", 2i32);
        properties.remove("value");
        assert_eq!(*seen.lock().unwrap(), vec![(ChangeKind::Setting, Some(1), Some(2)), (ChangeKind::Setting, Some(2), None)]);
        assert_eq!(properties.get::<i32>("value"), None);
    }

    #[test]
    fn test_other_keys_are_not_reported() {
        let properties = Properties::new();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        properties.observe("value", Arc::new(move |_: &Change| *calls_clone.lock().unwrap() += 1));

        properties.set("other", "x");
        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(properties.get::<&str>("other"), Some("x"));
    }

    #[test]
    fn test_concurrent_sets_report_a_chain_of_writes() {
        let properties = Arc::new(Properties::new());
        let changes = Arc::new(Mutex::new(HashMap::new()));
        let changes_clone = changes.clone();
        properties.observe(
            "value",
            Arc::new(move |change: &Change| {
                changes_clone.lock().unwrap().insert(change.old::<u32>().copied(), change.new_value::<u32>().copied());
            }),
        );

        let writers: Vec<_> = (0..4u32)
            .map(|writer| {
                let properties = properties.clone();
                std::thread::spawn(move || {
                    for n in 0..100u32 {
                        properties.set("value", writer * 1000 + n);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        // every write replaced exactly the value before it, whatever order the reports arrived in
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 400);
        let mut current = None;
        for _ in 0..400 {
            current = changes[&current];
        }
        assert_eq!(current, properties.get::<u32>("value"));
    }
}
