use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::object::{AnyValue, Object, WeakObject};

/// Identifies one subscription within a broker
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(usize);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Data attached to a notification, keyed by name
#[derive(Clone, Default)]
pub struct UserInfo(HashMap<String, AnyValue>);

impl UserInfo {
    pub fn new() -> Self { Self::default() }

    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) { self.0.insert(key.into(), Arc::new(value)); }

    /// The value stored under `key`, if present and of type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        let value = self.0.get(key)?;
        (**value).downcast_ref::<T>()
    }

    pub fn contains_key(&self, key: &str) -> bool { self.0.contains_key(key) }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl std::fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_set().entries(self.0.keys()).finish() }
}

/// A published event: its name, the object that sent it, and attached data.
#[derive(Clone)]
pub struct Notification {
    name: String,
    sender: Option<Object>,
    user_info: UserInfo,
}

impl Notification {
    pub fn new(name: impl Into<String>, sender: Option<Object>, user_info: UserInfo) -> Self {
        Self { name: name.into(), sender, user_info }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn sender(&self) -> Option<&Object> { self.sender.as_ref() }

    pub fn user_info(&self) -> &UserInfo { &self.user_info }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("name", &self.name)
            .field("sender", &self.sender.as_ref().map(crate::object::ObjectId::of))
            .field("user_info", &self.user_info)
            .finish()
    }
}

/// Called by a broker for each matching notification
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync + 'static>;

/// A publish/subscribe broker that [`crate::NotificationObserver`]s register with.
///
/// Implementations must tolerate concurrent subscribe, unsubscribe and publish calls,
/// including calls made from inside a handler.
pub trait Broker: Send + Sync {
    /// Subscribe `handler` to notifications named `name`, only from `sender` if one is given
    fn subscribe(&self, name: &str, sender: Option<&WeakObject>, handler: NotificationHandler) -> SubscriptionId;

    /// Remove a subscription. Returns false if it was not present.
    fn unsubscribe(&self, subscription: SubscriptionId) -> bool;

    fn publish(&self, name: &str, sender: Option<&Object>, user_info: UserInfo);
}

/// An in-process [`Broker`]. Handlers run synchronously on the publishing thread.
#[derive(Clone)]
pub struct NotificationCenter(Arc<Inner>);

struct Inner {
    subscriptions: RwLock<HashMap<usize, Entry>>,
    next_id: AtomicUsize,
}

struct Entry {
    name: String,
    // held weakly, a scoped subscription must not keep its sender alive
    sender: Option<WeakObject>,
    handler: NotificationHandler,
}

impl Entry {
    fn matches(&self, name: &str, sender: Option<&Object>) -> bool {
        self.name == name
            && match (&self.sender, sender) {
                (None, _) => true,
                (Some(scope), Some(sender)) => scope.is(sender),
                (Some(_), None) => false,
            }
    }
}

static DEFAULT_CENTER: LazyLock<NotificationCenter> = LazyLock::new(NotificationCenter::new);

impl Default for NotificationCenter {
    fn default() -> Self { Self::new() }
}

impl NotificationCenter {
    pub fn new() -> Self { Self(Arc::new(Inner { subscriptions: RwLock::new(HashMap::new()), next_id: AtomicUsize::new(0) })) }

    /// The process-wide default center
    pub fn default_center() -> NotificationCenter { DEFAULT_CENTER.clone() }

    /// Convenience for publishing with no attached data
    pub fn post(&self, name: &str, sender: Option<&Object>) { self.publish(name, sender, UserInfo::new()) }

    pub fn subscriber_count(&self) -> usize { self.0.subscriptions.read().unwrap_or_else(PoisonError::into_inner).len() }

    /// Whether two handles refer to the same center
    pub fn ptr_eq(&self, other: &NotificationCenter) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl Broker for NotificationCenter {
    fn subscribe(&self, name: &str, sender: Option<&WeakObject>, handler: NotificationHandler) -> SubscriptionId {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry { name: name.to_string(), sender: sender.cloned(), handler };
        self.0.subscriptions.write().unwrap_or_else(PoisonError::into_inner).insert(id, entry);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.0.subscriptions.write().unwrap_or_else(PoisonError::into_inner).remove(&subscription.0).is_some()
    }

    fn publish(&self, name: &str, sender: Option<&Object>, user_info: UserInfo) {
        // Collect the matching handlers so none of them runs with the lock held
        let handlers = {
            let subscriptions = self.0.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
            let mut matching: Vec<(usize, NotificationHandler)> =
                subscriptions.iter().filter(|(_, entry)| entry.matches(name, sender)).map(|(id, entry)| (*id, entry.handler.clone())).collect();
            // subscription order
            matching.sort_by_key(|(id, _)| *id);
            matching
        };
        if handlers.is_empty() {
            return;
        }

        let notification = Notification::new(name, sender.cloned(), user_info);
        for (_, handler) in handlers {
            handler(&notification);
        }
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter").field("subscriptions", &self.subscriber_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counting_handler(counter: &Arc<Mutex<u32>>, amount: u32) -> NotificationHandler {
        let counter = counter.clone();
        Arc::new(move |_: &Notification| *counter.lock().unwrap() += amount)
    }

    #[test]
    fn test_multiple_subscribers() {
        let center = NotificationCenter::new();
        let counter = Arc::new(Mutex::new(0));

        let _sub1 = center.subscribe("tick", None, counting_handler(&counter, 1));
        let sub2 = center.subscribe("tick", None, counting_handler(&counter, 10));

        center.post("tick", None);
        assert_eq!(*counter.lock().unwrap(), 11);

        assert!(center.unsubscribe(sub2));
        assert!(!center.unsubscribe(sub2));

        center.post("tick", None);
        assert_eq!(*counter.lock().unwrap(), 12);
    }

    #[test]
    fn test_name_and_sender_filtering() {
        let center = NotificationCenter::new();
        let a: Object = Arc::new("A");
        let b: Object = Arc::new("B");
        let counter = Arc::new(Mutex::new(0));

        center.subscribe("tick", Some(&WeakObject::new(&a)), counting_handler(&counter, 1));

        center.post("tock", Some(&a));
        center.post("tick", Some(&b));
        center.post("tick", None);
        assert_eq!(*counter.lock().unwrap(), 0);

        center.post("tick", Some(&a));
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[test]
    fn test_scoped_subscription_does_not_keep_sender_alive() {
        let center = NotificationCenter::new();
        let sender: Object = Arc::new(42u32);
        let weak = WeakObject::new(&sender);
        center.subscribe("tick", Some(&weak), Arc::new(|_: &Notification| {}));

        drop(sender);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_user_info_is_delivered() {
        let center = NotificationCenter::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        center.subscribe(
            "tick",
            None,
            Arc::new(move |note: &Notification| {
                *seen_clone.lock().unwrap() = note.user_info().get::<i32>("count").copied();
            }),
        );

        center.publish("tick", None, UserInfo::new().with("count", 3i32));
        assert_eq!(*seen.lock().unwrap(), Some(3));
    }

    #[test]
    fn test_reentrant_unsubscribe_during_publish() {
        let center = NotificationCenter::new();
        let counter = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let id = {
            let center_clone = center.clone();
            let counter = counter.clone();
            let slot = slot.clone();
            center.subscribe(
                "tick",
                None,
                Arc::new(move |_: &Notification| {
                    *counter.lock().unwrap() += 1;
                    // unsubscribing from inside a handler must not deadlock
                    if let Some(id) = slot.lock().unwrap().take() {
                        center_clone.unsubscribe(id);
                    }
                }),
            )
        };
        *slot.lock().unwrap() = Some(id);

        center.post("tick", None);
        center.post("tick", None);
        assert_eq!(*counter.lock().unwrap(), 1);
        assert_eq!(center.subscriber_count(), 0);
    }
}
