use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::broker::{Broker, Notification, NotificationCenter, NotificationHandler, SubscriptionId};
use crate::callback::{Callback, IntoCallback};
use crate::error::ObserverError;
use crate::executor::{self, Executor};
use crate::object::{Object, WeakObject};
use crate::registration::{self, Registered, Registration};

/// Observes a named notification on a [`Broker`] and unregisters itself when dropped.
///
/// ```rust
/// use ankurah_observing::*;
///
/// let center = NotificationCenter::new();
/// let observer = NotificationObserver::builder("saved")
///     .broker(center.clone())
///     .callback(|_observer: &NotificationHandle, note: &Notification| println!("{} was posted", note.name()))
///     .register()
///     .unwrap();
///
/// center.post("saved", None); // prints "saved was posted"
/// drop(observer);
/// center.post("saved", None); // nothing
/// ```
pub struct NotificationObserver(NotificationHandle);

/// A shared view of a [`NotificationObserver`], passed to its callback.
///
/// Handles can unregister the observer, but dropping one does not.
#[derive(Clone)]
pub struct NotificationHandle(Arc<Inner>);

struct Inner {
    name: String,
    sender: Option<WeakObject>,
    broker: Arc<dyn Broker>,
    // the broker's delivery context, used while no executor is set
    fallback: Arc<dyn Executor>,
    wait_until_finished: bool,
    registration: Registration<SubscriptionId, NotificationHandle, Notification>,
}

pub struct NotificationObserverBuilder {
    name: String,
    sender: Option<WeakObject>,
    broker: Option<Arc<dyn Broker>>,
    executor: Option<Arc<dyn Executor>>,
    wait_until_finished: bool,
    callback: Option<Callback<NotificationHandle, Notification>>,
}

impl NotificationObserver {
    pub fn builder(name: impl Into<String>) -> NotificationObserverBuilder {
        NotificationObserverBuilder { name: name.into(), sender: None, broker: None, executor: None, wait_until_finished: false, callback: None }
    }

    /// Observe `name` from any sender on the default center, delivering on the posting thread
    pub fn new<F>(name: impl Into<String>, callback: F) -> Result<Self, ObserverError>
    where F: IntoCallback<NotificationHandle, Notification> {
        Self::builder(name).callback(callback).register()
    }

    /// A handle that shares this observer's registration
    pub fn handle(&self) -> NotificationHandle { self.0.clone() }
}

impl std::ops::Deref for NotificationObserver {
    type Target = NotificationHandle;
    fn deref(&self) -> &NotificationHandle { &self.0 }
}

impl Drop for NotificationObserver {
    fn drop(&mut self) { self.0.unregister(); }
}

impl NotificationObserverBuilder {
    /// Only observe notifications sent by `sender`. The sender is not kept alive.
    pub fn sender(mut self, sender: &Object) -> Self {
        self.sender = Some(WeakObject::new(sender));
        self
    }

    /// Register with `broker` instead of [`NotificationCenter::default_center`]
    pub fn broker(mut self, broker: impl Broker + 'static) -> Self {
        self.broker = Some(Arc::new(broker));
        self
    }

    pub fn shared_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Run the callback on `executor` instead of the posting thread
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Block the posting thread until the callback has run on the executor
    pub fn wait_until_finished(mut self, wait: bool) -> Self {
        self.wait_until_finished = wait;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where F: IntoCallback<NotificationHandle, Notification> {
        self.callback = Some(callback.into_callback());
        self
    }

    /// Call `method` on `target` for each notification. Deliveries stop once `target` is dropped.
    pub fn method<T>(mut self, target: &Arc<T>, method: fn(&T, &NotificationHandle, &Notification)) -> Self
    where T: Send + Sync + 'static {
        self.callback = Some(Callback::method(target, method));
        self
    }

    /// Validate and subscribe. The returned observer is registered.
    pub fn register(self) -> Result<NotificationObserver, ObserverError> {
        if self.name.is_empty() {
            return Err(ObserverError::EmptyName);
        }
        let callback = self.callback.ok_or_else(|| ObserverError::MissingCallback(format!("notification {:?}", self.name)))?;
        let broker = self.broker.unwrap_or_else(|| Arc::new(NotificationCenter::default_center()));

        let inner = Arc::new(Inner {
            name: self.name,
            sender: self.sender,
            broker,
            fallback: executor::default(),
            wait_until_finished: self.wait_until_finished,
            registration: Registration::new(callback, self.executor),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let handler: NotificationHandler = Arc::new(move |notification: &Notification| {
            if let Some(inner) = weak.upgrade() {
                NotificationHandle(inner).receive(notification);
            }
        });
        let subscription = inner.broker.subscribe(&inner.name, inner.sender.as_ref(), handler);
        match inner.registration.activate(subscription) {
            Ok(()) => debug!("NotificationObserver registered for {:?} (subscription {})", inner.name, subscription),
            // unregistered by a delivery that raced the subscription
            Err(subscription) => {
                inner.broker.unsubscribe(subscription);
            }
        }

        Ok(NotificationObserver(NotificationHandle(inner)))
    }
}

impl NotificationHandle {
    pub fn name(&self) -> &str { &self.0.name }

    /// The sender this observer is scoped to, if it is scoped and the sender is still alive
    pub fn sender(&self) -> Option<Object> { self.0.sender.as_ref().and_then(WeakObject::upgrade) }

    /// Whether this observer only receives notifications from one sender
    pub fn is_scoped(&self) -> bool { self.0.sender.is_some() }

    pub fn broker(&self) -> &Arc<dyn Broker> { &self.0.broker }

    /// The executor callbacks run on, `None` meaning the broker's posting thread
    pub fn executor(&self) -> Option<Arc<dyn Executor>> { self.0.registration.executor() }

    /// Re-target future deliveries
    pub fn set_executor(&self, executor: Option<Arc<dyn Executor>>) { self.0.registration.set_executor(executor) }

    pub fn is_registered(&self) -> bool { self.0.registration.is_registered() }

    /// Remove the subscription from the broker. Idempotent and safe from any thread.
    ///
    /// Once this returns no new delivery reaches the callback. A callback that is already running may finish.
    pub fn unregister(&self) {
        match self.0.registration.deactivate() {
            Some(subscription) => {
                self.0.broker.unsubscribe(subscription);
                debug!("NotificationObserver unregistered from {:?} (subscription {})", self.0.name, subscription);
            }
            None => trace!("NotificationObserver for {:?} already unregistered", self.0.name),
        }
    }

    fn receive(&self, notification: &Notification) {
        let Some(delivery) = self.0.registration.delivery() else {
            trace!("NotificationObserver for {:?} is unregistered, ignoring notification", self.0.name);
            return;
        };
        let executor = delivery.executor.unwrap_or_else(|| self.0.fallback.clone());
        registration::deliver(self, notification.clone(), Some(executor), self.0.wait_until_finished);
    }
}

impl Registered for NotificationHandle {
    type Token = SubscriptionId;
    type Payload = Notification;

    fn registration(&self) -> &Registration<SubscriptionId, NotificationHandle, Notification> { &self.0.registration }
}

impl std::fmt::Debug for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandle")
            .field("name", &self.0.name)
            .field("sender", &self.0.sender)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl std::fmt::Debug for NotificationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_tuple("NotificationObserver").field(&self.0).finish() }
}
