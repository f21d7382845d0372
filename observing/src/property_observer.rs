use std::any::Any;
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::callback::{Callback, IntoCallback};
use crate::error::ObserverError;
use crate::executor::{CurrentExecutor, Executor};
use crate::property::{Change, ChangeHandler, ChangeKind, KeyValueObservable, RegistrationId};
use crate::registration::{self, Registered, Registration};

/// Observes one key path of an object and unregisters itself when dropped.
///
/// The observed object is held weakly: the observer never keeps it alive, and
/// unregistering after the object is gone is a no-op. Changes may be reported
/// from any thread; unregistering may happen concurrently with a delivery.
///
/// Without an executor, the callback runs on the executor that is current on
/// the thread making the change, or synchronously on that thread if there is none.
///
/// ```rust
/// use ankurah_observing::*;
/// use std::sync::Arc;
///
/// let person = Arc::new(Properties::new());
/// person.set("age", 29u32);
///
/// let observer = PropertyObserver::new(&person, "age", |_observer: &PropertyHandle<Properties>, change: &PropertyChange<Properties>| {
///     println!("age {:?} -> {:?}", change.old::<u32>(), change.new_value::<u32>());
/// })
/// .unwrap();
///
/// person.set("age", 30u32); // prints "age Some(29) -> Some(30)"
/// drop(observer);
/// person.set("age", 31u32); // nothing
/// ```
pub struct PropertyObserver<O: KeyValueObservable + ?Sized + 'static>(PropertyHandle<O>);

/// A shared view of a [`PropertyObserver`], passed to its callback.
///
/// Handles can unregister the observer, but dropping one does not.
pub struct PropertyHandle<O: ?Sized>(Arc<Inner<O>>);

impl<O: ?Sized> Clone for PropertyHandle<O> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct Inner<O: ?Sized> {
    object: Weak<O>,
    key_path: String,
    wait_until_finished: bool,
    registration: Registration<RegistrationId, PropertyHandle<O>, PropertyChange<O>>,
}

/// What a [`PropertyObserver`] callback receives for each change
pub struct PropertyChange<O: ?Sized> {
    object: Arc<O>,
    key_path: String,
    change: Change,
}

impl<O: ?Sized> PropertyChange<O> {
    /// The observed object, kept alive for the duration of the delivery
    pub fn object(&self) -> &Arc<O> { &self.object }

    pub fn key_path(&self) -> &str { &self.key_path }

    pub fn kind(&self) -> ChangeKind { self.change.kind() }

    pub fn old<T: Any>(&self) -> Option<&T> { self.change.old::<T>() }

    pub fn new_value<T: Any>(&self) -> Option<&T> { self.change.new_value::<T>() }

    pub fn change(&self) -> &Change { &self.change }
}

pub struct PropertyObserverBuilder<O: KeyValueObservable + ?Sized + 'static> {
    object: Arc<O>,
    key_path: String,
    executor: Option<Arc<dyn Executor>>,
    wait_until_finished: bool,
    callback: Option<Callback<PropertyHandle<O>, PropertyChange<O>>>,
}

impl<O: KeyValueObservable + ?Sized + 'static> PropertyObserver<O> {
    pub fn builder(object: &Arc<O>, key_path: impl Into<String>) -> PropertyObserverBuilder<O> {
        PropertyObserverBuilder { object: object.clone(), key_path: key_path.into(), executor: None, wait_until_finished: false, callback: None }
    }

    pub fn new<F>(object: &Arc<O>, key_path: impl Into<String>, callback: F) -> Result<Self, ObserverError>
    where F: IntoCallback<PropertyHandle<O>, PropertyChange<O>> {
        Self::builder(object, key_path).callback(callback).register()
    }

    pub fn handle(&self) -> PropertyHandle<O> { self.0.clone() }
}

impl<O: KeyValueObservable + ?Sized + 'static> std::ops::Deref for PropertyObserver<O> {
    type Target = PropertyHandle<O>;
    fn deref(&self) -> &PropertyHandle<O> { &self.0 }
}

impl<O: KeyValueObservable + ?Sized + 'static> Drop for PropertyObserver<O> {
    fn drop(&mut self) { self.0.unregister(); }
}

impl<O: KeyValueObservable + ?Sized + 'static> PropertyObserverBuilder<O> {
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Block the changing thread until the callback has run on the executor
    pub fn wait_until_finished(mut self, wait: bool) -> Self {
        self.wait_until_finished = wait;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where F: IntoCallback<PropertyHandle<O>, PropertyChange<O>> {
        self.callback = Some(callback.into_callback());
        self
    }

    /// Call `method` on `target` for each change. Deliveries stop once `target` is dropped.
    pub fn method<T>(mut self, target: &Arc<T>, method: fn(&T, &PropertyHandle<O>, &PropertyChange<O>)) -> Self
    where T: Send + Sync + 'static {
        self.callback = Some(Callback::method(target, method));
        self
    }

    pub fn register(self) -> Result<PropertyObserver<O>, ObserverError> {
        if self.key_path.is_empty() {
            return Err(ObserverError::EmptyKeyPath);
        }
        let callback = self.callback.ok_or_else(|| ObserverError::MissingCallback(format!("key path {:?}", self.key_path)))?;

        let inner = Arc::new(Inner {
            object: Arc::downgrade(&self.object),
            key_path: self.key_path,
            wait_until_finished: self.wait_until_finished,
            registration: Registration::new(callback, self.executor),
        });

        let weak: Weak<Inner<O>> = Arc::downgrade(&inner);
        let handler: ChangeHandler = Arc::new(move |change: &Change| {
            if let Some(inner) = weak.upgrade() {
                PropertyHandle(inner).receive(change);
            }
        });
        let registration = self.object.observe(&inner.key_path, handler);
        match inner.registration.activate(registration) {
            Ok(()) => debug!("PropertyObserver registered for {:?} ({:?})", inner.key_path, registration),
            Err(registration) => self.object.stop_observing(&inner.key_path, registration),
        }

        Ok(PropertyObserver(PropertyHandle(inner)))
    }
}

impl<O: KeyValueObservable + ?Sized + 'static> PropertyHandle<O> {
    pub fn key_path(&self) -> &str { &self.0.key_path }

    /// The observed object, if it is still alive
    pub fn observed_object(&self) -> Option<Arc<O>> { self.0.object.upgrade() }

    /// The executor callbacks run on, `None` meaning the changing thread's current executor
    pub fn executor(&self) -> Option<Arc<dyn Executor>> { self.0.registration.executor() }

    /// Re-target future deliveries
    pub fn set_executor(&self, executor: Option<Arc<dyn Executor>>) { self.0.registration.set_executor(executor) }

    pub fn is_registered(&self) -> bool { self.0.registration.is_registered() }

    /// Stop observing the object. Idempotent, safe from any thread, and safe after the object was dropped.
    ///
    /// Never waits for a running delivery. Once this returns no new delivery reaches the callback.
    pub fn unregister(&self) {
        let Some(registration) = self.0.registration.deactivate() else {
            trace!("PropertyObserver for {:?} already unregistered", self.0.key_path);
            return;
        };
        match self.0.object.upgrade() {
            Some(object) => {
                object.stop_observing(&self.0.key_path, registration);
                debug!("PropertyObserver unregistered from {:?} ({:?})", self.0.key_path, registration);
            }
            // its registrations went away with it
            None => debug!("PropertyObserver for {:?} outlived the observed object", self.0.key_path),
        }
    }

    fn receive(&self, change: &Change) {
        let Some(delivery) = self.0.registration.delivery() else {
            trace!("PropertyObserver for {:?} is unregistered, ignoring change", self.0.key_path);
            return;
        };
        let Some(object) = self.0.object.upgrade() else {
            trace!("observed object for {:?} is gone, ignoring change", self.0.key_path);
            return;
        };
        let payload = PropertyChange { object, key_path: self.0.key_path.clone(), change: change.clone() };
        let executor = delivery.executor.or_else(CurrentExecutor::current);
        registration::deliver(self, payload, executor, self.0.wait_until_finished);
    }
}

impl<O: KeyValueObservable + ?Sized + 'static> Registered for PropertyHandle<O> {
    type Token = RegistrationId;
    type Payload = PropertyChange<O>;

    fn registration(&self) -> &Registration<RegistrationId, PropertyHandle<O>, PropertyChange<O>> { &self.0.registration }
}

impl<O: ?Sized> std::fmt::Debug for PropertyHandle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("key_path", &self.0.key_path)
            .field("object_alive", &(self.0.object.strong_count() > 0))
            .field("registered", &self.0.registration.is_registered())
            .finish()
    }
}

impl<O: KeyValueObservable + ?Sized + 'static> std::fmt::Debug for PropertyObserver<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_tuple("PropertyObserver").field(&self.0).finish() }
}
