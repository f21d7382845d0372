use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::callback::Callback;
use crate::executor::{Executor, ExecutorExt};

/// Lifecycle of one observer's subscription. Only ever moves forward.
enum Phase<T> {
    /// Registered, but the subscription token has not been stored yet
    Registering,
    Active(T),
    Unregistered,
}

struct State<T, H, P> {
    phase: Phase<T>,
    callback: Option<Callback<H, P>>,
    executor: Option<Arc<dyn Executor>>,
}

/// The mutable state of a single observer, behind that observer's own lock.
///
/// `T` is the token needed to undo the subscription, `H` the handle passed to callbacks, `P` the payload.
/// The lock is never held while calling into the broker, the observed object, an executor, or a callback.
pub(crate) struct Registration<T, H, P> {
    state: Mutex<State<T, H, P>>,
}

impl<T, H, P> Registration<T, H, P> {
    pub fn new(callback: Callback<H, P>, executor: Option<Arc<dyn Executor>>) -> Self {
        Self { state: Mutex::new(State { phase: Phase::Registering, callback: Some(callback), executor }) }
    }

    // Nothing user-provided runs under this lock, and unregister must keep working from Drop.
    fn lock(&self) -> MutexGuard<'_, State<T, H, P>> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Stores the subscription token. Hands the token back if the observer was
    /// unregistered while it was being subscribed, in which case the caller must undo the subscription.
    pub fn activate(&self, token: T) -> Result<(), T> {
        let mut state = self.lock();
        match state.phase {
            Phase::Registering => {
                state.phase = Phase::Active(token);
                Ok(())
            }
            _ => Err(token),
        }
    }

    /// Transitions to unregistered. Returns the token only to the one caller that must undo the subscription.
    pub fn deactivate(&self) -> Option<T> {
        let (phase, callback) = {
            let mut state = self.lock();
            (std::mem::replace(&mut state.phase, Phase::Unregistered), state.callback.take())
        };
        // dropped outside the lock, the callback may own other observers
        drop(callback);
        match phase {
            Phase::Active(token) => Some(token),
            Phase::Registering | Phase::Unregistered => None,
        }
    }

    pub fn is_registered(&self) -> bool { !matches!(self.lock().phase, Phase::Unregistered) }

    pub fn executor(&self) -> Option<Arc<dyn Executor>> { self.lock().executor.clone() }

    pub fn set_executor(&self, executor: Option<Arc<dyn Executor>>) { self.lock().executor = executor; }

    /// The configured executor, or `None` if the observer is no longer registered
    pub fn delivery(&self) -> Option<Delivery> {
        let state = self.lock();
        match state.phase {
            Phase::Unregistered => None,
            _ => Some(Delivery { executor: state.executor.clone() }),
        }
    }

    fn callback(&self) -> Option<Callback<H, P>> {
        let state = self.lock();
        match state.phase {
            Phase::Unregistered => None,
            _ => state.callback.clone(),
        }
    }
}

pub(crate) struct Delivery {
    pub executor: Option<Arc<dyn Executor>>,
}

/// An observer handle that owns a [`Registration`]
pub(crate) trait Registered: Clone + Send + 'static {
    type Token;
    type Payload: Send + 'static;

    fn registration(&self) -> &Registration<Self::Token, Self, Self::Payload>;
}

/// Delivers `payload` to the handle's callback on `executor`, or inline when there is none.
///
/// The registration is checked again when the work actually runs, so a delivery queued
/// before `unregister()` returned never reaches the callback afterwards.
pub(crate) fn deliver<H>(handle: &H, payload: H::Payload, executor: Option<Arc<dyn Executor>>, wait: bool)
where H: Registered {
    let handle = handle.clone();
    let work = move || match handle.registration().callback() {
        Some(callback) => callback.invoke(&handle, &payload),
        None => trace!("observer was unregistered before delivery ran, suppressing"),
    };
    match executor {
        None => work(),
        Some(executor) if wait => executor.submit_and_wait(Box::new(work)),
        Some(executor) => executor.dispatch(work),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registration() -> Registration<u32, (), ()> { Registration::new(Callback::new(|_: &(), _: &()| {}), None) }

    #[test]
    fn test_deactivate_returns_token_once() {
        let registration = registration();
        assert!(registration.activate(7).is_ok());
        assert!(registration.is_registered());

        assert_eq!(registration.deactivate(), Some(7));
        assert_eq!(registration.deactivate(), None);
        assert!(!registration.is_registered());
        assert!(registration.delivery().is_none());
    }

    #[test]
    fn test_activate_after_deactivate_hands_token_back() {
        let registration = registration();
        // unregistered before the subscription token arrived
        assert_eq!(registration.deactivate(), None);
        assert_eq!(registration.activate(7), Err(7));
        assert!(!registration.is_registered());
    }

    #[test]
    fn test_concurrent_deactivate_yields_single_token() {
        let registration = Arc::new(registration());
        registration.activate(1).unwrap();
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registration = registration.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if registration.deactivate().is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
