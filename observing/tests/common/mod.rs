#![allow(unused)]
use ankurah_observing::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

/// Returns a recorder closure and a checker that drains everything recorded so far
pub fn watcher<T: Send + 'static>() -> (Arc<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let changes = changes.clone();
        Arc::new(move |value: T| changes.lock().unwrap().push(value))
    };
    let check = Box::new(move || changes.lock().unwrap().drain(..).collect::<Vec<T>>());
    (record, check)
}

/// Event names unique to one test, so tests sharing the default center don't see each other
pub fn unique_name(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A broker that forwards to a [`NotificationCenter`] and counts calls
#[derive(Clone, Default)]
pub struct CountingBroker {
    pub center: NotificationCenter,
    pub subscribes: Arc<AtomicUsize>,
    pub unsubscribes: Arc<AtomicUsize>,
}

impl CountingBroker {
    pub fn subscribes(&self) -> usize { self.subscribes.load(Ordering::SeqCst) }
    pub fn unsubscribes(&self) -> usize { self.unsubscribes.load(Ordering::SeqCst) }
}

impl Broker for CountingBroker {
    fn subscribe(&self, name: &str, sender: Option<&WeakObject>, handler: NotificationHandler) -> SubscriptionId {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.center.subscribe(name, sender, handler)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.center.unsubscribe(subscription)
    }

    fn publish(&self, name: &str, sender: Option<&Object>, user_info: UserInfo) { self.center.publish(name, sender, user_info) }
}

/// Work that blocks its executor until released, for holding deliveries in the queue
pub struct Gate {
    release: std::sync::mpsc::Sender<()>,
}

impl Gate {
    /// Blocks `executor` until the returned gate is opened or dropped
    pub fn close(executor: &dyn Executor) -> Gate {
        let (release, wait) = std::sync::mpsc::channel::<()>();
        let (started_tx, started) = std::sync::mpsc::channel::<()>();
        executor.submit(Box::new(move || {
            let _ = started_tx.send(());
            let _ = wait.recv();
        }));
        started.recv_timeout(Duration::from_secs(5)).expect("gate never started");
        Gate { release }
    }

    pub fn open(self) { let _ = self.release.send(()); }
}

/// Wait until every unit of work submitted to `executor` so far has run
pub fn drain(executor: &dyn Executor) { executor.submit_and_wait(Box::new(|| {})); }
