/*!
Self-unregistering observers for Ankurah

Registering for notifications and forgetting to unregister leaves a subscription
pointing at something that no longer exists. The observers in this crate own their
subscription: it is created by the constructor and removed when the observer is dropped.

# Design requirements:
- Registration happens at construction, there is no separate register step
- Dropping the owning observer always unregisters, through the same path as `unregister()`
- `unregister()` is idempotent and safe from any thread, including concurrently with a delivery
- Once `unregister()` returns, no new delivery reaches the callback
- The observed sender/object is held weakly, an observer never keeps it alive
- Each observer has its own lock, and never holds it while calling out
- Callbacks run on a chosen [`Executor`], so they can be moved off the notifying thread

# Notification usage

```rust
use ankurah_observing::*;
use std::sync::Arc;

let center = NotificationCenter::new();
let document: Object = Arc::new("report.txt");

let observer = NotificationObserver::builder("saved")
    .sender(&document)
    .broker(center.clone())
    .callback(|_observer: &NotificationHandle, note: &Notification| {
        println!("saved {:?} bytes", note.user_info().get::<usize>("bytes"));
    })
    .register()
    .unwrap();

center.publish("saved", Some(&document), UserInfo::new().with("bytes", 512usize));
// Should print:
// saved Some(512) bytes
observer.unregister();
center.post("saved", Some(&document)); // nothing
```

# Property usage

```rust
use ankurah_observing::*;
use std::sync::Arc;

let settings = Arc::new(Properties::new());
settings.set("volume", 3u8);

let _observer = PropertyObserver::builder(&settings, "volume")
    .executor(executor::main().unwrap())
    .wait_until_finished(true)
    .callback(|_observer: &PropertyHandle<Properties>, change: &PropertyChange<Properties>| {
        assert!(executor::is_current_main());
        println!("volume {:?} -> {:?}", change.old::<u8>(), change.new_value::<u8>());
    })
    .register()
    .unwrap();

settings.set("volume", 4u8);
// Should print:
// volume Some(3) -> Some(4)
```
*/

mod broker;
mod callback;
mod error;
pub mod executor;
mod notification;
mod object;
pub mod property;
mod property_observer;
mod registration;

pub use broker::*;
pub use callback::*;
pub use error::*;
pub use executor::{Executor, ExecutorExt, ExecutorId, Inline, SerialExecutor};
pub use notification::*;
pub use object::*;
pub use property::{Change, ChangeKind, KeyValueObservable, ObservationRegistry, Properties};
pub use property_observer::*;

#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;
