//! Executors decide where observer callbacks run.
//!
//! An [`Executor`] accepts units of [`Work`] and runs them, possibly on another
//! thread. Observers use [`Executor::is_current`] to run a delivery inline when
//! they are already on the target executor.

mod serial;
#[cfg(feature = "tokio")]
mod runtime;

pub use serial::SerialExecutor;
#[cfg(feature = "tokio")]
pub use runtime::TokioExecutor;

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, OnceLock, mpsc};

use crate::error::ObserverError;

/// A unit of work submitted to an executor
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Identifies an executor for "am I running on it" checks
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExecutorId(usize);

static NEXT_EXECUTOR_ID: AtomicUsize = AtomicUsize::new(1);

impl ExecutorId {
    /// Reserved for [`Inline`], which runs everywhere
    const INLINE: ExecutorId = ExecutorId(0);

    pub fn next() -> Self { ExecutorId(NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl std::fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

pub trait Executor: Send + Sync {
    fn id(&self) -> ExecutorId;

    /// Queue `work` to run on this executor. Returns without waiting.
    fn submit(&self, work: Work);

    /// Whether the calling thread is currently running work for this executor
    fn is_current(&self) -> bool { CurrentExecutor::is(self.id()) }

    /// Run `work` on this executor and block until it has finished.
    ///
    /// Runs inline when already on this executor, since waiting on our own queue would never return.
    /// A panic inside `work` is re-raised on the waiting thread.
    fn submit_and_wait(&self, work: Work) {
        if self.is_current() {
            return work();
        }
        block_on_submitted(self, work)
    }
}

/// Submits `work` and blocks the calling thread until it has run, re-raising its panic
pub(crate) fn block_on_submitted<E: Executor + ?Sized>(executor: &E, work: Work) {
    let (tx, rx) = mpsc::channel::<Result<(), Box<dyn Any + Send>>>();
    executor.submit(Box::new(move || {
        let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(work)));
    }));
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(payload)) => panic::resume_unwind(payload),
        Err(_) => tracing::warn!("executor {} dropped work before running it", executor.id()),
    }
}

/// Helpers available on every executor, including `dyn Executor`
pub trait ExecutorExt: Executor {
    /// Whether this is the process-wide [`main`] executor. Does not start it.
    fn is_main(&self) -> bool { MAIN_EXECUTOR.get().is_some_and(|main| main.id() == self.id()) }

    /// Run inline if already on this executor, otherwise submit
    fn dispatch<F>(&self, work: F)
    where F: FnOnce() + Send + 'static {
        if self.is_current() { work() } else { self.submit(Box::new(work)) }
    }

    /// Submit `work`, then run `completion` on the same executor once it has finished
    fn submit_with_completion<F, C>(&self, work: F, completion: C)
    where
        F: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(move || {
            work();
            completion();
        }))
    }

    /// Submit `work`, optionally blocking until it has finished
    fn submit_wait<F>(&self, work: F, wait: bool)
    where F: FnOnce() + Send + 'static {
        if wait { self.submit_and_wait(Box::new(work)) } else { self.submit(Box::new(work)) }
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

/// Runs work immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn id(&self) -> ExecutorId { ExecutorId::INLINE }
    fn submit(&self, work: Work) { work() }
    fn is_current(&self) -> bool { true }
    fn submit_and_wait(&self, work: Work) { work() }
}

static DEFAULT_EXECUTOR: LazyLock<Arc<dyn Executor>> = LazyLock::new(|| Arc::new(Inline));

static MAIN_EXECUTOR: OnceLock<SerialExecutor> = OnceLock::new();

/// The platform default delivery context: deliver on whichever thread produced the event
pub fn default() -> Arc<dyn Executor> { DEFAULT_EXECUTOR.clone() }

/// The process-wide main executor, started on first use
pub fn main() -> Result<Arc<dyn Executor>, ObserverError> {
    if let Some(main) = MAIN_EXECUTOR.get() {
        return Ok(Arc::new(main.clone()));
    }
    let started = SerialExecutor::new("main")?;
    // a racing caller may have won, in which case `started` is dropped and its thread exits
    Ok(Arc::new(MAIN_EXECUTOR.get_or_init(|| started).clone()))
}

/// Whether the calling thread is running work for the [`main`] executor
pub fn is_current_main() -> bool { MAIN_EXECUTOR.get().is_some_and(|main| main.is_current()) }

// Thread-local stack of the executors running work on this thread. Nested when
// work submitted inline to one executor runs inside work of another.
thread_local! {
    static EXECUTOR_STACK: RefCell<Vec<Arc<dyn Executor>>> = const { RefCell::new(Vec::new()) };
}

/// Tracks which executor, if any, the calling thread is running work for
pub struct CurrentExecutor {}

impl CurrentExecutor {
    /// Marks `executor` as current until the returned guard is dropped
    pub fn enter(executor: Arc<dyn Executor>) -> EnterGuard {
        EXECUTOR_STACK.with(|stack| stack.borrow_mut().push(executor));
        EnterGuard { _private: () }
    }

    /// The innermost executor running work on this thread
    pub fn current() -> Option<Arc<dyn Executor>> { EXECUTOR_STACK.with(|stack| stack.borrow().last().cloned()) }

    pub fn is(id: ExecutorId) -> bool { EXECUTOR_STACK.with(|stack| stack.borrow().last().is_some_and(|e| e.id() == id)) }
}

/// Restores the previous current executor when dropped
pub struct EnterGuard {
    _private: (),
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        EXECUTOR_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Runs fire-and-forget work, reporting a panic instead of unwinding into the executor
pub(crate) fn run_reporting_panics(executor: ExecutorId, work: Work) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!("work on executor {} panicked: {}", executor, message);
    }
}
