use std::sync::Arc;

use ::tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use super::{CurrentExecutor, Executor, ExecutorId, Work, block_on_submitted, run_reporting_panics};

/// An executor that spawns each unit of work as a task on a tokio runtime.
///
/// Tasks may run concurrently on a multi-threaded runtime, so deliveries through
/// a `TokioExecutor` are not ordered. Use [`super::SerialExecutor`] when order matters.
///
/// `submit_and_wait` called from a runtime worker thread does not stall that runtime:
/// on a multi-threaded runtime the wait happens in `block_in_place`, and when both the
/// caller and this executor are on current-thread runtimes the work runs inline.
#[derive(Clone)]
pub struct TokioExecutor(Arc<Inner>);

struct Inner {
    id: ExecutorId,
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self { Self(Arc::new(Inner { id: ExecutorId::next(), handle })) }

    /// An executor for the runtime the caller is running in, if any
    pub fn current() -> Option<Self> { Handle::try_current().ok().map(Self::new) }

    pub fn handle(&self) -> &Handle { &self.0.handle }
}

impl Executor for TokioExecutor {
    fn id(&self) -> ExecutorId { self.0.id }

    fn submit(&self, work: Work) {
        let executor = self.clone();
        self.0.handle.spawn(async move {
            let id = executor.id();
            let _guard = CurrentExecutor::enter(Arc::new(executor));
            run_reporting_panics(id, work);
        });
    }

    fn submit_and_wait(&self, work: Work) {
        if self.is_current() {
            return work();
        }
        let caller = Handle::try_current().ok().map(|runtime| runtime.runtime_flavor());
        match (caller, self.0.handle.runtime_flavor()) {
            // blocking here would stop the only thread that could run the task
            (Some(RuntimeFlavor::CurrentThread), RuntimeFlavor::CurrentThread) => {
                debug!("TokioExecutor {} waited on from a current-thread runtime, running inline", self.0.id);
                let _guard = CurrentExecutor::enter(Arc::new(self.clone()));
                work()
            }
            (Some(RuntimeFlavor::CurrentThread), _) | (None, _) => block_on_submitted(self, work),
            (Some(_), _) => ::tokio::task::block_in_place(|| block_on_submitted(self, work)),
        }
    }
}

impl std::fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("TokioExecutor").field("id", &self.0.id).finish() }
}
