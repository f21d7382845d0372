use std::sync::{Arc, mpsc};
use std::thread::{self, ThreadId};

use tracing::{trace, warn};

use super::{CurrentExecutor, Executor, ExecutorId, Work, run_reporting_panics};
use crate::error::ObserverError;

/// An executor backed by one dedicated, named thread. Work runs in submission order.
///
/// The thread exits once every handle is dropped and the queued work has drained.
#[derive(Clone)]
pub struct SerialExecutor(Arc<Inner>);

struct Inner {
    id: ExecutorId,
    name: String,
    thread: ThreadId,
    sender: mpsc::Sender<Work>,
}

impl SerialExecutor {
    pub fn new(name: impl Into<String>) -> Result<Self, ObserverError> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Work>();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(work) = receiver.recv() {
                    work();
                }
                trace!("executor thread {:?} exiting", thread::current().name());
            })
            .map_err(|source| ObserverError::Spawn { name: name.clone(), source })?;

        Ok(Self(Arc::new(Inner { id: ExecutorId::next(), name, thread: handle.thread().id(), sender })))
    }

    pub fn name(&self) -> &str { &self.0.name }
}

impl Executor for SerialExecutor {
    fn id(&self) -> ExecutorId { self.0.id }

    fn submit(&self, work: Work) {
        let executor = self.clone();
        let job: Work = Box::new(move || {
            let id = executor.id();
            let _guard = CurrentExecutor::enter(Arc::new(executor));
            run_reporting_panics(id, work);
        });
        if self.0.sender.send(job).is_err() {
            warn!("executor {} has stopped, dropping submitted work", self.0.name);
        }
    }

    fn is_current(&self) -> bool { thread::current().id() == self.0.thread }
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor").field("id", &self.0.id).field("name", &self.0.name).finish()
    }
}
