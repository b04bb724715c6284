use std::{
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};

use futures::{
    future::{FutureExt, Shared},
    executor::block_on,
};
use futures_channel::oneshot;

use crate::errors::ContainerError;

/// Process scoped cancellation and the tasks observing it
///
/// Cloning is cheap, every clone observes the same cancellation.
#[derive(Clone)]
pub struct ProcessContext(Arc<ProcessInner>);

struct ProcessInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<oneshot::Sender<()>>>,
    signal: Shared<oneshot::Receiver<()>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    spawned: AtomicUsize,
}

impl Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("cancelled", &self.is_cancelled())
            .field("spawned", &self.0.spawned.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessContext {
    pub fn new() -> Self {
        let (trigger, signal) = oneshot::channel();
        ProcessContext(Arc::new(ProcessInner {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            signal: signal.shared(),
            tasks: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        }))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Completes once the process is cancelled
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let signal = self.0.signal.clone();
        async move {
            // A dropped trigger cancels as well
            let _ = signal.await;
        }
    }

    /// Runs the task on its own thread until its future completes
    ///
    /// Tasks must stop once [ProcessContext::cancelled] completes, closing the
    /// container waits for them.
    pub fn schedule<F, Fut>(&self, task: F) -> Result<(), ContainerError>
    where
        F: FnOnce(ProcessContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let index = self.0.spawned.fetch_add(1, Ordering::Relaxed);
        let ctx = self.clone();
        let handle = thread::Builder::new()
            .name(format!("gantry-task-{index}"))
            .spawn(move || block_on(task(ctx)))
            .map_err(|e| ContainerError::TaskSpawn(Arc::new(e)))?;

        tracing::debug!("Scheduled task {index}");
        self.0
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    /// Signals cancellation, only the first call has an effect
    pub(crate) fn cancel(&self) {
        if self.0.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let trigger = self
            .0
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(trigger) = trigger {
            let _ = trigger.send(());
        }
    }

    /// Waits for every scheduled task, a panicking task is logged
    ///
    /// Tasks scheduled by a task that is being joined are waited for as well.
    pub(crate) fn join(&self) {
        loop {
            let tasks: Vec<_> = self
                .0
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let name = task.thread().name().unwrap_or("gantry-task").to_string();
                if task.join().is_err() {
                    tracing::error!("Scheduled task '{name}' panicked");
                }
            }
        }
    }
}
