//! FIFO queue of external tasks.
//!
//! Build steps queue work with [`TaskQueue::add_task`]; the coordinator flushes
//! it with [`TaskQueue::run_tasks`]. Only one flush runs at a time.

use crate::cancel::CancelToken;
use idf_error::{BuildError, BuildErrorKind, BuildResult, HalError};
use idf_hal::{ProcessSpec, ToolHal};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Started,
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub label: String,
    pub status: TaskStatus,
}

type Listener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

#[derive(Debug, Clone)]
struct QueuedTask {
    label: String,
    spec: ProcessSpec,
}

struct Inner {
    hal: Arc<dyn ToolHal>,
    pending: Mutex<VecDeque<QueuedTask>>,
    listeners: Mutex<Vec<Listener>>,
    running: AtomicBool,
    aborted: AtomicBool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending_count())
            .field("running", &self.is_running())
            .finish()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskQueue {
    pub fn new(hal: Arc<dyn ToolHal>) -> Self {
        Self {
            inner: Arc::new(Inner {
                hal,
                pending: Mutex::new(VecDeque::new()),
                listeners: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                aborted: AtomicBool::new(false),
            }),
        }
    }

    pub fn add_task(&self, label: impl Into<String>, spec: ProcessSpec) {
        let label = label.into();
        log::debug!("queued task '{}': {}", label, spec);
        locked(&self.inner.pending).push_back(QueuedTask { label, spec });
    }

    pub fn pending_count(&self) -> usize {
        locked(&self.inner.pending).len()
    }

    pub fn pending_labels(&self) -> Vec<String> {
        locked(&self.inner.pending)
            .iter()
            .map(|t| t.label.clone())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Clears an abort left behind by an earlier [`TaskQueue::cancel_tasks`].
    pub fn reset(&self) {
        self.inner.aborted.store(false, Ordering::SeqCst);
    }

    /// Drops pending tasks and kills the running one.
    pub fn cancel_tasks(&self) {
        let dropped = {
            let mut pending = locked(&self.inner.pending);
            let n = pending.len();
            pending.clear();
            n
        };
        self.inner.aborted.store(true, Ordering::SeqCst);
        log::info!("cancelling tasks ({} pending dropped)", dropped);
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        locked(&self.inner.listeners).push(Arc::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        locked(&self.inner.listeners).len()
    }

    pub fn dispose_listeners(&self) {
        locked(&self.inner.listeners).clear();
    }

    fn emit(&self, label: &str, status: TaskStatus) {
        let listeners = locked(&self.inner.listeners).clone();
        let event = TaskEvent {
            label: label.to_string(),
            status,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    fn should_stop(&self, cancel: &CancelToken) -> bool {
        cancel.is_cancelled() || self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Runs every queued task in order until the queue is empty.
    pub fn run_tasks(&self, cancel: &CancelToken) -> BuildResult<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BuildError::already_building());
        }
        let _running = RunningGuard(&self.inner.running);

        loop {
            let Some(task) = locked(&self.inner.pending).pop_front() else {
                return Ok(());
            };
            if self.should_stop(cancel) {
                locked(&self.inner.pending).clear();
                return Err(BuildError::terminated());
            }

            log::info!("▶ {}: {}", task.label, task.spec);
            self.emit(&task.label, TaskStatus::Started);
            let result = self
                .inner
                .hal
                .command_output_cancellable(&task.spec, &|| self.should_stop(cancel));

            match result {
                Ok(output) => {
                    for line in output.stdout.lines() {
                        log::debug!("[{}] {}", task.label, line);
                    }
                    self.emit(&task.label, TaskStatus::Finished);
                }
                Err(err) => {
                    self.emit(&task.label, TaskStatus::Failed(err.to_string()));
                    locked(&self.inner.pending).clear();
                    return Err(task_error(&task.label, err));
                }
            }
        }
    }
}

fn task_error(label: &str, err: HalError) -> BuildError {
    match err {
        HalError::Cancelled { .. } => BuildError::terminated(),
        other => BuildError::with_source(
            BuildErrorKind::Task,
            format!("task '{}' failed", label),
            other,
        ),
    }
}
