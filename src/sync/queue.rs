//! Serialized task queue.
//!
//! All mutating repository work runs through one queue per store: tasks
//! execute one at a time, in enqueue order. Closing the queue lets the
//! in-flight task finish but resolves queued-but-unstarted tasks with the
//! cancel marker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::types::{SyncResult, TaskLabel};

type TaskFuture = Pin<Box<dyn Future<Output = Result<SyncResult, SyncError>> + Send>>;

struct QueuedTask {
    task_id: String,
    label: TaskLabel,
    future: TaskFuture,
    done: oneshot::Sender<Result<SyncResult, SyncError>>,
}

/// Handle to a queued task's outcome.
pub struct TaskHandle {
    rx: oneshot::Receiver<Result<SyncResult, SyncError>>,
}

impl TaskHandle {
    /// Wait for the task. A dropped task (queue closed before it started)
    /// resolves to the cancel marker.
    pub async fn wait(self) -> Result<SyncResult, SyncError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Ok(SyncResult::Canceled),
        }
    }
}

/// One-at-a-time FIFO task executor.
pub struct TaskQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<QueuedTask>>>,
    cancel: CancellationToken,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedTask>();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                let task = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    task = rx.recv() => match task {
                        Some(task) => task,
                        None => break,
                    },
                };
                tracing::debug!(task_id = %task.task_id, label = ?task.label, "Task started");
                // The in-flight task always runs to completion; close only
                // prevents further tasks from starting.
                let outcome = task.future.await;
                tracing::debug!(
                    task_id = %task.task_id,
                    ok = outcome.is_ok(),
                    "Task finished"
                );
                let _ = task.done.send(outcome);
            }
            // Drop whatever is still queued; their handles resolve to the
            // cancel marker.
            rx.close();
            while rx.try_recv().is_ok() {}
        });

        TaskQueue {
            tx: Mutex::new(Some(tx)),
            cancel,
        }
    }

    /// Enqueue a task. Returns a handle resolving to the task outcome, or
    /// to the cancel marker when the queue is already closed.
    pub fn enqueue(
        &self,
        task_id: impl Into<String>,
        label: TaskLabel,
        future: TaskFuture,
    ) -> TaskHandle {
        let (done, rx) = oneshot::channel();
        let task = QueuedTask {
            task_id: task_id.into(),
            label,
            future,
            done,
        };
        let tx = self.tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => {
                // A send failure means the worker already exited; the
                // dropped sender resolves the handle as canceled.
                let _ = tx.send(task);
            }
            None => drop(task),
        }
        TaskHandle { rx }
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
        self.cancel.cancel();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.close();
    }
}
