use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use crate::error::SqlBridgeError;

use super::channel::Command;
use super::dispatcher::run_sqlite_worker;
use super::state::{SharedProperties, WorkerState};

// Only used to tell worker threads apart in thread names and logs.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one dedicated worker thread and its FIFO command queue.
pub(crate) struct SqliteWorker {
    id: u64,
    sender: Mutex<Option<Sender<Command>>>,
    finished: watch::Receiver<bool>,
}

impl SqliteWorker {
    pub(crate) fn spawn(props: Arc<SharedProperties>) -> Result<Self, SqlBridgeError> {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Command>();
        let (done_tx, done_rx) = watch::channel(false);
        thread::Builder::new()
            .name(format!("sqlite-worker-{id}"))
            .spawn(move || {
                let mut state = WorkerState::new(props);
                run_sqlite_worker(id, &mut state, &receiver);
                // Dropping the state closes a still-open driver handle on this thread.
                drop(state);
                done_tx.send_replace(true);
            })
            .map_err(|err| {
                SqlBridgeError::ConnectionError(format!(
                    "failed to spawn SQLite worker thread: {err}"
                ))
            })?;

        Ok(Self {
            id,
            sender: Mutex::new(Some(sender)),
            finished: done_rx,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<Command>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a command. The sender lock fixes the queue order to the real-time order in
    /// which callers got here.
    fn submit(&self, command: Command) -> Result<(), SqlBridgeError> {
        match self.sender().as_ref() {
            Some(sender) => sender.send(command).map_err(|_| SqlBridgeError::closed()),
            None => Err(SqlBridgeError::closed()),
        }
    }

    /// Run `func` on the worker thread and wait for its result without blocking the caller.
    ///
    /// Dropping the returned future does not withdraw the command: it still runs, and its
    /// result is discarded.
    pub(crate) async fn call<F, R>(&self, label: &'static str, func: F) -> Result<R, SqlBridgeError>
    where
        F: FnOnce(&mut WorkerState) -> Result<R, SqlBridgeError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(Command {
            label,
            job: Box::new(move |state| {
                let result = func(state);
                if let Err(err) = &result {
                    debug!(label, error = %err, "SQLite command failed");
                }
                if tx.send(result).is_err() {
                    trace!(label, "caller stopped waiting; result discarded");
                }
            }),
        })?;
        rx.await.map_err(|_| {
            SqlBridgeError::BridgeError(format!("SQLite worker dropped the result of {label}"))
        })?
    }

    /// Enqueue `func` without waiting for it. Returns `false` once the queue is closed.
    pub(crate) fn submit_detached<F>(&self, label: &'static str, func: F) -> bool
    where
        F: FnOnce(&mut WorkerState) + Send + 'static,
    {
        self.submit(Command {
            label,
            job: Box::new(func),
        })
        .is_ok()
    }

    /// Stop accepting commands, let the queue drain, and wait for the thread to finish.
    ///
    /// Safe to call repeatedly and to cancel: every call waits for the same completion.
    pub(crate) async fn stop(&self) {
        let sender = self.sender().take();
        if sender.is_some() {
            debug!(worker_id = self.id, "stopping SQLite worker");
        }
        drop(sender);

        let mut finished = self.finished.clone();
        // An error means the thread is gone without signalling, which is just as final.
        let _ = finished.wait_for(|done| *done).await;
    }
}
