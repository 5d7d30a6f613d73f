use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;

use tracing::{debug, error, trace};

use super::channel::Command;
use super::state::WorkerState;

pub(super) fn run_sqlite_worker(worker_id: u64, state: &mut WorkerState, receiver: &Receiver<Command>) {
    debug!(worker_id, "SQLite worker started");
    let mut processed: u64 = 0;

    // recv() keeps returning queued commands after the last sender is gone, so everything
    // accepted before shutdown still runs.
    while let Ok(Command { label, job }) = receiver.recv() {
        trace!(worker_id, label, "running command");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&mut *state))) {
            // The job's result sender was dropped while unwinding; its caller sees a
            // bridge error instead of waiting forever.
            error!(
                worker_id,
                label,
                panic = panic_message(payload.as_ref()),
                "SQLite worker command panicked"
            );
        }
        processed = processed.saturating_add(1);
    }

    debug!(worker_id, processed, "SQLite worker drained its queue");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
