//! Per-connection worker thread.
//!
//! - channel: the command type carried by the queue
//! - dispatcher: the loop that drains the queue on the worker thread
//! - manager: the caller-side handle (spawn, submit, stop)
//! - state: driver handle and buffered result sets owned by the worker thread

mod channel;
mod dispatcher;
mod manager;
mod state;

pub(crate) use manager::SqliteWorker;
pub(crate) use state::{CursorId, ExecuteSummary, SharedProperties};
