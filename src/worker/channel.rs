use super::state::WorkerState;

pub(super) type Job = Box<dyn FnOnce(&mut WorkerState) + Send>;

/// One unit of work for the worker thread.
///
/// `job` owns the sending half of its result channel; the worker only runs it.
pub(super) struct Command {
    pub(super) label: &'static str,
    pub(super) job: Job,
}
