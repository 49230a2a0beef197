//! Progress reporting (start/finish bracketing of long operations).

/// Progress reporting trait.
///
/// Implementations deliver the events to whoever observes the operation;
/// callers must close every started bracket exactly once, on success and
/// on failure alike.
pub trait ProgressOps {
    /// Reports that a long operation started; returns an id for closing it.
    fn report_started(&self, msg: &str) -> u64;

    /// Reports that the operation identified by `id` finished.
    fn report_finished(&self, id: u64, msg: &str);
}
