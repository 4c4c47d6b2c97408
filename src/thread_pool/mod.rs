use crate::error::Result;

mod callback_queue;
mod controller;
mod pool;
mod work_queue;
pub use callback_queue::{CallbackQueue, QueueMetrics};

pub trait ThreadPool {
    fn new(size: usize) -> Result<Self>
    where
        Self: Sized;

    fn execute<F>(&self, job: F) -> Result<()>
    where
        // since function works in a thread, it must have static lifetime
        F: Send + FnOnce() + 'static;
}

/// Administrative commands, applied in order by the controller thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Start,
    Stop,
    Resize(usize),
    Terminate,
}
