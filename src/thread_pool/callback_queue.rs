use super::{controller::Controller, pool::Shared, pool::WorkerPool, Command, ThreadPool};
use crate::config::Config;
use crate::error::Result;
use crate::invoker::{Invocable, Invoker};
use slog::Logger;
use std::fmt;
use std::sync::Arc;

/// Snapshot of a queue's counters. Every field may be stale by the time it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMetrics {
    pub pending: usize,
    pub executed: usize,
    pub faulted: usize,
    pub number_of_threads: usize,
    pub running: bool,
}

/// A FIFO of callables run by a resizable pool of worker threads.
///
/// The queue starts stopped with `Config::number_of_threads` idle workers.
/// [`start`](Self::start), [`stop`](Self::stop) and
/// [`set_number_of_threads`](Self::set_number_of_threads) return immediately;
/// the controller thread applies them later, in call order. Until it has,
/// [`is_running`](Self::is_running) and
/// [`number_of_threads`](Self::number_of_threads) report the previous state.
///
/// Items are handed to workers in push order. With more than one worker two
/// items may run in any order; with exactly one worker they run in push order.
///
/// Dropping the queue runs every pending item, whether the queue is running
/// or not, joins the workers and then the controller.
///
/// ```
/// use callback_queue::CallbackQueue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// {
///     let queue = CallbackQueue::new().unwrap();
///     queue.set_number_of_threads(4);
///     for _ in 0..10 {
///         let counter = counter.clone();
///         queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
///     }
///     queue.start();
/// }
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// ```
pub struct CallbackQueue {
    shared: Arc<Shared>,
    controller: Controller,
    name: String,
    logger: Logger,
}

impl CallbackQueue {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let name = config.name.clone();
        let logger = config.logger.new(o!("queue" => name.clone()));
        let shared = Arc::new(Shared::new(config.on_fault.clone()));

        let pool = WorkerPool::new(shared.clone(), config);
        let controller = Controller::spawn(pool, shared.clone(), &name, logger.clone())?;
        debug!(logger, "queue created"; "threads" => shared.number_of_threads());

        Ok(CallbackQueue {
            shared,
            controller,
            name,
            logger,
        })
    }

    /// Queues `f`. Never blocks; pushing onto a stopped queue is fine.
    pub fn push<F>(&self, f: F)
    where
        F: Invocable<()>,
    {
        self.shared.queue.push_back(Invoker::new(self.shared.next_id(), f));
    }

    /// Queues `f` to be called with the elements of the `args` tuple.
    pub fn push_with<F, Args>(&self, f: F, args: Args)
    where
        F: Invocable<Args>,
        Args: Send + 'static,
    {
        self.shared
            .queue
            .push_back(Invoker::with_args(self.shared.next_id(), f, args));
    }

    pub fn start(&self) {
        self.submit(Command::Start);
    }

    /// Workers finish their current item and then idle. Queued items stay queued.
    pub fn stop(&self) {
        self.submit(Command::Stop);
    }

    /// Requests a pool of `n` workers. The running state is not affected.
    ///
    /// When shrinking, the highest-indexed workers retire after their current
    /// item; no other choice of worker should be relied on.
    pub fn set_number_of_threads(&self, n: usize) {
        self.submit(Command::Resize(n));
    }

    /// Number of allocated workers, whether or not they are running.
    pub fn number_of_threads(&self) -> usize {
        self.shared.number_of_threads()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Items queued and not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            pending: self.pending(),
            executed: self.shared.executed(),
            faulted: self.shared.faulted(),
            number_of_threads: self.number_of_threads(),
            running: self.is_running(),
        }
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.controller.submit(command) {
            error!(self.logger, "command dropped";
                "command" => format!("{:?}", command),
                "error" => e.to_string());
        }
    }
}

impl ThreadPool for CallbackQueue {
    fn new(size: usize) -> Result<Self>
    where
        Self: Sized,
    {
        let queue = CallbackQueue::with_config(Config::default().number_of_threads(size))?;
        queue.start();
        Ok(queue)
    }

    fn execute<F>(&self, job: F) -> Result<()>
    where
        F: Send + FnOnce() + 'static,
    {
        self.push(job);
        Ok(())
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("number_of_threads", &self.number_of_threads())
            .field("pending", &self.pending())
            .finish()
    }
}

// drain and join everything when the queue is dead
impl Drop for CallbackQueue {
    fn drop(&mut self) {
        debug!(self.logger, "destroying queue"; "pending" => self.pending());
        self.controller.terminate();
    }
}
