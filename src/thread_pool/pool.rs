use super::work_queue::{Admission, WorkQueue};
use crate::config::{Config, FaultHook};
use crate::invoker::{panic_message, Fault, Invoker};
use slog::Logger;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

/// State seen by the facade, the controller and every worker.
pub struct Shared {
    pub queue: WorkQueue,
    running: AtomicBool,
    destroying: AtomicBool,
    number_of_threads: AtomicUsize,
    next_id: AtomicU64,
    executed: AtomicUsize,
    faulted: AtomicUsize,
    on_fault: Option<FaultHook>,
    // worker and controller threads currently alive
    threads: Mutex<HashSet<ThreadId>>,
}

impl Shared {
    pub fn new(on_fault: Option<FaultHook>) -> Self {
        Shared {
            queue: WorkQueue::new(),
            running: AtomicBool::new(false),
            destroying: AtomicBool::new(false),
            number_of_threads: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            executed: AtomicUsize::new(0),
            faulted: AtomicUsize::new(0),
            on_fault,
            threads: Mutex::new(HashSet::new()),
        }
    }

    pub fn enter_thread(&self) {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread::current().id());
    }

    pub fn leave_thread(&self) {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&thread::current().id());
    }

    /// True on a worker or controller thread of this queue, where joining
    /// the controller would wait on ourselves.
    pub fn is_own_thread(&self) -> bool {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&thread::current().id())
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_destroying(&self) -> bool {
        self.destroying.load(Ordering::Acquire)
    }

    pub fn number_of_threads(&self) -> usize {
        self.number_of_threads.load(Ordering::Acquire)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn faulted(&self) -> usize {
        self.faulted.load(Ordering::Relaxed)
    }

    fn admission(&self, worker: usize, empty: bool) -> Admission {
        if worker >= self.number_of_threads() {
            Admission::Leave
        } else if self.is_destroying() {
            if empty {
                Admission::Leave
            } else {
                Admission::Take
            }
        } else if self.is_running() {
            Admission::Take
        } else {
            Admission::Wait
        }
    }

    /// Runs one invoker, keeping a panic from escaping into the caller's loop.
    fn run(&self, invoker: Invoker, worker: Option<usize>, logger: &Logger) {
        match invoker.invoke() {
            Ok(()) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(mut fault) => {
                fault.worker = worker;
                self.faulted.fetch_add(1, Ordering::Relaxed);
                error!(logger, "callback panicked";
                    "invoker" => fault.invoker,
                    "reason" => fault.message.as_str());
                self.report(&fault, logger);
            }
        }
    }

    fn report(&self, fault: &Fault, logger: &Logger) {
        if let Some(hook) = &self.on_fault {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(fault))) {
                error!(logger, "fault hook panicked";
                    "invoker" => fault.invoker,
                    "reason" => panic_message(payload.as_ref()));
            }
        }
    }
}

pub struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        shared: Arc<Shared>,
        config: &Config,
        logger: &Logger,
    ) -> std::io::Result<Self> {
        let mut builder = thread::Builder::new().name(format!("{}-{}", config.name, id));
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let logger = logger.new(o!("worker" => id));
        let thread = builder.spawn(move || {
            do_job(id, &shared, &logger);
        })?;

        Ok(Worker {
            id,
            thread: Some(thread),
        })
    }

    fn join(&mut self, logger: &Logger) {
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // cannot join ourselves, the loop exits on its own
                return;
            }
            if thread.join().is_err() {
                error!(logger, "worker thread died"; "worker" => self.id);
            }
        }
    }
}

// pop and run until told to leave
fn do_job(id: usize, shared: &Shared, logger: &Logger) {
    shared.enter_thread();
    debug!(logger, "worker started");
    while let Some(invoker) = shared.queue.pop_front(|empty| shared.admission(id, empty)) {
        shared.run(invoker, Some(id), logger);
    }
    shared.leave_thread();
    debug!(logger, "worker exiting");
}

/// The set of worker threads. Owned and mutated by the controller only.
pub struct WorkerPool {
    workers: Vec<Worker>,
    shared: Arc<Shared>,
    config: Config,
    logger: Logger,
}

impl WorkerPool {
    /// Creates the pool and spawns `config.number_of_threads` idle workers.
    pub fn new(shared: Arc<Shared>, config: Config) -> Self {
        let logger = config.logger.new(o!("queue" => config.name.clone()));
        let mut pool = WorkerPool {
            workers: Vec::with_capacity(config.number_of_threads),
            shared,
            config,
            logger,
        };
        let size = pool.config.number_of_threads;
        pool.resize(size);
        pool
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn start(&self) {
        self.shared.running.store(true, Ordering::Release);
        self.shared.queue.notify_all();
        debug!(self.logger, "queue started");
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.notify_all();
        debug!(self.logger, "queue stopped");
    }

    pub fn resize(&mut self, size: usize) {
        let current = self.workers.len();
        if size > current {
            self.grow(size);
        } else if size < current {
            self.shrink(size);
        }
    }

    fn grow(&mut self, size: usize) {
        for id in self.workers.len()..size {
            // a worker leaves at once unless its id is below the count, so the
            // count runs at most one thread ahead of the spawned workers
            self.shared.number_of_threads.store(id + 1, Ordering::Release);
            match Worker::spawn(id, self.shared.clone(), &self.config, &self.logger) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    self.shared.number_of_threads.store(id, Ordering::Release);
                    warn!(self.logger, "unable to spawn worker, pool degraded";
                        "requested" => size,
                        "spawned" => self.workers.len(),
                        "error" => e.to_string());
                    break;
                }
            }
        }
        debug!(self.logger, "pool resized"; "threads" => self.len());
    }

    fn shrink(&mut self, size: usize) {
        self.shared.number_of_threads.store(size, Ordering::Release);
        self.shared.queue.notify_all();
        // highest ids retire, each after finishing its current item
        for mut worker in self.workers.drain(size..) {
            worker.join(&self.logger);
        }
        debug!(self.logger, "pool resized"; "threads" => self.len());
    }

    /// Drains the queue regardless of the running state and joins every worker.
    pub fn shutdown(&mut self) {
        self.shared.destroying.store(true, Ordering::Release);
        self.shared.queue.notify_all();
        debug!(self.logger, "draining queue";
            "pending" => self.shared.queue.len(),
            "workers" => self.len());

        for worker in self.workers.iter_mut() {
            worker.join(&self.logger);
        }
        self.workers.clear();

        // nobody left to drain, do it here
        while let Some(invoker) = self.shared.queue.try_pop_front() {
            self.shared.run(invoker, None, &self.logger);
        }
        self.shared.number_of_threads.store(0, Ordering::Release);
        debug!(self.logger, "queue terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shared.is_destroying() {
            self.shutdown();
        }
    }
}
