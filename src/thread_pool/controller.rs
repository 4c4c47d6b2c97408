use super::pool::{Shared, WorkerPool};
use super::Command;
use crate::error::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use slog::Logger;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Serial executor for administrative commands.
///
/// A single thread owns the [`WorkerPool`] and applies commands one at a time
/// in the order they were submitted, so concurrent `start`/`stop`/resize calls
/// never race with each other.
pub(crate) struct Controller {
    sender: Sender<Command>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    logger: Logger,
}

impl Controller {
    pub(crate) fn spawn(
        pool: WorkerPool,
        shared: Arc<Shared>,
        name: &str,
        logger: Logger,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded::<Command>();
        let supervisor_logger = logger.new(o!("thread" => "controller"));
        let supervisor_shared = shared.clone();

        let thread = thread::Builder::new()
            .name(format!("{}-controller", name))
            .spawn(move || {
                supervisor_shared.enter_thread();
                let supervisor = Supervisor {
                    pool,
                    receiver,
                    logger: supervisor_logger,
                };
                // supervise all
                supervisor.watch();
                supervisor_shared.leave_thread();
            })?;

        Ok(Controller {
            sender,
            shared,
            thread: Some(thread),
            logger,
        })
    }

    pub(crate) fn submit(&self, command: Command) -> Result<()> {
        self.sender.send(command)?;
        Ok(())
    }

    /// Queues `Terminate` behind every pending command and waits for the
    /// controller to drain the pool and exit.
    ///
    /// Called from one of the queue's own threads (a callback dropping the
    /// last handle) it only queues `Terminate`: the controller would end up
    /// joining the caller, or the caller would join itself.
    pub(crate) fn terminate(&mut self) {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };
        if let Err(e) = self.submit(Command::Terminate) {
            error!(self.logger, "unable to terminate controller"; "error" => e.to_string());
        }
        if self.shared.is_own_thread() {
            debug!(self.logger, "terminated from a queue thread, not waiting");
            return;
        }
        if thread.join().is_err() {
            error!(self.logger, "controller thread died");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.terminate();
    }
}

struct Supervisor {
    pool: WorkerPool,
    receiver: Receiver<Command>,
    logger: Logger,
}

impl Supervisor {
    // listen to channel
    fn watch(mut self) {
        while let Ok(command) = self.receiver.recv() {
            debug!(self.logger, "applying command"; "command" => format!("{:?}", command));
            match command {
                Command::Start => self.pool.start(),
                Command::Stop => self.pool.stop(),
                Command::Resize(size) => self.pool.resize(size),
                Command::Terminate => break,
            }
        }
        // workers first, the controller thread exits right after
        self.pool.shutdown();
    }
}
