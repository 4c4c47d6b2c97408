use crate::error::{ErrorKind, Result};
use crate::invoker::Fault;
use crate::logging;
use slog::Logger;
use std::fmt;
use std::sync::Arc;

/// Observer called on the worker thread for every callable that panicked.
pub type FaultHook = Arc<dyn Fn(&Fault) + Send + Sync + 'static>;

const DEFAULT_NAME: &str = "callback-queue";

/// Settings for a [`CallbackQueue`](crate::CallbackQueue).
#[derive(Clone)]
pub struct Config {
    pub number_of_threads: usize,
    /// prefix of every thread name spawned by the queue
    pub name: String,
    pub stack_size: Option<usize>,
    pub logger: Logger,
    pub on_fault: Option<FaultHook>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            number_of_threads: 1,
            name: DEFAULT_NAME.to_owned(),
            stack_size: None,
            logger: logging::discard_logger(),
            on_fault: None,
        }
    }
}

impl Config {
    pub fn number_of_threads(mut self, n: usize) -> Self {
        self.number_of_threads = n;
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn on_fault<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.on_fault = Some(Arc::new(hook));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.as_bytes().contains(&0) {
            return Err(ErrorKind::InvalidConfig(
                "thread name must not contain null bytes".to_owned(),
            )
            .into());
        }
        if self.stack_size == Some(0) {
            return Err(ErrorKind::InvalidConfig("stack size must be non-zero".to_owned()).into());
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("number_of_threads", &self.number_of_threads)
            .field("name", &self.name)
            .field("stack_size", &self.stack_size)
            .field("on_fault", &self.on_fault.is_some())
            .finish()
    }
}
