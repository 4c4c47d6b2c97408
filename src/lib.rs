//! A threaded callback queue.
//!
//! Callables pushed onto a [`CallbackQueue`] are run by a pool of worker
//! threads. Starting, stopping and resizing the pool are queued onto a
//! dedicated controller thread and applied asynchronously, in order. Dropping
//! the queue runs everything still pending before it returns.

#[macro_use]
extern crate slog;

pub mod config;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod thread_pool;

pub use config::{Config, FaultHook};
pub use error::{Error, ErrorKind, Result};
pub use invoker::{Fault, Invocable, Invoker};
pub use thread_pool::{CallbackQueue, QueueMetrics, ThreadPool};
