use slog::{Discard, Drain, Logger};

/// Terminal logger with an async drain, for applications embedding the queue.
pub fn terminal_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

/// Logger that drops every record. Used when the config carries none.
pub fn discard_logger() -> Logger {
    Logger::root(Discard, o!())
}
