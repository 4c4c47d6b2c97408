use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A callable that can be invoked once with its arguments bundled as a tuple.
///
/// Implemented for every `FnOnce` of up to six arguments, so
/// `queue.push_with(|a: u32, b: String| ..., (1, name))` works the same way
/// a plain closure does. Whatever the callable returns is dropped.
pub trait Invocable<Args>: Send + 'static {
    fn invoke(self, args: Args);
}

macro_rules! impl_invocable {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> Invocable<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) -> Ret + Send + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(self, ($($arg,)*): ($($arg,)*)) {
                let _ = self($($arg),*);
            }
        }
    };
}

impl_invocable!();
impl_invocable!(A0);
impl_invocable!(A0, A1);
impl_invocable!(A0, A1, A2);
impl_invocable!(A0, A1, A2, A3);
impl_invocable!(A0, A1, A2, A3, A4);
impl_invocable!(A0, A1, A2, A3, A4, A5);

type Job = Box<dyn FnOnce() + Send + 'static>;

/// One unit of deferred work: a callable bound with its arguments.
pub struct Invoker {
    id: u64,
    job: Job,
}

impl Invoker {
    pub fn new<F>(id: u64, f: F) -> Self
    where
        F: Invocable<()>,
    {
        Self::with_args(id, f, ())
    }

    pub fn with_args<F, Args>(id: u64, f: F, args: Args) -> Self
    where
        F: Invocable<Args>,
        Args: Send + 'static,
    {
        Invoker {
            id,
            job: Box::new(move || f.invoke(args)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs the callable. Consuming `self` guarantees it runs at most once.
    ///
    /// A panic raised by the callable stops here and comes back as a
    /// [`Fault`]; the caller keeps running.
    pub fn invoke(self) -> Result<(), Fault> {
        let Invoker { id, job } = self;
        panic::catch_unwind(AssertUnwindSafe(job)).map_err(|payload| Fault {
            invoker: id,
            worker: None,
            message: panic_message(payload.as_ref()),
        })
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker").field("id", &self.id).finish()
    }
}

/// A callable that panicked while a worker was running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub invoker: u64,
    /// index of the worker that ran it, `None` when it ran during an inline drain
    pub worker: Option<usize>,
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worker {
            Some(worker) => write!(
                f,
                "invoker {} panicked on worker {}: {}",
                self.invoker, worker, self.message
            ),
            None => write!(f, "invoker {} panicked: {}", self.invoker, self.message),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
