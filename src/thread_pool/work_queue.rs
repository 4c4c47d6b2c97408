use crate::invoker::Invoker;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What a worker blocked in [`WorkQueue::pop_front`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// take the front item as soon as there is one
    Take,
    /// stay parked
    Wait,
    /// stop waiting and return `None`
    Leave,
}

/// FIFO of pending invokers shared by every worker.
///
/// Items are handed out in push order, but with several workers popping there
/// is no guarantee two items *run* in that order.
pub struct WorkQueue {
    invokers: Mutex<VecDeque<Invoker>>,
    cond: Condvar,
    // hint only, the locked deque is authoritative
    empty: AtomicBool,
}

impl Default for WorkQueue {
    fn default() -> Self {
        WorkQueue::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        WorkQueue {
            invokers: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            empty: AtomicBool::new(true),
        }
    }

    // user code never runs under this lock, so a poisoned deque is still consistent
    fn lock(&self) -> MutexGuard<'_, VecDeque<Invoker>> {
        self.invokers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_back(&self, invoker: Invoker) {
        {
            let mut invokers = self.lock();
            invokers.push_back(invoker);
            self.empty.store(false, Ordering::Release);
        }
        self.cond.notify_one();
    }

    /// Blocks until `admit` lets the caller take an item, or tells it to leave.
    ///
    /// `admit` is called under the queue lock with the current emptiness, so
    /// any flag it reads must be flipped before [`notify_all`](Self::notify_all)
    /// to be seen by sleeping workers.
    pub fn pop_front<F>(&self, mut admit: F) -> Option<Invoker>
    where
        F: FnMut(bool) -> Admission,
    {
        let mut invokers = self.lock();
        loop {
            match admit(invokers.is_empty()) {
                Admission::Take => {
                    if let Some(invoker) = invokers.pop_front() {
                        self.empty.store(invokers.is_empty(), Ordering::Release);
                        return Some(invoker);
                    }
                }
                Admission::Wait => {}
                Admission::Leave => {
                    // we may have swallowed a push notification meant for someone else
                    if !invokers.is_empty() {
                        self.cond.notify_one();
                    }
                    return None;
                }
            }
            invokers = self
                .cond
                .wait(invokers)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the front item without waiting, ignoring any admission rule.
    pub fn try_pop_front(&self) -> Option<Invoker> {
        let mut invokers = self.lock();
        let invoker = invokers.pop_front();
        self.empty.store(invokers.is_empty(), Ordering::Release);
        invoker
    }

    /// Wakes every parked worker so it re-evaluates its admission.
    pub fn notify_all(&self) {
        drop(self.lock());
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.empty.load(Ordering::Acquire)
    }
}
