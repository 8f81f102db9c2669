use crate::context;
use crate::runtime::scheduler::Shared;
use crate::task::Id;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};

/// Number of waiters drained onto the stack before a notify-all spills to the
/// heap.
const NOTIFY_BATCH: usize = 8;

/// A rendezvous point: tasks park on it with [`wait`](Self::wait), anybody
/// wakes them with [`notify_one`](Self::notify_one) or
/// [`notify_all`](Self::notify_all).
///
/// This is the single primitive every higher-level blocking operation in the
/// crate is built on; [`Queue`](crate::Queue) is the canonical example, with
/// one handler for "not empty" and one for "not full".
///
/// Notifications are edge-triggered: notifying an empty handler is a no-op
/// and nothing is latched for future subscribers. A primitive that needs
/// level semantics ("an item is already there") must consult its own state
/// before parking, the way `Queue` re-checks its buffer around every wait.
///
/// Wake order is FIFO: `notify_one` wakes the earliest live subscriber,
/// `notify_all` wakes every current subscriber in subscription order.
#[derive(Debug, Default)]
pub struct WaitHandler {
    waiters: RefCell<VecDeque<Waiter>>,
}

/// A parked task, identified weakly: the id plus a back-reference to the loop
/// that owns it. The handler never keeps a task alive; the loop stays the
/// arbiter of liveness and stale entries are skipped on wake.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub(crate) id: Id,
    pub(crate) sched: Weak<Shared>,
}

impl WaitHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the current task until the handler is notified.
    ///
    /// Must be awaited from inside a task; the subscription is dropped again
    /// if the future is cancelled before a notification arrives.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            handler: self,
            waiting: None,
        }
    }

    /// Wakes the earliest subscriber that is still live. Returns whether a
    /// task was actually moved to the ready queue.
    pub fn notify_one(&self) -> bool {
        while let Some(waiter) = self.waiters.borrow_mut().pop_front() {
            let Some(shared) = waiter.sched.upgrade() else {
                continue;
            };
            if shared.wake_waiter(waiter.id) {
                return true;
            }
        }
        false
    }

    /// Wakes every task currently subscribed, in subscription order. Returns
    /// how many were moved to the ready queue.
    pub fn notify_all(&self) -> usize {
        // Drain first: a woken task may immediately re-subscribe when it
        // runs, and those new waiters belong to the next notification.
        let batch: SmallVec<[Waiter; NOTIFY_BATCH]> =
            self.waiters.borrow_mut().drain(..).collect();

        batch
            .into_iter()
            .filter_map(|waiter| waiter.sched.upgrade().map(|shared| (shared, waiter.id)))
            .filter(|(shared, id)| shared.wake_waiter(*id))
            .count()
    }

    /// Number of currently subscribed tasks.
    pub fn len(&self) -> usize {
        self.waiters.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.borrow().is_empty()
    }

    /// Appends a subscription, preserving order. Returns false (and changes
    /// nothing) if the task is already subscribed: a task appears at most
    /// once per handler.
    pub(crate) fn subscribe(&self, id: Id, sched: Weak<Shared>) -> bool {
        let mut waiters = self.waiters.borrow_mut();
        if waiters.iter().any(|waiter| waiter.id == id) {
            return false;
        }
        waiters.push_back(Waiter { id, sched });
        true
    }

    /// Removes a subscription if present.
    pub(crate) fn unsubscribe(&self, id: Id) -> Option<Waiter> {
        let mut waiters = self.waiters.borrow_mut();
        let position = waiters.iter().position(|waiter| waiter.id == id)?;
        waiters.remove(position)
    }
}

/// Future returned by [`WaitHandler::wait`].
pub struct Wait<'a> {
    handler: &'a WaitHandler,
    waiting: Option<Id>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.waiting.take() {
            // A notification removed us from the handler and rescheduled us.
            Some(_) => Poll::Ready(()),
            None => {
                let id = context::with_shared(|shared| {
                    shared.subscribe_current(self.handler)
                });
                self.waiting = Some(id);
                Poll::Pending
            }
        }
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        // Dropped while parked (cancellation tears the task down mid-wait):
        // deregister so a later notification cannot target a dead task.
        if let Some(id) = self.waiting.take()
            && let Some(waiter) = self.handler.unsubscribe(id)
            && let Some(shared) = waiter.sched.upgrade()
        {
            shared.forget_wait(id);
        }
    }
}
