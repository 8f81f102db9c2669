//! Drives a single task: polling, panic capture, and cancellation delivery.

use crate::runtime::scheduler::Shared;
use crate::runtime::waker::waker_ref;
use crate::task::raw::{RawTask, State};
use crate::task::TaskError;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll};

impl RawTask {
    /// Resumes the task once: delivers a pending cancellation, or polls the
    /// future and routes the outcome.
    ///
    /// Called by the loop with no `RefCell` borrows outstanding, so the task
    /// body is free to call back into the scheduler (spawn, notify, ...).
    pub(crate) fn run(self: &Rc<Self>, shared: &Rc<Shared>) {
        if self.has(State::PENDING_CANCEL) {
            self.deliver_cancel();
            shared.finalize(self);
            return;
        }

        // Completed tasks can linger in the ready queue behind a stale wake;
        // resuming them is a no-op.
        let Some(mut future) = self.take_future() else {
            return;
        };

        self.insert(State::RUNNING);
        let waker = waker_ref(self);
        let mut cx = Context::from_waker(&waker);

        let poll = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        self.remove(State::RUNNING);

        match poll {
            Ok(Poll::Pending) => {
                self.put_back_future(future);

                if self.has(State::PENDING_CANCEL) {
                    // The task cancelled itself (or was cancelled mid-poll)
                    // and then suspended. Deliver on the next resume even if
                    // it just blocked on something.
                    shared.push_ready(self);
                } else if self.wait_count() == 0 {
                    // Plain cooperative yield: back of the queue.
                    shared.push_ready(self);
                }
                // wait_count > 0: a primitive registered us somewhere and
                // will wake us through the loop.
            }
            Ok(Poll::Ready(())) => {
                // The wrapper stored the value before returning.
                shared.finalize(self);
            }
            Err(payload) => {
                tracing::trace!(id = %self.id(), "task panicked");
                self.store_failure(TaskError::panic(self.id(), payload));
                shared.finalize(self);
            }
        }
    }

    /// Delivers a requested cancellation: drops the future (unwinding the
    /// task's state through ordinary destructors, which deregisters it from
    /// any wait handler or timer it was parked on) and records the outcome.
    fn deliver_cancel(self: &Rc<Self>) {
        debug_assert!(!self.is_complete());

        let future = self.take_future();
        let dropped = panic::catch_unwind(AssertUnwindSafe(move || drop(future)));

        self.insert(State::CANCELLED);
        match dropped {
            Ok(()) => self.store_failure(TaskError::cancelled(self.id())),
            // A destructor panicked while unwinding; surface that instead of
            // the cancellation.
            Err(payload) => self.store_failure(TaskError::panic(self.id(), payload)),
        }
        tracing::trace!(id = %self.id(), "cancellation delivered");
    }
}
