use crate::context;
use crate::task::raw::RawTask;
use crate::task::{Id, TaskError};
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// An owned, typed permission to observe a task: retrieve its result, check
/// its progress, or request its cancellation.
///
/// Created by [`EventLoop::call_soon`](crate::EventLoop::call_soon) and
/// [`spawn`](crate::spawn). Dropping the handle detaches the task: it keeps
/// running on its loop, its result is discarded on completion.
///
/// A `TaskHandle` is also a future. Awaiting it from another task suspends
/// the caller until the task completes and yields `Result<T, TaskError>`,
/// mirroring what [`get_result`](Self::get_result) would return.
pub struct TaskHandle<T> {
    raw: Rc<RawTask>,
    _p: PhantomData<T>,
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn new(raw: Rc<RawTask>) -> Self {
        Self {
            raw,
            _p: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> &Rc<RawTask> {
        &self.raw
    }

    /// Returns the [`Id`] that uniquely identifies this task.
    pub fn id(&self) -> Id {
        self.raw.id()
    }

    /// True once the task has finished: its body returned, panicked, or
    /// cancellation was delivered. Never becomes false again.
    pub fn is_complete(&self) -> bool {
        self.raw.is_complete()
    }

    /// True once a cancellation has actually been delivered to the task.
    ///
    /// Note that this can be false right after [`cancel`](Self::cancel):
    /// delivery happens at the task's next resume, not at request time.
    pub fn is_cancelled(&self) -> bool {
        self.raw.is_cancelled()
    }

    /// Requests cooperative cancellation.
    ///
    /// Marks the task so its next resume raises a cancellation instead of
    /// running user code, and unblocks it if it is parked in a wait handler
    /// or a timer so that delivery is prompt. User code between two
    /// suspension points always runs to completion; a task that already
    /// completed ignores the request.
    pub fn cancel(&self) {
        if let Some(shared) = self.raw.scheduler().upgrade() {
            shared.request_cancel(&self.raw);
        }
    }

    /// Consumes the task's stored outcome: the value produced by its body, or
    /// the [`TaskError`] that ended it.
    ///
    /// # Panics
    ///
    /// Panics if the task has not completed yet, or if the outcome was
    /// already consumed (by an earlier call, or by awaiting the handle).
    #[track_caller]
    pub fn get_result(&self) -> Result<T, TaskError> {
        assert!(
            self.raw.is_complete(),
            "task {} has not completed",
            self.raw.id()
        );
        self.raw.take_result::<T>()
    }
}

impl<T: 'static> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.raw.is_complete() {
            return Poll::Ready(self.raw.take_result::<T>());
        }

        // Park the calling task on the target's completion rendezvous. The
        // subscription is idempotent, so a spurious re-poll is harmless.
        context::with_shared(|shared| shared.subscribe_current(self.raw.waiters()));
        Poll::Pending
    }
}

impl<T> Unpin for TaskHandle<T> {}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.raw.id())
            .finish()
    }
}
