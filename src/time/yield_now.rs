use crate::context;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields execution back to the scheduler once.
///
/// The calling task is re-queued at the back of the ready queue, so every
/// other runnable task gets a turn before it resumes. Long computations
/// should call this periodically: the runtime is cooperative, and code
/// between two suspension points runs without interleaving.
///
/// ```
/// use spindle::EventLoop;
///
/// let event_loop = EventLoop::new();
/// let task = event_loop.call_soon(async {
///     for _ in 0..3 {
///         // Heavy work here...
///         spindle::yield_now().await;
///     }
/// });
/// event_loop.run_until_complete(&task);
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow {
        awaiting_first_poll: true,
    }
}

/// Future returned by [`yield_now`].
#[derive(Debug, Clone, Copy)]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Only yield on the first poll; the task is runnable the whole time
        // (wait count stays zero), so the loop re-queues it at the tail and
        // the next poll lands here again.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;

            // Fail loudly when awaited outside a running loop.
            context::with_shared(|_| ());

            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
