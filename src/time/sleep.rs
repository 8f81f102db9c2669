use crate::context;
use crate::runtime::scheduler::Shared;
use crate::runtime::timer::SleepKey;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Suspends the current task for at least `duration`.
///
/// The task is parked on the loop's timer heap and resumed once the deadline
/// has passed; tasks sharing a deadline resume in the order they went to
/// sleep. `sleep(Duration::ZERO)` still suspends once and is equivalent to
/// [`yield_now`](crate::yield_now).
///
/// ```
/// use spindle::EventLoop;
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// let task = event_loop.call_soon(async {
///     spindle::sleep(Duration::from_millis(10)).await;
/// });
/// event_loop.run_until_complete(&task);
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
        registered: None,
    }
}

/// Future returned by [`sleep`].
pub struct Sleep {
    deadline: Instant,

    /// Set after the first poll; cleared once the timer fires. Carries its
    /// own loop reference so an early drop can deregister without relying on
    /// the thread's context.
    registered: Option<(SleepKey, Weak<Shared>)>,
}

impl Sleep {
    /// The instant this sleep elapses.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.registered.take() {
            // The loop only re-polls a sleeper once its deadline has passed.
            Some(_) => Poll::Ready(()),
            None => {
                let deadline = self.deadline;
                let registered = context::with_shared(|shared| {
                    (shared.sleep_current(deadline), Rc::downgrade(shared))
                });
                self.registered = Some(registered);
                Poll::Pending
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        // Dropped while still parked (cancellation tears the task down):
        // retire the timer entry and the wait it accounts for.
        if let Some((key, sched)) = self.registered.take()
            && let Some(shared) = sched.upgrade()
        {
            shared.cancel_sleep(key);
        }
    }
}
