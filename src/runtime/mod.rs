use crate::task::TaskHandle;
use std::rc::Rc;

// Public API
mod builder;
pub use builder::Builder;

mod spawn;
pub use spawn::{spawn, stop, yield_to};

// Internals
pub(crate) use builder::Config;

pub(crate) mod scheduler;
use scheduler::Shared;

pub(crate) mod timer;

pub(crate) mod waker;

#[cfg(test)]
mod tests;

/// A single-threaded cooperative scheduler: drives a set of tasks to
/// completion, interleaving them only at their explicit suspension points.
///
/// Tasks are registered with [`call_soon`](Self::call_soon) and executed by
/// one of the `run_*` methods, which install the loop as the thread's current
/// loop so that the free functions ([`spawn`], [`sleep`](crate::sleep),
/// [`yield_now`](crate::yield_now), [`yield_to`]) can find it.
///
/// ```
/// use spindle::EventLoop;
///
/// let event_loop = EventLoop::new();
/// let task = event_loop.call_soon(async {
///     spindle::yield_now().await;
///     "done"
/// });
///
/// event_loop.run_until_complete(&task);
/// assert_eq!(task.get_result().unwrap(), "done");
/// ```
#[derive(Debug)]
pub struct EventLoop {
    shared: Rc<Shared>,
}

impl EventLoop {
    /// Creates a loop with the default configuration. Use
    /// [`builder`](Self::builder) to tune it.
    pub fn new() -> EventLoop {
        Builder::new()
            .try_build()
            .expect("default event loop configuration is valid")
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn from_config(cfg: Config) -> EventLoop {
        EventLoop {
            shared: Rc::new(Shared::new(cfg)),
        }
    }

    /// Wraps `future` into a task and schedules it at the back of the ready
    /// queue. The task is primed but does not start running until the loop
    /// does; the returned handle observes it.
    pub fn call_soon<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.shared.spawn(future)
    }

    /// Runs the loop until the given task completes, then returns. Other
    /// tasks may remain registered; a later `run_*` call picks them back up.
    ///
    /// # Panics
    ///
    /// Panics if the loop deadlocks (no runnable tasks and no timers while
    /// the target is incomplete), or when called from a task of this loop.
    #[track_caller]
    pub fn run_until_complete<T: 'static>(&self, handle: &TaskHandle<T>) {
        self.shared.run_until_complete(handle.raw());
    }

    /// Runs until no runnable tasks and no sleepers remain, or until
    /// [`stop`](Self::stop) is called. Tasks parked on wait handlers do not
    /// keep the loop alive.
    #[track_caller]
    pub fn run_forever(&self) {
        self.shared.run_forever();
    }

    /// Asks a running loop to return after the current task finishes its
    /// resume. From inside a task, use the free function
    /// [`stop`](crate::stop).
    pub fn stop(&self) {
        self.shared.stop();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
