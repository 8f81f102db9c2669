use crate::runtime::EventLoop;
use anyhow::{Result, anyhow};
use std::time::Duration;

/// Upper bound on how long one quiet tick parks the thread while waiting for
/// the next timer deadline.
const PARK_TIMEOUT: Duration = Duration::from_millis(100);

/// Initial capacity of the ready queue.
const READY_QUEUE_CAPACITY: usize = 64;

/// Configures and builds an [`EventLoop`].
///
/// ```
/// use spindle::Builder;
/// use std::time::Duration;
///
/// let event_loop = Builder::new()
///     .park_timeout(Duration::from_millis(10))
///     .try_build()
///     .unwrap();
///
/// let task = event_loop.call_soon(async { 6 * 7 });
/// event_loop.run_until_complete(&task);
/// assert_eq!(task.get_result().unwrap(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    park_timeout: Duration,
    ready_queue_capacity: usize,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            park_timeout: PARK_TIMEOUT,
            ready_queue_capacity: READY_QUEUE_CAPACITY,
        }
    }

    /// Caps how long the loop blocks the thread per tick when only sleepers
    /// remain. A smaller value makes [`stop`](crate::EventLoop::stop) more
    /// responsive at the cost of more wakeups.
    pub fn park_timeout(mut self, val: Duration) -> Self {
        self.park_timeout = val;
        self
    }

    /// Pre-allocates the ready queue for roughly this many runnable tasks.
    pub fn ready_queue_capacity(mut self, val: usize) -> Self {
        self.ready_queue_capacity = val;
        self
    }

    /// Creates the configured `EventLoop`.
    pub fn try_build(self) -> Result<EventLoop> {
        let cfg = self.try_into()?;
        Ok(EventLoop::from_config(cfg))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated snapshot of a [`Builder`], consumed by the scheduler.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) park_timeout: Duration,
    pub(crate) ready_queue_capacity: usize,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.park_timeout.is_zero() {
            return Err(anyhow!("park_timeout must be greater than zero"));
        }
        if self.ready_queue_capacity == 0 {
            return Err(anyhow!("ready_queue_capacity must be greater than zero"));
        }
        Ok(())
    }
}

impl TryFrom<Builder> for Config {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = Config {
            park_timeout: builder.park_timeout,
            ready_queue_capacity: builder.ready_queue_capacity,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
