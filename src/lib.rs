//! A single-threaded cooperative task runtime.
//!
//! Concurrent workflows are written as ordinary sequential `async` routines;
//! an explicit [`EventLoop`] interleaves them at their suspension points. One
//! loop drives one thread; there is no parallelism, no preemption and no
//! locking between tasks of the same loop: code between two suspension points
//! runs atomically with respect to every other task.
//!
//! # Suspension points
//!
//! The futures exported by this crate are the only suspension points:
//! [`yield_now`], [`sleep`], [`yield_to`], awaiting a [`TaskHandle`],
//! [`Queue::push`]/[`Queue::pop`] and [`WaitHandler::wait`]. Futures from
//! other runtimes have no way to wake a parked task here and must not be
//! awaited inside a spindle task.
//!
//! # Example
//!
//! ```
//! use spindle::{EventLoop, Queue};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let queue = Rc::new(Queue::unbounded());
//!
//! let pusher = {
//!     let queue = Rc::clone(&queue);
//!     event_loop.call_soon(async move {
//!         spindle::sleep(Duration::from_millis(10)).await;
//!         queue.push(42).await;
//!     })
//! };
//!
//! let popper = {
//!     let queue = Rc::clone(&queue);
//!     event_loop.call_soon(async move { queue.pop().await })
//! };
//!
//! event_loop.run_until_complete(&popper);
//! assert_eq!(popper.get_result().unwrap(), 42);
//! # drop(pusher);
//! ```
//!
//! # Cancellation
//!
//! [`TaskHandle::cancel`] is cooperative and two-phase: the request marks the
//! task and unparks it if it is blocked; delivery happens at the task's next
//! resume, where its state unwinds through ordinary destructors and the task
//! completes with a cancelled [`TaskError`]. User code between suspension
//! points always runs to completion.

pub mod runtime;
pub use runtime::{Builder, EventLoop, spawn, stop, yield_to};

pub mod sync;
pub use sync::{Queue, WaitHandler};

pub mod task;
pub use task::{TaskError, TaskHandle};

pub mod time;
pub use time::{Sleep, YieldNow, sleep, yield_now};

mod context;
