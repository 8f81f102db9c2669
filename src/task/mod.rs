use crate::runtime::scheduler::Shared;
use std::rc::Rc;

// Public API
mod error;
pub use self::error::TaskError;

mod handle;
pub use self::handle::TaskHandle;

pub mod id;
pub use self::id::{Id, id, try_id};

// Internals
mod harness;

pub(crate) mod raw;
pub(crate) use self::raw::RawTask;

mod result;

/// Constructor for a new task. Two references to the task are created: one
/// goes to the loop (ready queue + owned table), the other backs the
/// user-facing handle.
///
/// The user future is wrapped so that its output lands in the task's result
/// holder the moment it completes; the wrapper only holds a weak reference,
/// so a task never keeps itself alive.
pub(crate) fn new_task<F>(future: F, scheduler: &Rc<Shared>, id: Id) -> (Rc<RawTask>, TaskHandle<F::Output>)
where
    F: Future + 'static,
    F::Output: 'static,
{
    let raw = Rc::new(RawTask::new(id, Rc::downgrade(scheduler)));

    let weak = Rc::downgrade(&raw);
    raw.install_future(Box::pin(async move {
        let value = future.await;
        if let Some(task) = weak.upgrade() {
            task.store_value(value);
        }
    }));

    let handle = TaskHandle::new(Rc::clone(&raw));
    (raw, handle)
}
