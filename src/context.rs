//! Per-thread "current event loop" pointer.
//!
//! A loop installs itself here on entry to `run_until_complete` /
//! `run_forever` and restores the previous value on exit, so the free
//! functions ([`spawn`](crate::spawn), [`sleep`](crate::sleep),
//! [`yield_now`](crate::yield_now), ...) always find the loop that is driving
//! the caller.

use crate::runtime::scheduler::Shared;
use crate::task::{Id, RawTask};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CURRENT_LOOP: RefCell<Option<Rc<Shared>>> = const { RefCell::new(None) };
}

/// Installs `shared` as the thread's current loop for the lifetime of the
/// returned guard. The previous value is restored on drop, so loops may nest
/// (a task of one loop may synchronously drive another).
///
/// # Panics
///
/// Panics if `shared` is already the current loop: re-entering a running
/// loop's `run_*` methods from one of its own tasks would recurse into the
/// scheduler.
#[track_caller]
pub(crate) fn enter(shared: &Rc<Shared>) -> EnterGuard {
    CURRENT_LOOP.with(|current| {
        let mut current = current.borrow_mut();
        if let Some(active) = current.as_ref()
            && Rc::ptr_eq(active, shared)
        {
            panic!("this event loop is already running on this thread");
        }

        EnterGuard {
            prev: current.replace(Rc::clone(shared)),
        }
    })
}

pub(crate) struct EnterGuard {
    prev: Option<Rc<Shared>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT_LOOP.with(|current| {
            *current.borrow_mut() = self.prev.take();
        });
    }
}

/// Runs `f` with the current loop.
///
/// # Panics
///
/// Panics when no loop is running on this thread. Every blocking primitive
/// funnels through here, which is what turns "awaited outside a loop" into a
/// loud error instead of a hang.
#[track_caller]
pub(crate) fn with_shared<F, R>(f: F) -> R
where
    F: FnOnce(&Rc<Shared>) -> R,
{
    try_with_shared(f).expect("not inside a running event loop")
}

/// Runs `f` with the current loop, or returns `None` when there is none.
/// Used on teardown paths (future drops) that may outlive the loop.
pub(crate) fn try_with_shared<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Rc<Shared>) -> R,
{
    CURRENT_LOOP.with(|current| current.borrow().as_ref().map(f))
}

pub(crate) fn current_task() -> Option<Rc<RawTask>> {
    try_with_shared(|shared| shared.current_task()).flatten()
}

pub(crate) fn current_task_id() -> Option<Id> {
    current_task().map(|task| task.id())
}
