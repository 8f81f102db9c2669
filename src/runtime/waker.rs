#![allow(unsafe_op_in_unsafe_fn)]

//! The [`Waker`] handed to task polls.
//!
//! The crate's own primitives never go through the waker (they park and wake
//! tasks directly through the loop), but the `Future` contract requires one,
//! and honoring stray wakes keeps self-waking futures working: waking a task
//! that is idle simply re-queues it.
//!
//! Safety: `Waker` is nominally `Send + Sync`, while the data pointer here is
//! an `Rc`. The runtime is strictly single-threaded and none of its types
//! implement `Send`, so a waker can never legally travel to another thread;
//! this is the same constraint every thread-per-core runtime relies on.

use crate::task::RawTask;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

pub(crate) struct WakerRef<'a> {
    waker: ManuallyDrop<Waker>,
    _p: PhantomData<&'a RawTask>,
}

/// Returns a `WakerRef` that borrows the task's ref-count instead of bumping
/// it: the pointed-to `Rc` outlives the poll, and `ManuallyDrop` keeps the
/// borrowed count from being decremented.
pub(crate) fn waker_ref(task: &Rc<RawTask>) -> WakerRef<'_> {
    let ptr = Rc::as_ptr(task) as *const ();
    let waker = unsafe { ManuallyDrop::new(Waker::from_raw(RawWaker::new(ptr, &WAKER_VTABLE))) };

    WakerRef {
        waker,
        _p: PhantomData,
    }
}

impl ops::Deref for WakerRef<'_> {
    type Target = Waker;

    fn deref(&self) -> &Waker {
        &self.waker
    }
}

fn wake(task: &Rc<RawTask>) {
    // A stray wake re-queues an idle task. Tasks parked by one of our
    // primitives (wait_count > 0) are woken by that primitive, not here.
    if task.wait_count() > 0 {
        return;
    }
    if let Some(shared) = task.scheduler().upgrade() {
        shared.push_ready(task);
    }
}

unsafe fn clone_waker(ptr: *const ()) -> RawWaker {
    Rc::increment_strong_count(ptr as *const RawTask);
    RawWaker::new(ptr, &WAKER_VTABLE)
}

unsafe fn wake_by_val(ptr: *const ()) {
    let task = Rc::from_raw(ptr as *const RawTask);
    wake(&task);
}

unsafe fn wake_by_ref(ptr: *const ()) {
    let task = ManuallyDrop::new(Rc::from_raw(ptr as *const RawTask));
    wake(&task);
}

unsafe fn drop_waker(ptr: *const ()) {
    drop(Rc::from_raw(ptr as *const RawTask));
}

static WAKER_VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_waker, wake_by_val, wake_by_ref, drop_waker);
