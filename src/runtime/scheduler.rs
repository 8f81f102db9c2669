use crate::context;
use crate::runtime::Config;
use crate::runtime::timer::{SleepKey, SleepQueue};
use crate::sync::WaitHandler;
use crate::task::raw::State;
use crate::task::{Id, RawTask, TaskHandle, new_task};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::iter;
use std::rc::Rc;
use std::thread;
use std::time::Instant;

/// The loop's bookkeeping: ready queue, sleep heap, owned tasks and the
/// current-task pointer. Everything lives behind `Cell`/`RefCell` because
/// tasks call back into the scheduler while the loop is mid-tick.
///
/// [`EventLoop`](crate::EventLoop) is a thin public wrapper around an
/// `Rc<Shared>`; wait handlers, timers and task handles keep `Weak` edges
/// back to it.
#[derive(Debug)]
pub(crate) struct Shared {
    cfg: Config,

    /// Tasks eligible to run, strictly FIFO.
    ready: RefCell<VecDeque<Rc<RawTask>>>,

    /// Tasks parked until a deadline.
    sleepers: RefCell<SleepQueue>,

    /// Every live (not yet complete) task the loop has been given.
    owned: RefCell<HashMap<Id, Rc<RawTask>>>,

    /// The task being polled right now. At most one task is current, and the
    /// current task is never simultaneously in the ready queue.
    current: RefCell<Option<Rc<RawTask>>>,

    stopped: Cell<bool>,
}

impl Shared {
    pub(crate) fn new(cfg: Config) -> Self {
        let ready = VecDeque::with_capacity(cfg.ready_queue_capacity);
        Self {
            cfg,
            ready: RefCell::new(ready),
            sleepers: RefCell::new(SleepQueue::new()),
            owned: RefCell::new(HashMap::new()),
            current: RefCell::new(None),
            stopped: Cell::new(false),
        }
    }

    // ===== task creation =====

    /// Wraps `future` into a task and queues it at the back of the ready
    /// queue. The task is primed but not started: its body runs only once the
    /// loop picks it up.
    pub(crate) fn spawn<F>(self: &Rc<Self>, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let id = Id::next();
        let (raw, handle) = new_task(future, self, id);

        self.owned.borrow_mut().insert(id, Rc::clone(&raw));
        self.push_ready(&raw);

        tracing::trace!(id = %id, "task spawned");
        handle
    }

    // ===== ready queue =====

    /// Queues a task at the back of the ready queue. No-op if it is already
    /// queued or complete.
    pub(crate) fn push_ready(&self, task: &Rc<RawTask>) {
        if task.has(State::QUEUED) || task.is_complete() {
            return;
        }
        task.insert(State::QUEUED);
        self.ready.borrow_mut().push_back(Rc::clone(task));
    }

    fn next_ready(&self) -> Option<Rc<RawTask>> {
        let task = self.ready.borrow_mut().pop_front()?;
        task.remove(State::QUEUED);
        Some(task)
    }

    pub(crate) fn current_task(&self) -> Option<Rc<RawTask>> {
        self.current.borrow().clone()
    }

    // ===== blocking primitives =====

    /// Parks the current task on `handler`. Bumps its wait count unless it
    /// was already subscribed. Returns the parked task's id.
    #[track_caller]
    pub(crate) fn subscribe_current(self: &Rc<Self>, handler: &WaitHandler) -> Id {
        let task = self
            .current_task()
            .expect("no task is currently running on this loop");

        if handler.subscribe(task.id(), Rc::downgrade(self)) {
            task.inc_wait_count();
        }
        task.id()
    }

    /// Parks the current task until `deadline`.
    #[track_caller]
    pub(crate) fn sleep_current(&self, deadline: Instant) -> SleepKey {
        let task = self
            .current_task()
            .expect("no task is currently running on this loop");

        task.inc_wait_count();
        self.sleepers.borrow_mut().insert(deadline, task.id())
    }

    /// Deregisters a sleep that never fired (the sleeping future was dropped
    /// early, typically by cancellation tearing the task down).
    pub(crate) fn cancel_sleep(&self, key: SleepKey) {
        if let Some(id) = self.sleepers.borrow_mut().cancel(key) {
            self.forget_wait(id);
        }
    }

    /// Delivers one wake to a parked task: decrements its wait count and, if
    /// nothing else is pending, moves it to the back of the ready queue.
    /// Returns whether the task actually became ready.
    ///
    /// Tasks that are gone or already complete consume the wake without
    /// effect; callers doing notify-one move on to the next subscriber.
    pub(crate) fn wake_waiter(&self, id: Id) -> bool {
        let task = self.owned.borrow().get(&id).cloned();
        let Some(task) = task else {
            return false;
        };
        if task.is_complete() {
            return false;
        }

        task.dec_wait_count();
        if task.wait_count() == 0 && !task.has(State::QUEUED) {
            self.push_ready(&task);
            return true;
        }
        false
    }

    /// Drops one unit of wait accounting without scheduling, for primitives
    /// deregistering on their failure/teardown paths.
    pub(crate) fn forget_wait(&self, id: Id) {
        let task = self.owned.borrow().get(&id).cloned();
        if let Some(task) = task
            && !task.is_complete()
        {
            task.dec_wait_count();
        }
    }

    // ===== cancellation =====

    /// Phase one of cooperative cancellation: mark the task, and if it is
    /// parked anywhere, force it into the ready queue so that delivery (phase
    /// two, in the harness) happens at its next resume rather than whenever
    /// its wait would have fired.
    pub(crate) fn request_cancel(&self, task: &Rc<RawTask>) {
        if task.is_complete() || task.has(State::PENDING_CANCEL) {
            return;
        }

        task.insert(State::PENDING_CANCEL);
        tracing::trace!(id = %task.id(), "cancellation requested");

        if task.has(State::RUNNING) {
            // Self-cancellation: the harness checks the flag as soon as the
            // current poll returns.
            return;
        }
        self.push_ready(task);
    }

    // ===== completion =====

    /// Retires a finished task: marks it complete, releases it from the
    /// owned table and wakes everything joined on it. The result holder has
    /// already been written by the harness or the task wrapper.
    pub(crate) fn finalize(&self, task: &Rc<RawTask>) {
        debug_assert!(task.result_written());

        task.insert(State::COMPLETE);
        task.remove(State::QUEUED | State::PENDING_CANCEL);
        task.clear_wait_count();

        self.owned.borrow_mut().remove(&task.id());
        task.waiters().notify_all();

        tracing::trace!(id = %task.id(), cancelled = task.is_cancelled(), "task finished");
    }

    // ===== run loops =====

    pub(crate) fn stop(&self) {
        self.stopped.set(true);
    }

    /// Runs until `target` completes. Other tasks may remain parked or ready.
    ///
    /// # Panics
    ///
    /// Panics if the loop goes quiescent (no ready tasks, no timers) while
    /// the target is still incomplete: nothing can ever unblock it.
    pub(crate) fn run_until_complete(self: &Rc<Self>, target: &Rc<RawTask>) {
        self.run_inner(Some(target));
    }

    /// Runs until no runnable tasks and no sleepers remain, or until
    /// [`stop`](Self::stop).
    pub(crate) fn run_forever(self: &Rc<Self>) {
        self.run_inner(None);
    }

    fn run_inner(self: &Rc<Self>, target: Option<&Rc<RawTask>>) {
        let _entered = context::enter(self);
        self.stopped.set(false);
        tracing::debug!(
            tasks = self.owned.borrow().len(),
            sleeping = self.sleepers.borrow().len(),
            "event loop running"
        );

        loop {
            if let Some(target) = target
                && target.is_complete()
            {
                tracing::debug!(id = %target.id(), "target complete, leaving loop");
                return;
            }
            if self.stopped.get() {
                tracing::debug!("event loop stopped");
                return;
            }

            self.wake_expired_sleepers();

            if let Some(task) = self.next_ready() {
                let _current = CurrentTaskGuard::set(self, &task);
                task.run(self);
                continue;
            }

            // Nothing ready. Park the thread until the next deadline, capped
            // so a stop request is still noticed reasonably soon.
            if let Some(deadline) = self.sleepers.borrow_mut().next_deadline() {
                let now = Instant::now();
                if deadline > now {
                    thread::sleep((deadline - now).min(self.cfg.park_timeout));
                }
                continue;
            }

            // Quiescent: no ready tasks, no timers.
            match target {
                Some(target) => {
                    tracing::error!(
                        id = %target.id(),
                        "no runnable tasks and no timers while the target is incomplete"
                    );
                    panic!(
                        "FATAL: deadlock detected: task {} can never complete",
                        target.id()
                    );
                }
                None => return,
            }
        }
    }

    /// Moves every sleeper whose deadline has passed to the ready queue, in
    /// (deadline, registration order).
    fn wake_expired_sleepers(&self) {
        let now = Instant::now();
        let expired: SmallVec<[Id; 8]> = {
            let mut sleepers = self.sleepers.borrow_mut();
            iter::from_fn(|| sleepers.pop_expired(now)).collect()
        };

        for id in expired {
            self.wake_waiter(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn num_ready(&self) -> usize {
        self.ready.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn num_sleeping(&self) -> usize {
        self.sleepers.borrow().len()
    }
}

/// Sets the loop's current-task pointer for the duration of one resume,
/// clearing it even if the poll panics.
struct CurrentTaskGuard<'a> {
    shared: &'a Shared,
}

impl<'a> CurrentTaskGuard<'a> {
    fn set(shared: &'a Shared, task: &Rc<RawTask>) -> Self {
        *shared.current.borrow_mut() = Some(Rc::clone(task));
        Self { shared }
    }
}

impl Drop for CurrentTaskGuard<'_> {
    fn drop(&mut self) {
        *self.shared.current.borrow_mut() = None;
    }
}
