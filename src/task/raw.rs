use crate::runtime::scheduler::Shared;
use crate::sync::WaitHandler;
use crate::task::result::ResultHolder;
use crate::task::{Id, TaskError};
use bitflags::bitflags;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::pin::Pin;
use std::rc::Weak;

pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = ()> + 'static>>;

bitflags! {
    /// Lifecycle flags of a task. Everything runs on one thread, so a plain
    /// `Cell<State>` is enough.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct State: u8 {
        /// Sitting in the loop's ready queue.
        const QUEUED = 1;
        /// Currently being polled; the loop's current-task pointer is us.
        const RUNNING = 1 << 1;
        /// The future returned, panicked, or cancellation was delivered.
        /// Never cleared once set.
        const COMPLETE = 1 << 2;
        /// Cancellation has been delivered.
        const CANCELLED = 1 << 3;
        /// Cancellation was requested and will be delivered at the next
        /// resume.
        const PENDING_CANCEL = 1 << 4;
    }
}

/// The type-erased heart of a task: the boxed future, its result, its wait
/// accounting and the rendezvous other tasks use to join on it.
///
/// The loop owns one `Rc<RawTask>` per live task (ready queue + owned table);
/// the user-facing [`TaskHandle`](crate::task::TaskHandle) owns another, so
/// the allocation dies only once the loop has released the task *and* no
/// handle is left.
pub(crate) struct RawTask {
    id: Id,
    state: Cell<State>,

    /// Number of pending events this task is blocked on. The scheduler treats
    /// the task as runnable iff this is zero.
    wait_count: Cell<u32>,

    /// `None` while the task is being polled and forever after completion.
    future: RefCell<Option<TaskFuture>>,

    result: RefCell<ResultHolder>,

    /// Tasks waiting for this task to complete, notified once on completion.
    waiters: WaitHandler,

    /// Back-reference to the owning loop, used by handles that outlive a
    /// `run_*` call (cancellation requests, stray wakes).
    scheduler: Weak<Shared>,
}

impl RawTask {
    pub(crate) fn new(id: Id, scheduler: Weak<Shared>) -> Self {
        Self {
            id,
            state: Cell::new(State::empty()),
            wait_count: Cell::new(0),
            future: RefCell::new(None),
            result: RefCell::new(ResultHolder::new()),
            waiters: WaitHandler::new(),
            scheduler,
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn scheduler(&self) -> &Weak<Shared> {
        &self.scheduler
    }

    pub(crate) fn waiters(&self) -> &WaitHandler {
        &self.waiters
    }

    // ===== state flags =====

    pub(crate) fn has(&self, state: State) -> bool {
        self.state.get().contains(state)
    }

    pub(crate) fn insert(&self, state: State) {
        self.state.set(self.state.get() | state);
    }

    pub(crate) fn remove(&self, state: State) {
        self.state.set(self.state.get() - state);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.has(State::COMPLETE)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.has(State::CANCELLED)
    }

    // ===== wait accounting =====

    pub(crate) fn wait_count(&self) -> u32 {
        self.wait_count.get()
    }

    pub(crate) fn inc_wait_count(&self) {
        self.wait_count.set(self.wait_count.get() + 1);
    }

    #[track_caller]
    pub(crate) fn dec_wait_count(&self) {
        let count = self.wait_count.get();
        assert!(count > 0, "task {} wait_count underflow", self.id);
        self.wait_count.set(count - 1);
    }

    pub(crate) fn clear_wait_count(&self) {
        self.wait_count.set(0);
    }

    // ===== future and result slots =====

    pub(crate) fn install_future(&self, future: TaskFuture) {
        let prev = self.future.borrow_mut().replace(future);
        debug_assert!(prev.is_none(), "task future installed twice");
    }

    pub(crate) fn take_future(&self) -> Option<TaskFuture> {
        self.future.borrow_mut().take()
    }

    pub(crate) fn put_back_future(&self, future: TaskFuture) {
        *self.future.borrow_mut() = Some(future);
    }

    pub(crate) fn store_value<T: 'static>(&self, value: T) {
        self.result.borrow_mut().store(value);
    }

    pub(crate) fn store_failure(&self, error: TaskError) {
        self.result.borrow_mut().store_failure(error);
    }

    pub(crate) fn result_written(&self) -> bool {
        self.result.borrow().is_written()
    }

    pub(crate) fn take_result<T: 'static>(&self) -> Result<T, TaskError> {
        self.result.borrow_mut().take::<T>()
    }
}

impl fmt::Debug for RawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTask")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("wait_count", &self.wait_count.get())
            .finish_non_exhaustive()
    }
}
