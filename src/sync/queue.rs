use crate::sync::WaitHandler;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// A FIFO channel between tasks of one event loop, optionally bounded.
///
/// [`push`](Self::push) and [`pop`](Self::pop) suspend the calling task when
/// the queue is full (bounded only) or empty; [`try_push`](Self::try_push)
/// and [`try_pop`](Self::try_pop) never suspend. Order is strict FIFO even
/// with several pushers and poppers contending: a task woken by a
/// notification re-checks the queue's state and parks again if another task
/// got there first.
///
/// Built on two [`WaitHandler`]s, one per edge ("went non-empty" / "went
/// non-full"); each completed operation notifies exactly one waiter on the
/// opposite side.
///
/// ```
/// use spindle::{EventLoop, Queue};
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let queue = Rc::new(Queue::bounded(2));
///
/// let producer = {
///     let queue = Rc::clone(&queue);
///     event_loop.call_soon(async move {
///         for i in 0..5 {
///             queue.push(i).await;
///         }
///     })
/// };
///
/// let consumer = {
///     let queue = Rc::clone(&queue);
///     event_loop.call_soon(async move {
///         let mut total = 0;
///         for _ in 0..5 {
///             total += queue.pop().await;
///         }
///         total
///     })
/// };
///
/// event_loop.run_until_complete(&consumer);
/// assert_eq!(consumer.get_result().unwrap(), 10);
/// # drop(producer);
/// ```
#[derive(Debug)]
pub struct Queue<T> {
    items: RefCell<VecDeque<T>>,
    capacity: Option<NonZeroUsize>,
    not_empty: WaitHandler,
    not_full: WaitHandler,
}

impl<T> Queue<T> {
    /// A queue without a capacity bound; `push` never suspends.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// A queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[track_caller]
    pub fn bounded(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("queue capacity cannot be 0");
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            capacity,
            not_empty: WaitHandler::new(),
            not_full: WaitHandler::new(),
        }
    }

    /// Appends `value`, suspending the current task while the queue is full.
    pub async fn push(&self, value: T) {
        loop {
            if self.has_space() {
                self.items.borrow_mut().push_back(value);
                self.not_empty.notify_one();
                return;
            }
            // Re-check after every wake: another pusher may have taken the
            // slot between the notification and our turn to run.
            self.not_full.wait().await;
        }
    }

    /// Removes the head, suspending the current task while the queue is
    /// empty.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(value) = self.items.borrow_mut().pop_front() {
                self.not_full.notify_one();
                return value;
            }
            self.not_empty.wait().await;
        }
    }

    /// Appends `value` if there is space, without ever suspending. On a full
    /// queue the value is handed back in the error.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        if !self.has_space() {
            return Err(value);
        }
        self.items.borrow_mut().push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head if there is one, without ever suspending.
    pub fn try_pop(&self) -> Option<T> {
        let value = self.items.borrow_mut().pop_front()?;
        self.not_full.notify_one();
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// True when a bounded queue is at capacity; an unbounded queue is never
    /// full.
    pub fn is_full(&self) -> bool {
        !self.has_space()
    }

    /// The capacity bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    fn has_space(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.items.borrow().len() < capacity.get(),
            None => true,
        }
    }
}
