use crate::task::Id;
use std::any::Any;
use std::fmt;
use std::panic;

/// The outcome of a task that did not produce a value.
///
/// A task fails in exactly two ways: it was cancelled before it could finish,
/// or its body panicked. Either way the error is captured at the task
/// boundary and surfaced when the result is consumed, through
/// [`TaskHandle::get_result`](crate::task::TaskHandle::get_result) or by
/// awaiting the handle.
pub struct TaskError {
    id: Id,
    repr: Repr,
}

enum Repr {
    Cancelled,
    Panic(Box<dyn Any + Send + 'static>),
}

impl TaskError {
    pub(crate) fn cancelled(id: Id) -> TaskError {
        TaskError {
            id,
            repr: Repr::Cancelled,
        }
    }

    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> TaskError {
        TaskError {
            id,
            repr: Repr::Panic(payload),
        }
    }

    /// Returns true if the error was caused by the task being cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.repr, Repr::Cancelled)
    }

    /// Returns true if the error was caused by the task panicking.
    pub fn is_panic(&self) -> bool {
        matches!(self.repr, Repr::Panic(_))
    }

    /// The [`Id`] of the task that produced this error.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Consumes the error, returning the panic payload.
    ///
    /// # Panics
    ///
    /// Panics if the error was not caused by a panic. Check with
    /// [`is_panic`](Self::is_panic) first.
    #[track_caller]
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.try_into_panic()
            .expect("`TaskError` reason is not a panic")
    }

    /// Consumes the error, returning the panic payload if the task panicked,
    /// or the error itself otherwise.
    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, TaskError> {
        match self.repr {
            Repr::Panic(payload) => Ok(payload),
            repr => Err(TaskError { id: self.id, repr }),
        }
    }

    /// Re-raises the failure in the calling task.
    ///
    /// A captured panic resumes unwinding with its original payload; a
    /// cancellation unwinds with a descriptive payload of its own. Used by
    /// [`yield_to`](crate::yield_to) to propagate a nested task's failure into
    /// its parent.
    pub(crate) fn resume(self) -> ! {
        match self.repr {
            Repr::Panic(payload) => panic::resume_unwind(payload),
            Repr::Cancelled => panic!("nested task {} was cancelled", self.id),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(f, "task {} was cancelled", self.id),
            Repr::Panic(payload) => match panic_payload_as_str(payload) {
                Some(msg) => write!(f, "task {} panicked with message {:?}", self.id, msg),
                None => write!(f, "task {} panicked", self.id),
            },
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(f, "TaskError::Cancelled({})", self.id),
            Repr::Panic(_) => write!(f, "TaskError::Panic({})", self.id),
        }
    }
}

impl std::error::Error for TaskError {}

/// Best-effort extraction of the human-readable message out of a panic
/// payload. `panic!("{}", x)` produces a `String`, a bare `panic!("msg")` a
/// `&'static str`; anything else is opaque.
fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    payload.downcast_ref::<&'static str>().copied()
}
