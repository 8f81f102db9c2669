use crate::task::TaskError;
use std::any::{self, TypeId};
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

/// Values up to this size (and at most [`INLINE_ALIGN`]-aligned) are stored
/// directly inside the holder; anything larger goes through one heap
/// allocation.
pub(crate) const INLINE_CAPACITY: usize = 32;

/// Alignment of the inline buffer.
pub(crate) const INLINE_ALIGN: usize = 8;

#[repr(align(8))]
struct InlineStorage([MaybeUninit<u8>; INLINE_CAPACITY]);

/// Type-erased storage for the single outcome of a task.
///
/// A holder starts out empty and is written exactly once: either with the
/// value returned by the task body ([`store`](Self::store)) or with the
/// failure that ended it ([`store_failure`](Self::store_failure)). The
/// consumer reads it exactly once with [`take`](Self::take), which returns
/// the value by move or hands back the recorded failure.
///
/// The scheduler holds tasks type-uniformly; the erasure lives here so the
/// user-visible API can still return typed results. The stored `TypeId` is
/// asserted on `take`, so a `store::<T>` / `take::<U>` mismatch aborts
/// loudly instead of reinterpreting memory.
pub(crate) struct ResultHolder {
    storage: InlineStorage,
    outcome: Outcome,
}

enum Outcome {
    Empty,
    Stored(StoredValue),
    Failed(TaskError),
    Taken,
}

struct StoredValue {
    location: Location,
    type_id: TypeId,
    type_name: &'static str,
    /// Destroys the value in place (inline) or frees its box (heap). Captured
    /// at `store` time, invoked only if the holder is dropped before `take`.
    drop_fn: unsafe fn(*mut u8),
}

enum Location {
    Inline,
    Heap(NonNull<u8>),
}

impl ResultHolder {
    pub(crate) fn new() -> Self {
        Self {
            storage: InlineStorage([MaybeUninit::uninit(); INLINE_CAPACITY]),
            outcome: Outcome::Empty,
        }
    }

    fn fits_inline<T>() -> bool {
        size_of::<T>() <= INLINE_CAPACITY && align_of::<T>() <= INLINE_ALIGN
    }

    /// Stores `value` into the holder, moving it into the inline buffer when
    /// it fits and boxing it otherwise.
    ///
    /// # Panics
    ///
    /// Panics if an outcome has already been recorded.
    pub(crate) fn store<T: 'static>(&mut self, value: T) {
        assert!(
            matches!(self.outcome, Outcome::Empty),
            "result holder written twice"
        );

        let location = if Self::fits_inline::<T>() {
            // Safety: the buffer is large and aligned enough for T, checked
            // just above, and `Empty` guarantees it holds no live value.
            unsafe {
                ptr::write(self.storage.0.as_mut_ptr().cast::<T>(), value);
            }
            Location::Inline
        } else {
            let ptr = Box::into_raw(Box::new(value)).cast::<u8>();
            // Safety: `Box::into_raw` never returns null.
            Location::Heap(unsafe { NonNull::new_unchecked(ptr) })
        };

        let drop_fn = if Self::fits_inline::<T>() {
            drop_inline::<T>
        } else {
            drop_boxed::<T>
        };

        self.outcome = Outcome::Stored(StoredValue {
            location,
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            drop_fn,
        });
    }

    /// Records a failure instead of a value.
    ///
    /// # Panics
    ///
    /// Panics if an outcome has already been recorded. `store` and
    /// `store_failure` are mutually exclusive.
    pub(crate) fn store_failure(&mut self, error: TaskError) {
        assert!(
            matches!(self.outcome, Outcome::Empty),
            "result holder written twice"
        );
        self.outcome = Outcome::Failed(error);
    }

    /// Consumes the outcome: returns the stored value by move, or the
    /// recorded failure.
    ///
    /// # Panics
    ///
    /// Panics if nothing has been stored yet, if the outcome was already
    /// taken, or if `T` differs from the stored type.
    pub(crate) fn take<T: 'static>(&mut self) -> Result<T, TaskError> {
        match std::mem::replace(&mut self.outcome, Outcome::Taken) {
            Outcome::Empty => panic!("no task result has been stored"),
            Outcome::Taken => panic!("task result already taken"),
            Outcome::Failed(error) => Err(error),
            Outcome::Stored(stored) => {
                assert_eq!(
                    stored.type_id,
                    TypeId::of::<T>(),
                    "task result type mismatch: stored `{}`, requested `{}`",
                    stored.type_name,
                    any::type_name::<T>(),
                );

                let value = match stored.location {
                    // Safety: type and liveness checked above; `Taken` is
                    // already in place so the bytes cannot be read again.
                    Location::Inline => unsafe {
                        ptr::read(self.storage.0.as_ptr().cast::<T>())
                    },
                    // Safety: the pointer came from `Box::into_raw` of a
                    // `Box<T>` in `store`.
                    Location::Heap(ptr) => unsafe { *Box::from_raw(ptr.as_ptr().cast::<T>()) },
                };
                Ok(value)
            }
        }
    }

    pub(crate) fn is_written(&self) -> bool {
        !matches!(self.outcome, Outcome::Empty)
    }
}

impl Drop for ResultHolder {
    fn drop(&mut self) {
        if let Outcome::Stored(stored) = &self.outcome {
            let ptr = match stored.location {
                Location::Inline => self.storage.0.as_mut_ptr().cast::<u8>(),
                Location::Heap(ptr) => ptr.as_ptr(),
            };
            // Safety: a `Stored` outcome means the value was never taken, and
            // `drop_fn` was monomorphized for this exact location and type.
            unsafe { (stored.drop_fn)(ptr) };
        }
    }
}

unsafe fn drop_inline<T>(ptr: *mut u8) {
    // Safety: caller passes the inline buffer holding a live T.
    unsafe { ptr::drop_in_place(ptr.cast::<T>()) }
}

unsafe fn drop_boxed<T>(ptr: *mut u8) {
    // Safety: caller passes a pointer obtained from `Box::into_raw`.
    unsafe { drop(Box::from_raw(ptr.cast::<T>())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Id;
    use rstest::rstest;
    use static_assertions::const_assert;
    use std::num::NonZeroU64;
    use std::rc::Rc;

    const_assert!(size_of::<InlineStorage>() == INLINE_CAPACITY);
    const_assert!(align_of::<InlineStorage>() == INLINE_ALIGN);

    #[rstest]
    #[case::small_copy(42i32)]
    #[case::inline_boundary([7u64; 4])]
    #[case::spills_to_heap([7u64; 8])]
    fn test_store_take_round_trip<T>(#[case] value: T)
    where
        T: Clone + PartialEq + std::fmt::Debug + 'static,
    {
        let mut holder = ResultHolder::new();
        holder.store(value.clone());
        assert!(holder.is_written());
        assert_eq!(holder.take::<T>().unwrap(), value);
    }

    #[test]
    fn test_owned_value_round_trip() {
        let mut holder = ResultHolder::new();
        holder.store(String::from("spindle"));
        assert_eq!(holder.take::<String>().unwrap(), "spindle");
    }

    #[test]
    fn test_untaken_inline_value_is_dropped() {
        let tracker = Rc::new(());
        {
            let mut holder = ResultHolder::new();
            holder.store(Rc::clone(&tracker));
            assert_eq!(Rc::strong_count(&tracker), 2);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_untaken_heap_value_is_dropped() {
        let tracker = Rc::new(());
        {
            let mut holder = ResultHolder::new();
            // Pad past INLINE_CAPACITY so the value lands on the heap.
            holder.store((Rc::clone(&tracker), [0u64; 8]));
            assert_eq!(Rc::strong_count(&tracker), 2);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_failure_round_trip() {
        let id = Id(NonZeroU64::new(3).unwrap());
        let mut holder = ResultHolder::new();
        holder.store_failure(TaskError::cancelled(id));

        let err = holder.take::<i32>().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.id(), id);
    }

    #[test]
    #[should_panic(expected = "result holder written twice")]
    fn test_double_store_is_fatal() {
        let mut holder = ResultHolder::new();
        holder.store(1u8);
        holder.store(2u8);
    }

    #[test]
    #[should_panic(expected = "result holder written twice")]
    fn test_store_after_failure_is_fatal() {
        let id = Id(NonZeroU64::new(3).unwrap());
        let mut holder = ResultHolder::new();
        holder.store_failure(TaskError::cancelled(id));
        holder.store(1u8);
    }

    #[test]
    #[should_panic(expected = "task result already taken")]
    fn test_double_take_is_fatal() {
        let mut holder = ResultHolder::new();
        holder.store(1u8);
        let _ = holder.take::<u8>();
        let _ = holder.take::<u8>();
    }

    #[test]
    #[should_panic(expected = "task result type mismatch")]
    fn test_type_mismatch_is_fatal() {
        let mut holder = ResultHolder::new();
        holder.store(1u8);
        let _ = holder.take::<u16>();
    }
}
