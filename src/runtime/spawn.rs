use crate::context;
use crate::task::TaskHandle;

/// Spawns a task onto the thread's current event loop, from inside another
/// task (or anywhere while a `run_*` call is active further up the stack).
///
/// The task is queued behind everything already ready and starts running at
/// the loop's next pass over it.
///
/// # Panics
///
/// Panics when no event loop is running on this thread; use
/// [`EventLoop::call_soon`](crate::EventLoop::call_soon) before the loop is
/// started.
#[track_caller]
pub fn spawn<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    context::with_shared(|shared| shared.spawn(future))
}

/// Runs `future` as a nested task, suspending the caller until it completes,
/// and returns its output.
///
/// If the nested task fails, the failure is re-raised in the caller: a
/// captured panic resumes unwinding with its original payload, a
/// cancellation unwinds with a payload of its own. Either way the caller's
/// task records the failure as its outcome unless it is caught.
///
/// ```
/// use spindle::EventLoop;
///
/// let event_loop = EventLoop::new();
/// let task = event_loop.call_soon(async {
///     let doubled = spindle::yield_to(async { 21 * 2 }).await;
///     doubled
/// });
///
/// event_loop.run_until_complete(&task);
/// assert_eq!(task.get_result().unwrap(), 42);
/// ```
pub async fn yield_to<F>(future: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    let handle = spawn(future);
    match handle.await {
        Ok(value) => value,
        Err(error) => error.resume(),
    }
}

/// Asks the thread's current event loop to return once the calling task
/// suspends or finishes. The task itself is left as-is and resumes on the
/// next `run_*` call.
///
/// # Panics
///
/// Panics when no event loop is running on this thread.
#[track_caller]
pub fn stop() {
    context::with_shared(|shared| shared.stop());
}
