use crate as spindle;
use crate::{EventLoop, Queue};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Long enough that scheduling noise cannot mask it.
const DELAY: Duration = Duration::from_millis(300);

/// Upper bound for operations that should complete without any waiting.
const IMMEDIATE: Duration = Duration::from_millis(150);

#[test]
fn test_call_soon_primes_but_does_not_start() {
    let event_loop = EventLoop::new();
    let started = Rc::new(Cell::new(false));

    let task = {
        let started = Rc::clone(&started);
        event_loop.call_soon(async move {
            started.set(true);
        })
    };

    // The task sits in the ready queue; its body has not run yet.
    assert!(!started.get());
    assert!(!task.is_complete());
    assert_eq!(event_loop.shared.num_ready(), 1);

    event_loop.run_until_complete(&task);
    assert!(started.get());
    assert!(task.is_complete());
}

#[test]
fn test_simple_push_pop_with_delayed_pusher() {
    let event_loop = EventLoop::new();
    let queue = Rc::new(Queue::unbounded());
    let start = Instant::now();

    let pusher = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            spindle::sleep(DELAY).await;
            queue.push(42).await;
            queue.push(21).await;
        })
    };

    let popper = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            let v1 = queue.pop().await;
            assert_eq!(v1, 42);
            // The first pop had to wait for the pusher's sleep.
            assert!(start.elapsed() >= DELAY);

            // The second item is already there.
            let before = Instant::now();
            let v2 = queue.pop().await;
            assert_eq!(v2, 21);
            assert!(before.elapsed() <= IMMEDIATE);

            v1
        })
    };

    event_loop.run_until_complete(&popper);
    assert_eq!(popper.get_result().unwrap(), 42);
    assert!(pusher.is_complete());
}

#[test]
fn test_try_pop_before_and_after_push() {
    let event_loop = EventLoop::new();
    let queue = Rc::new(Queue::unbounded());
    let start = Instant::now();

    let pusher = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            spindle::sleep(DELAY).await;
            queue.push(42).await;
            queue.push(21).await;
        })
    };

    let popper = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            // Nothing has been pushed yet.
            assert_eq!(queue.try_pop(), None);

            let v1 = queue.pop().await;
            assert_eq!(v1, 42);
            assert!(start.elapsed() >= DELAY);

            // The second item is already there, non-blocking this time.
            assert_eq!(queue.try_pop(), Some(21));
        })
    };

    event_loop.run_until_complete(&popper);
    popper.get_result().unwrap();
    assert!(pusher.is_complete());
}

#[test]
fn test_bounded_queue_backpressure() {
    let event_loop = EventLoop::new();
    let queue = Rc::new(Queue::bounded(10));
    let start = Instant::now();

    for i in 0..10 {
        queue.try_push(i).unwrap();
    }
    assert!(queue.is_full());

    let pusher = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            // Full queue: this suspends until the popper makes room.
            queue.push(42).await;
            assert!(start.elapsed() >= DELAY);
        })
    };

    let popper = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            spindle::sleep(DELAY).await;

            for expected in 0..10 {
                assert_eq!(queue.pop().await, expected);
            }
            // The 11th pop gets the value the pusher was blocked on.
            assert_eq!(queue.pop().await, 42);
        })
    };

    event_loop.run_until_complete(&popper);
    popper.get_result().unwrap();
    assert!(pusher.is_complete());
    pusher.get_result().unwrap();
}

#[test]
fn test_try_push_on_full_queue() {
    let event_loop = EventLoop::new();
    let queue = Rc::new(Queue::bounded(10));
    let start = Instant::now();

    for i in 0..10 {
        queue.try_push(i).unwrap();
    }

    let pusher = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            assert_eq!(queue.try_push(42), Err(42));

            queue.push(1337).await;
            assert!(start.elapsed() >= DELAY);

            // The popper drained everything; there is room again.
            assert!(queue.try_push(42).is_ok());
        })
    };

    let popper = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move {
            spindle::sleep(DELAY).await;

            for expected in 0..10 {
                assert_eq!(queue.pop().await, expected);
            }
            assert_eq!(queue.pop().await, 1337);
            assert_eq!(queue.pop().await, 42);
        })
    };

    event_loop.run_until_complete(&popper);
    popper.get_result().unwrap();
    pusher.get_result().unwrap();
}

#[test]
fn test_cancelling_a_sleeping_task_wakes_it_promptly() {
    let event_loop = EventLoop::new();
    let start = Instant::now();

    let sleeper = Rc::new(event_loop.call_soon(async {
        spindle::sleep(Duration::from_secs(10)).await;
    }));

    let canceller = {
        let sleeper = Rc::clone(&sleeper);
        event_loop.call_soon(async move {
            sleeper.cancel();
            // Delivery happens at the sleeper's next resume, not here.
            assert!(!sleeper.is_cancelled());
            spindle::yield_now().await;
            assert!(sleeper.is_cancelled());
        })
    };

    event_loop.run_until_complete(&canceller);
    canceller.get_result().unwrap();

    assert!(sleeper.is_complete());
    assert!(sleeper.is_cancelled());
    assert!(sleeper.get_result().unwrap_err().is_cancelled());
    // Nowhere near the 10 s deadline.
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
#[should_panic(expected = "deadlock detected")]
fn test_deadlocked_run_until_complete_is_fatal() {
    let event_loop = EventLoop::new();
    let queue: Rc<Queue<i32>> = Rc::new(Queue::unbounded());

    let starved = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move { queue.pop().await })
    };

    // Nobody ever pushes: the loop must report the deadlock, not hang.
    event_loop.run_until_complete(&starved);
}

#[test]
fn test_ready_queue_is_fair_fifo() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b"] {
        let log = Rc::clone(&log);
        event_loop.call_soon(async move {
            for _ in 0..3 {
                log.borrow_mut().push(name);
                spindle::yield_now().await;
            }
        });
    }

    event_loop.run_forever();
    // A task that yields goes to the back of the queue: strict alternation.
    assert_eq!(*log.borrow(), vec!["a", "b", "a", "b", "a", "b"]);
}

#[test]
fn test_notify_one_wakes_earliest_subscriber() {
    let event_loop = EventLoop::new();
    let handler = Rc::new(crate::WaitHandler::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second"] {
        let handler = Rc::clone(&handler);
        let log = Rc::clone(&log);
        event_loop.call_soon(async move {
            handler.wait().await;
            log.borrow_mut().push(name);
        });
    }

    let notifier = {
        let handler = Rc::clone(&handler);
        event_loop.call_soon(async move {
            // Both waiters are parked by now (they ran before us).
            assert_eq!(handler.len(), 2);
            assert!(handler.notify_one());
            spindle::yield_now().await;
            assert!(handler.notify_one());
            assert!(!handler.notify_one());
        })
    };

    event_loop.run_forever();
    notifier.get_result().unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn test_sleepers_wake_in_deadline_order() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for millis in [60u64, 20, 40] {
        let log = Rc::clone(&log);
        event_loop.call_soon(async move {
            spindle::sleep(Duration::from_millis(millis)).await;
            log.borrow_mut().push(millis);
        });
    }

    event_loop.run_forever();
    assert_eq!(*log.borrow(), vec![20, 40, 60]);
}

#[test]
fn test_sleep_zero_is_equivalent_to_yield() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    {
        let log = Rc::clone(&log);
        event_loop.call_soon(async move {
            spindle::sleep(Duration::ZERO).await;
            log.borrow_mut().push("zero-sleeper");
        });
    }
    {
        let log = Rc::clone(&log);
        event_loop.call_soon(async move {
            log.borrow_mut().push("runner");
        });
    }

    event_loop.run_forever();
    // The zero-duration sleep still suspended once and gave way.
    assert_eq!(*log.borrow(), vec!["runner", "zero-sleeper"]);
}

#[test]
fn test_panic_is_captured_and_surfaced() {
    let event_loop = EventLoop::new();

    let panicky = event_loop.call_soon(async {
        panic!("boom");
    });
    event_loop.run_until_complete(&panicky);

    let err = panicky.get_result().unwrap_err();
    assert!(err.is_panic());
    assert!(!err.is_cancelled());

    let payload = err.into_panic();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    // The loop itself survived the panic.
    let next = event_loop.call_soon(async { 1 });
    event_loop.run_until_complete(&next);
    assert_eq!(next.get_result().unwrap(), 1);
}

#[test]
fn test_spawn_and_join_from_inside_a_task() {
    let event_loop = EventLoop::new();

    let outer = event_loop.call_soon(async {
        let inner = spindle::spawn(async { 9 });
        inner.await.unwrap()
    });

    event_loop.run_until_complete(&outer);
    assert_eq!(outer.get_result().unwrap(), 9);
}

#[test]
fn test_yield_to_runs_nested_task_synchronously() {
    let event_loop = EventLoop::new();

    let parent = event_loop.call_soon(async {
        let doubled = spindle::yield_to(async { 21 * 2 }).await;
        doubled
    });

    event_loop.run_until_complete(&parent);
    assert_eq!(parent.get_result().unwrap(), 42);
}

#[test]
fn test_yield_to_reraises_nested_panic() {
    let event_loop = EventLoop::new();

    let parent = event_loop.call_soon(async {
        spindle::yield_to(async {
            panic!("inner");
        })
        .await;
    });

    event_loop.run_until_complete(&parent);

    let err = parent.get_result().unwrap_err();
    assert!(err.is_panic());
    assert_eq!(err.into_panic().downcast_ref::<&str>(), Some(&"inner"));
}

#[test]
fn test_cancelling_a_task_blocked_on_a_queue_releases_its_slot() {
    let event_loop = EventLoop::new();
    let queue = Rc::new(Queue::<i32>::unbounded());

    let blocked = {
        let queue = Rc::clone(&queue);
        Rc::new(event_loop.call_soon(async move { queue.pop().await }))
    };

    let driver = {
        let blocked = Rc::clone(&blocked);
        event_loop.call_soon(async move {
            // Let the popper park itself first.
            spindle::yield_now().await;
            blocked.cancel();
            spindle::yield_now().await;
            assert!(blocked.is_cancelled());
        })
    };

    event_loop.run_until_complete(&driver);
    driver.get_result().unwrap();
    assert!(blocked.get_result().unwrap_err().is_cancelled());

    // The cancelled task deregistered from the queue's wait handler, so a
    // fresh consumer receives the next value instead of a dead subscriber.
    queue.try_push(7).unwrap();
    let popper = {
        let queue = Rc::clone(&queue);
        event_loop.call_soon(async move { queue.pop().await })
    };
    event_loop.run_until_complete(&popper);
    assert_eq!(popper.get_result().unwrap(), 7);
}

#[test]
fn test_cancel_after_completion_is_ignored() {
    let event_loop = EventLoop::new();

    let task = event_loop.call_soon(async { 5 });
    event_loop.run_until_complete(&task);

    task.cancel();
    assert!(!task.is_cancelled());
    assert_eq!(task.get_result().unwrap(), 5);
}

#[test]
fn test_run_until_complete_leaves_other_tasks_registered() {
    let event_loop = EventLoop::new();
    let start = Instant::now();

    let slow = event_loop.call_soon(async {
        spindle::sleep(Duration::from_secs(10)).await;
    });
    let fast = event_loop.call_soon(async { "fast" });

    event_loop.run_until_complete(&fast);
    assert_eq!(fast.get_result().unwrap(), "fast");
    assert!(!slow.is_complete());
    // The sleeper is still registered, parked on the timer heap.
    assert_eq!(event_loop.shared.num_sleeping(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_run_forever_drains_all_tasks() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut handles = Vec::new();

    for millis in [30u64, 10, 20] {
        let log = Rc::clone(&log);
        handles.push(event_loop.call_soon(async move {
            spindle::sleep(Duration::from_millis(millis)).await;
            log.borrow_mut().push(millis);
        }));
    }

    event_loop.run_forever();

    assert_eq!(*log.borrow(), vec![10, 20, 30]);
    assert!(handles.iter().all(|handle| handle.is_complete()));
}

#[test]
fn test_stop_from_inside_a_task() {
    let event_loop = EventLoop::new();
    let ticks = Rc::new(Cell::new(0u64));

    let spinner = {
        let ticks = Rc::clone(&ticks);
        event_loop.call_soon(async move {
            // Effectively endless; only stop() ends this test.
            for _ in 0..u64::MAX {
                ticks.set(ticks.get() + 1);
                spindle::yield_now().await;
            }
        })
    };

    let stopper = event_loop.call_soon(async {
        spindle::sleep(Duration::from_millis(50)).await;
        spindle::stop();
    });

    event_loop.run_forever();

    assert!(stopper.is_complete());
    assert!(!spinner.is_complete());
    assert!(ticks.get() > 0);
}

#[test]
fn test_nested_event_loops_restore_the_current_loop() {
    let outer = EventLoop::new();

    let task = outer.call_soon(async {
        let inner = EventLoop::new();
        let inner_task = inner.call_soon(async { 7 });
        inner.run_until_complete(&inner_task);

        let seven = inner_task.get_result().unwrap();

        // Back on the outer loop: its primitives still work.
        spindle::yield_now().await;
        seven
    });

    outer.run_until_complete(&task);
    assert_eq!(task.get_result().unwrap(), 7);
}

#[test]
#[should_panic(expected = "not inside a running event loop")]
fn test_spawn_outside_a_loop_is_rejected() {
    let _ = spindle::spawn(async {});
}

#[test]
#[should_panic(expected = "has not completed")]
fn test_get_result_before_completion_is_fatal() {
    let event_loop = EventLoop::new();
    let task = event_loop.call_soon(async { 1 });
    let _ = task.get_result();
}
