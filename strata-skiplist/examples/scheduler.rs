//! A time-ordered event scheduler.
//!
//! Events are keyed by their due time. Producers insert from any thread and a
//! single dispatcher thread runs events from the front of the list once they
//! are due. The mutex and condition variable only serve to put the dispatcher
//! to sleep: the list itself needs no outside synchronization.

use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use strata_skiplist::{Handle, SkipList};

type Event = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    events: SkipList<Instant, Event>,
    lock: Mutex<()>,
    wake: Condvar,
    done: AtomicBool,
}

struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    fn new() -> Scheduler {
        let shared = Arc::new(Shared {
            events: SkipList::new(),
            lock: Mutex::new(()),
            wake: Condvar::new(),
            done: AtomicBool::new(false),
        });
        let dispatcher = {
            let shared = shared.clone();
            thread::spawn(move || dispatch(&shared))
        };
        Scheduler {
            shared,
            dispatcher: Some(dispatcher),
        }
    }

    fn schedule(
        &self,
        when: Instant,
        event: impl Fn() + Send + Sync + 'static,
    ) -> Handle<Instant, Event> {
        let (handle, front) = self.shared.events.insert_full(when, Arc::new(event));
        if front {
            self.wake();
        }
        handle
    }

    /// Moves a pending event to `when`. Returns the event's new handle, or
    /// `None` if it already ran.
    fn reschedule(
        &self,
        event: &Handle<Instant, Event>,
        when: Instant,
    ) -> Option<Handle<Instant, Event>> {
        let (handle, front) = self.shared.events.update(event, when).ok()?;
        if front {
            self.wake();
        }
        Some(handle)
    }

    /// Wakes the dispatcher when an event became due before everything else.
    fn wake(&self) {
        let _guard = self.shared.lock.lock();
        self.shared.wake.notify_one();
    }

    fn stop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            {
                let _guard = self.shared.lock.lock();
                self.shared.done.store(true, Ordering::SeqCst);
                self.shared.wake.notify_one();
            }
            if let Err(payload) = dispatcher.join() {
                if thread::panicking() {
                    eprintln!("dispatcher panicked during teardown");
                } else {
                    panic::resume_unwind(payload);
                }
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(shared: &Shared) {
    while !shared.done.load(Ordering::SeqCst) {
        match shared.events.front() {
            Some(first) => {
                let now = Instant::now();
                if *first.key() <= now {
                    // Only the dispatcher removes events.
                    if shared.events.remove(&first).is_ok() {
                        (first.value())();
                    }
                } else {
                    let mut guard = shared.lock.lock();
                    let unchanged = shared
                        .events
                        .front()
                        .map_or(false, |f| *f.key() == *first.key());
                    if !shared.done.load(Ordering::SeqCst) && unchanged {
                        shared.wake.wait_until(&mut guard, *first.key());
                    }
                }
            }
            None => {
                let mut guard = shared.lock.lock();
                if shared.events.is_empty() && !shared.done.load(Ordering::SeqCst) {
                    shared.wake.wait(&mut guard);
                }
            }
        }
    }
}

fn main() {
    let values = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new();

    let start = Instant::now();
    let mut handles = Vec::new();
    for (delay, value) in [(150, 1), (75, 0), (225, 2), (50, 3)] {
        let values = values.clone();
        handles.push(scheduler.schedule(start + Duration::from_millis(delay), move || {
            values.lock().push(value);
        }));
    }

    // Push the earliest event behind all the others.
    let last = scheduler
        .reschedule(&handles[3], start + Duration::from_millis(275))
        .expect("event already ran");
    assert!(values.lock().is_empty());

    thread::sleep(Duration::from_millis(400));
    scheduler.stop();

    assert!(last.is_removed());
    assert_eq!(*values.lock(), [0, 1, 2, 3]);
    println!("ran {:?} in order", values.lock());
}
