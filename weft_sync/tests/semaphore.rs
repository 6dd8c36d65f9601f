//! Blocking behavior of the semaphore across real threads.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use weft_core::OsScheduler;
use weft_sync::{SemError, Semaphore};

/// Spin until `cond` holds, failing the test after two seconds.
fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn semaphore(initial: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(initial, Arc::new(OsScheduler::new())))
}

#[test]
fn test_down_blocks_until_up() {
    let sem = semaphore(0);

    let waiter = {
        let sem = Arc::clone(&sem);
        thread::spawn(move || sem.down())
    };

    wait_until("waiter to queue", || sem.waiting() == 1);
    assert_eq!(sem.available(), 0);

    sem.up().unwrap();
    waiter.join().unwrap().unwrap();

    // The released unit was consumed by the woken waiter.
    assert_eq!(sem.available(), 0);
    assert_eq!(sem.waiting(), 0);
}

#[test]
fn test_waiters_released_in_arrival_order() {
    let sem = semaphore(0);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut waiters = Vec::new();
    for tag in ["first", "second", "third"] {
        let sem_n = Arc::clone(&sem);
        let order = Arc::clone(&order);
        let queued_before = sem.waiting();
        waiters.push(thread::spawn(move || {
            sem_n.down().unwrap();
            order.lock().unwrap().push(tag);
        }));
        // Admit waiters one at a time so arrival order is fixed.
        wait_until("waiter to queue", || sem.waiting() == queued_before + 1);
    }

    for released in 1..=3 {
        sem.up().unwrap();
        wait_until("waiter to run", || order.lock().unwrap().len() == released);
    }
    for waiter in waiters {
        waiter.join().unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(sem.available(), 0);
}

#[test]
fn test_destroy_rejected_while_waiter_blocked() {
    let sem = semaphore(0);

    let waiter = {
        let sem = Arc::clone(&sem);
        thread::spawn(move || sem.down())
    };

    wait_until("waiter to queue", || sem.waiting() == 1);
    assert_eq!(sem.destroy(), Err(SemError::WaitersPending));

    // The rejected destroy left the semaphore fully usable.
    sem.up().unwrap();
    waiter.join().unwrap().unwrap();
    sem.destroy().unwrap();
}

#[test]
fn test_handoff_between_two_threads() {
    // Ping-pong: each side only proceeds when the other releases it.
    let ping = semaphore(0);
    let pong = semaphore(0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let worker = {
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        let log = Arc::clone(&log);
        thread::spawn(move || {
            for step in 0..3 {
                ping.down().unwrap();
                log.lock().unwrap().push(format!("worker {step}"));
                pong.up().unwrap();
            }
        })
    };

    for step in 0..3 {
        log.lock().unwrap().push(format!("main {step}"));
        ping.up().unwrap();
        pong.down().unwrap();
    }
    worker.join().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "main 0", "worker 0", "main 1", "worker 1", "main 2", "worker 2",
        ]
    );
}
