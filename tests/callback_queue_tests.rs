use callback_queue::{CallbackQueue, Config, ErrorKind, Fault, ThreadPool};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn counting_queue(threads: usize) -> CallbackQueue {
    CallbackQueue::with_config(Config::default().number_of_threads(threads)).unwrap()
}

#[test]
fn starts_stopped_with_one_thread() {
    let queue = CallbackQueue::new().unwrap();
    assert!(!queue.is_running());
    assert_eq!(queue.number_of_threads(), 1);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn pushes_to_stopped_queue_run_after_start() {
    let counter = Arc::new(AtomicUsize::new(0));
    let queue = counting_queue(4);
    for _ in 0..50 {
        let counter = counter.clone();
        queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(queue.pending(), 50);

    queue.start();
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 50));
    assert!(queue.is_running());
    assert!(wait_until(|| queue.metrics().executed == 50));
}

#[test]
fn single_worker_runs_in_push_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let queue = counting_queue(1);
        queue.start();
        for i in 0..200 {
            let order = order.clone();
            queue.push(move || order.lock().unwrap().push(i));
        }
    }
    let order = order.lock().unwrap();
    assert_eq!(*order, (0..200).collect::<Vec<_>>());
}

#[test]
fn drop_drains_stopped_queue() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let queue = counting_queue(3);
        for _ in 0..25 {
            let counter = counter.clone();
            queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
        }
        assert!(!queue.is_running());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 25);
}

#[test]
fn drop_drains_queue_without_workers() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let queue = counting_queue(2);
        queue.set_number_of_threads(0);
        for _ in 0..10 {
            let counter = counter.clone();
            queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn resize_is_eventually_consistent() {
    let queue = counting_queue(2);
    queue.set_number_of_threads(0);
    queue.set_number_of_threads(4);
    assert!(wait_until(|| queue.number_of_threads() == 4));

    queue.set_number_of_threads(1);
    assert!(wait_until(|| queue.number_of_threads() == 1));
}

#[test]
fn stop_then_push_then_start() {
    let counter = Arc::new(AtomicUsize::new(0));
    let queue = counting_queue(4);
    queue.start();
    queue.stop();
    assert!(wait_until(|| !queue.is_running()));

    for _ in 0..10 {
        let counter = counter.clone();
        queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    queue.start();
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 10));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn hundred_increments_on_eight_threads() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let queue = counting_queue(8);
        for _ in 0..100 {
            let counter = counter.clone();
            queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
        }
        queue.start();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[test]
fn panicking_callable_does_not_kill_worker() {
    let counter = Arc::new(AtomicUsize::new(0));
    let faults = Arc::new(Mutex::new(Vec::<Fault>::new()));
    let f = faults.clone();
    let config =
        Config::default().on_fault(move |fault: &Fault| f.lock().unwrap().push(fault.clone()));
    let queue = CallbackQueue::with_config(config).unwrap();
    queue.start();

    queue.push(|| panic!("callable failed"));
    let c = counter.clone();
    queue.push(move || c.fetch_add(1, Ordering::SeqCst));

    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1));
    assert!(wait_until(|| queue.metrics().executed == 1));
    assert_eq!(queue.metrics().faulted, 1);

    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].message, "callable failed");
    assert_eq!(faults[0].worker, Some(0));
}

#[test]
fn panicking_fault_hook_is_contained() {
    let counter = Arc::new(AtomicUsize::new(0));
    let config = Config::default().on_fault(|_: &Fault| panic!("hook failed"));
    {
        let queue = CallbackQueue::with_config(config).unwrap();
        queue.start();
        queue.push(|| panic!("callable failed"));
        let c = counter.clone();
        queue.push(move || c.fetch_add(1, Ordering::SeqCst));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn push_with_binds_arguments() {
    let (tx, rx) = mpsc::channel();
    let queue = counting_queue(2);
    queue.start();
    queue.push_with(
        |tx: mpsc::Sender<String>, name: String, n: usize| tx.send(format!("{}:{}", name, n)),
        (tx, "answer".to_owned(), 42usize),
    );
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "answer:42");
}

#[test]
fn concurrent_producers_and_commands() {
    let counter = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(counting_queue(2));
    queue.start();

    let producers = 4;
    let per_producer = 250;
    let barrier = Arc::new(Barrier::new(producers + 1));
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let (queue, counter, barrier) = (queue.clone(), counter.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_producer {
                    let counter = counter.clone();
                    queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
                }
            })
        })
        .collect();

    barrier.wait();
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        queue.set_number_of_threads(rng.gen_range(0..6));
        if rng.gen_bool(0.5) {
            queue.stop();
        } else {
            queue.start();
        }
    }
    for handle in handles {
        handle.join().unwrap();
    }
    queue.set_number_of_threads(3);
    queue.start();

    assert!(wait_until(|| counter.load(Ordering::SeqCst) == producers * per_producer));
    assert!(wait_until(|| queue.number_of_threads() == 3 && queue.is_running()));
}

#[test]
fn shrinking_waits_for_in_flight_items() {
    let finished = Arc::new(AtomicUsize::new(0));
    let queue = counting_queue(4);
    queue.start();
    for _ in 0..4 {
        let finished = finished.clone();
        queue.push(move || {
            thread::sleep(Duration::from_millis(100));
            finished.fetch_add(1, Ordering::SeqCst);
        });
    }
    thread::sleep(Duration::from_millis(20));
    queue.set_number_of_threads(1);
    assert!(wait_until(|| queue.number_of_threads() == 1));
    assert!(wait_until(|| finished.load(Ordering::SeqCst) == 4));
}

#[test]
fn thread_pool_trait_runs_jobs() {
    let counter = Arc::new(AtomicUsize::new(0));
    let pool = <CallbackQueue as ThreadPool>::new(3).unwrap();
    for _ in 0..30 {
        let counter = counter.clone();
        pool.execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 30));
}

#[test]
fn independent_queues_do_not_interfere() {
    let a = counting_queue(1);
    let b = counting_queue(1);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    a.push(move || h.fetch_add(1, Ordering::SeqCst));
    b.start();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(a.pending(), 1);
    assert_eq!(b.pending(), 0);
}

#[test]
fn rejects_invalid_config() {
    let err = CallbackQueue::with_config(Config::default().name("nul\0")).unwrap_err();
    match err.kind() {
        ErrorKind::InvalidConfig(_) => {}
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn debug_describes_state() {
    let queue = CallbackQueue::with_config(Config::default().name("render")).unwrap();
    let description = format!("{:?}", queue);
    assert!(description.contains("render"));
    assert!(description.contains("running: false"));
}

#[test]
fn logs_through_configured_logger() {
    let counter = Arc::new(AtomicUsize::new(0));
    let config = Config::default()
        .name("logged")
        .number_of_threads(2)
        .logger(callback_queue::logging::terminal_logger());
    {
        let queue = CallbackQueue::with_config(config).unwrap();
        queue.start();
        queue.push(|| panic!("logged failure"));
        let c = counter.clone();
        queue.push(move || c.fetch_add(1, Ordering::SeqCst));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn last_handle_dropped_by_own_worker() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();
    let c = counter.clone();
    thread::spawn(move || {
        let queue = Arc::new(counting_queue(1));
        let handle = queue.clone();
        queue.push(move || {
            thread::sleep(Duration::from_millis(100));
            drop(handle);
        });
        // runs on the same worker after the queue is gone
        queue.push(move || c.fetch_add(1, Ordering::SeqCst));
        queue.start();
        drop(queue);
        done_tx.send(()).unwrap();
    });

    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn worker_spawn_failure_degrades_pool() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        // no system hands out a stack this large; the controller uses the default size
        let config = Config::default().number_of_threads(4).stack_size(1 << 60);
        let queue = CallbackQueue::with_config(config).unwrap();
        assert_eq!(queue.number_of_threads(), 0);

        queue.set_number_of_threads(2);
        for _ in 0..5 {
            let counter = counter.clone();
            queue.push(move || counter.fetch_add(1, Ordering::SeqCst));
        }
        queue.start();
        assert!(wait_until(|| queue.is_running()));
        assert_eq!(queue.number_of_threads(), 0);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}
