//! Cross-container stress: every container drained under producer/consumer
//! pressure must conserve the pushed payload sum, while all of them share
//! the one global hazard-pointer registry.

use petek_deque::Deque;
use petek_list::HashSet;
use petek_queue::MsQueue;
use petek_skiplist::PriorityQueue;
use petek_stack::Stack;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 4;
const PER_THREAD: usize = 2000;

fn expected_sum() -> u64 {
    let total = (THREADS * PER_THREAD) as u64;
    total * (total - 1) / 2
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_all_containers_shared_registry() {
    // Run the four pointer-based containers concurrently on the same
    // threads so their hazard slots and retired lists interleave in the
    // shared registry.
    let stack = Arc::new(Stack::new());
    let queue = Arc::new(MsQueue::new());
    let deque = Arc::new(Deque::new());
    let pqueue = Arc::new(PriorityQueue::new());
    let mut handles = vec![];

    for t in 0..THREADS {
        let stack = stack.clone();
        let queue = queue.clone();
        let deque = deque.clone();
        let pqueue = pqueue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let v = (t * PER_THREAD + i) as u64;
                stack.push(v);
                queue.enqueue(v);
                if v % 2 == 0 {
                    deque.push_left(v);
                } else {
                    deque.push_right(v);
                }
                pqueue.insert(v, v);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let mut handles = vec![];
    for t in 0..THREADS {
        let stack = stack.clone();
        let queue = queue.clone();
        let deque = deque.clone();
        let pqueue = pqueue.clone();
        handles.push(thread::spawn(move || {
            let mut sums = (0u64, 0u64, 0u64, 0u64);
            for _ in 0..PER_THREAD {
                loop {
                    if let Some(v) = stack.pop() {
                        sums.0 += v;
                        break;
                    }
                    thread::yield_now();
                }
                loop {
                    if let Some(v) = queue.dequeue() {
                        sums.1 += v;
                        break;
                    }
                    thread::yield_now();
                }
                loop {
                    let v = if t % 2 == 0 {
                        deque.pop_right()
                    } else {
                        deque.pop_left()
                    };
                    if let Some(v) = v {
                        sums.2 += v;
                        break;
                    }
                    thread::yield_now();
                }
                loop {
                    if let Some((_, v)) = pqueue.dequeue() {
                        sums.3 += v;
                        break;
                    }
                    thread::yield_now();
                }
            }
            sums
        }));
    }

    let mut totals = (0u64, 0u64, 0u64, 0u64);
    for h in handles {
        let s = h.join().unwrap();
        totals.0 += s.0;
        totals.1 += s.1;
        totals.2 += s.2;
        totals.3 += s.3;
    }

    let want = expected_sum();
    assert_eq!(totals.0, want, "stack lost or duplicated values");
    assert_eq!(totals.1, want, "queue lost or duplicated values");
    assert_eq!(totals.2, want, "deque lost or duplicated values");
    assert_eq!(totals.3, want, "priority queue lost or duplicated values");

    assert!(stack.is_empty());
    assert!(queue.is_empty());
    assert!(deque.is_empty());
    assert!(pqueue.is_empty());
    petek::flush();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_set_under_churn_with_other_containers() {
    let set = Arc::new(HashSet::with_capacity_and_load_factor(1024, 0.75));
    let stack = Arc::new(Stack::new());
    let mut handles = vec![];

    for t in 0..THREADS {
        let set = set.clone();
        let stack = stack.clone();
        handles.push(thread::spawn(move || {
            let base = (t * PER_THREAD) as u64;
            for i in 0..PER_THREAD as u64 {
                assert!(set.insert(base + i));
                stack.push(base + i);
            }
            for i in 0..PER_THREAD as u64 {
                assert!(set.remove(&(base + i)));
                assert!(stack.pop().is_some());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(set.is_empty());
    assert!(stack.is_empty());
    petek::flush();
}
