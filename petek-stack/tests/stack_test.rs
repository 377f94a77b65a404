use petek_stack::{EliminationStack, Stack};
use std::sync::Arc;
use std::thread;

#[test]
fn test_stack_simple() {
    let s = Stack::new();
    s.push(5);
    assert_eq!(s.pop(), Some(5));
    assert!(s.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stack_two_thread_drain() {
    // One pusher, one popper busy-waiting on empty; the popped multiset
    // must equal the pushed one.
    const N: usize = 1000;
    let s = Arc::new(Stack::new());

    let pusher = {
        let s = s.clone();
        thread::spawn(move || {
            for i in 0..N {
                s.push(i);
            }
        })
    };

    let popper = {
        let s = s.clone();
        thread::spawn(move || {
            let mut seen = vec![false; N];
            for _ in 0..N {
                loop {
                    if let Some(v) = s.pop() {
                        assert!(!seen[v], "value {} popped twice", v);
                        seen[v] = true;
                        break;
                    }
                    thread::yield_now();
                }
            }
            seen
        })
    };

    pusher.join().unwrap();
    let seen = popper.join().unwrap();
    assert!(seen.iter().all(|&b| b));
    assert!(s.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stack_sum_conservation() {
    // P producers and C consumers; the drained sum must equal the pushed sum.
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2000;
    let s = Arc::new(Stack::new());
    let mut handles = vec![];

    for t in 0..THREADS {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                s.push((t * PER_THREAD + i) as u64);
            }
        }));
    }

    let mut poppers = vec![];
    for _ in 0..THREADS {
        let s = s.clone();
        poppers.push(thread::spawn(move || {
            let mut sum = 0u64;
            let mut got = 0;
            while got < PER_THREAD {
                if let Some(v) = s.pop() {
                    sum += v;
                    got += 1;
                } else {
                    thread::yield_now();
                }
            }
            sum
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
    let popped: u64 = poppers.into_iter().map(|h| h.join().unwrap()).sum();

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(popped, total * (total - 1) / 2);
    assert!(s.pop().is_none());
}

#[test]
fn test_elimination_stack_simple() {
    let s = EliminationStack::new();
    s.push(5);
    assert_eq!(s.pop(), Some(5));
    assert!(s.is_empty());
    assert_eq!(s.pop(), None);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_elimination_stack_contended() {
    // Heavy symmetric contention to exercise the collision arrays. Totals
    // must balance whether or not any pair actually eliminated.
    const THREADS: usize = 8;
    const PER_THREAD: usize = 2000;
    let s = Arc::new(EliminationStack::with_collision_slots(4));
    let mut handles = vec![];

    for t in 0..THREADS / 2 {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                s.push((t * PER_THREAD + i) as u64);
            }
            0u64
        }));
    }
    for _ in 0..THREADS / 2 {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            let mut sum = 0u64;
            let mut got = 0;
            while got < PER_THREAD {
                if let Some(v) = s.pop() {
                    sum += v;
                    got += 1;
                } else {
                    std::thread::yield_now();
                }
            }
            sum
        }));
    }

    let popped: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let total = (THREADS / 2 * PER_THREAD) as u64;
    assert_eq!(popped, total * (total - 1) / 2);
    assert!(s.pop().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_elimination_forced_collisions() {
    // A single collision slot funnels every contended pair through the
    // exchange protocol; totals must still balance.
    const PAIRS: usize = 4;
    const PER_THREAD: usize = 1000;
    let s = Arc::new(EliminationStack::with_collision_slots(1));
    let mut handles = vec![];

    for t in 0..PAIRS {
        let s_push = s.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                s_push.push((t * PER_THREAD + i) as u64);
            }
            0u64
        }));
        let s = s.clone();
        handles.push(thread::spawn(move || {
            let mut sum = 0u64;
            let mut got = 0;
            while got < PER_THREAD {
                if let Some(v) = s.pop() {
                    sum += v;
                    got += 1;
                }
            }
            sum
        }));
    }

    let popped: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let total = (PAIRS * PER_THREAD) as u64;
    assert_eq!(popped, total * (total - 1) / 2);
    assert!(s.pop().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_stack_reclamation_pressure() {
    // Churn enough nodes through retire/scan to cross the threshold many
    // times; under a sanitizer this is the use-after-free probe.
    let s = Stack::new();
    for round in 0..200 {
        for i in 0..64 {
            s.push(round * 64 + i);
        }
        for _ in 0..64 {
            assert!(s.pop().is_some());
        }
    }
    assert!(s.is_empty());
    petek::flush();
}
