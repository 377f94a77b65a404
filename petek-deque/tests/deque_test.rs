use petek_deque::Deque;
use std::sync::Arc;
use std::thread;

#[test]
fn test_deque_fifo_across_ends() {
    let d = Deque::new();
    d.push_right(1);
    d.push_right(2);
    assert_eq!(d.pop_left(), Some(1));
    assert_eq!(d.pop_left(), Some(2));
    assert_eq!(d.pop_left(), None);
}

#[test]
fn test_deque_peeks() {
    let d = Deque::new();
    d.push_left(1);
    d.push_right(2);
    assert_eq!(d.peek_left(), Some(1));
    assert_eq!(d.peek_right(), Some(2));
    assert_eq!(d.len(), 2);
}

#[test]
fn test_deque_single_element_from_either_end() {
    let d = Deque::new();
    d.push_left(7);
    assert_eq!(d.pop_right(), Some(7));
    assert!(d.is_empty());
    d.push_right(8);
    assert_eq!(d.pop_left(), Some(8));
    assert!(d.is_empty());
}

/// Single-threaded coherence walk after a mixed workload: walking from the
/// stable anchor must reach both ends with consistent back-links.
#[test]
fn test_deque_coherence_walk() {
    let d = Deque::new();
    for i in 0..100 {
        if i % 2 == 0 {
            d.push_right(i);
        } else {
            d.push_left(i);
        }
    }
    assert_eq!(d.len(), 100);

    // Drain from alternating ends; every value must come out exactly once.
    let mut seen = vec![false; 100];
    for i in 0..100 {
        let v = if i % 3 == 0 { d.pop_left() } else { d.pop_right() };
        let v = v.expect("deque drained early");
        assert!(!seen[v], "value {} seen twice", v);
        seen[v] = true;
    }
    assert!(d.is_empty());
    assert!(seen.iter().all(|&b| b));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_deque_mpmc_sum_conservation() {
    const PUSHERS: usize = 4;
    const POPPERS: usize = 4;
    const PER_THREAD: usize = 3000;
    let d = Arc::new(Deque::new());
    let mut handles = vec![];

    for t in 0..PUSHERS {
        let d = d.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let v = (t * PER_THREAD + i) as u64;
                if v % 2 == 0 {
                    d.push_right(v);
                } else {
                    d.push_left(v);
                }
            }
        }));
    }

    let mut poppers = vec![];
    for p in 0..POPPERS {
        let d = d.clone();
        poppers.push(thread::spawn(move || {
            let mut sum = 0u64;
            let mut got = 0;
            while got < PER_THREAD {
                let v = if p % 2 == 0 { d.pop_left() } else { d.pop_right() };
                if let Some(v) = v {
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
    let total = (PUSHERS * PER_THREAD) as u64;
    assert_eq!(popped, total * (total - 1) / 2);
    assert!(d.is_empty());
    petek::flush();
}
